//! Frame Check Sequence.

use crate::{Error, Result, FCS_LENGTH};

// The FCS field contains a 16-bit ITU-T CRC, using the x^16 + x^12 + x^5 + 1
// polynomial. Unlike most CRCs, the initial and final values are both 0x0000.
const CRC_16_IEEE802154: crc::Algorithm<u16> = crc::Algorithm {
    width: 16,
    poly: 0x1021,
    init: 0x0000,
    refin: true,
    refout: true,
    xorout: 0x0000,
    check: 0x2189,
    residue: 0x0000,
};

const CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&CRC_16_IEEE802154);

/// Calculate the FCS over `content`.
pub fn calculate_fcs(content: &[u8]) -> u16 {
    CRC.checksum(content)
}

/// Append the FCS after `len` octets of frame content in `buffer`, returning
/// the new length.
pub fn append_fcs(buffer: &mut [u8], len: usize) -> Result<usize> {
    if buffer.len() < len + FCS_LENGTH {
        return Err(Error);
    }

    let fcs = calculate_fcs(&buffer[..len]);
    buffer[len..][..FCS_LENGTH].copy_from_slice(&fcs.to_le_bytes());
    Ok(len + FCS_LENGTH)
}

/// A reader for an IEEE 802.15.4 frame followed by its Frame Check Sequence.
pub struct FrameWithFcs<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> FrameWithFcs<T> {
    /// Create a new [`FrameWithFcs`], checking the FCS.
    pub fn new(buffer: T) -> Result<Self> {
        let frame = Self::new_unchecked(buffer);

        if !frame.check_len() || !frame.check_fcs() {
            return Err(Error);
        }

        Ok(frame)
    }

    /// Check the length of the frame.
    pub fn check_len(&self) -> bool {
        self.buffer.as_ref().len() >= FCS_LENGTH
    }

    /// Create a new [`FrameWithFcs`] without checking the FCS.
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Calculate the Frame Check Sequence of the frame content.
    #[inline]
    pub fn calculate_fcs(&self) -> u16 {
        calculate_fcs(self.content())
    }

    /// Check the Frame Check Sequence of the frame.
    #[inline]
    pub fn check_fcs(&self) -> bool {
        self.calculate_fcs() == self.fcs()
    }

    /// Return the content of the frame, excluding the FCS.
    pub fn content(&self) -> &[u8] {
        let b = self.buffer.as_ref();
        &b[..b.len() - FCS_LENGTH]
    }

    /// Return the Frame Check Sequence of the frame.
    pub fn fcs(&self) -> u16 {
        let b = self.buffer.as_ref();
        u16::from_le_bytes([b[b.len() - 2], b[b.len() - 1]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(calculate_fcs(b"123456789"), 0x2189);
    }

    #[test]
    fn append_and_check() {
        let mut buffer = [0x02, 0x00, 0x2a, 0x00, 0x00];
        assert_eq!(append_fcs(&mut buffer, 3).unwrap(), 5);

        let frame = FrameWithFcs::new(&buffer[..]).unwrap();
        assert_eq!(frame.content(), &[0x02, 0x00, 0x2a]);

        buffer[2] ^= 0x01;
        assert!(FrameWithFcs::new(&buffer[..]).is_err());
        assert!(append_fcs(&mut buffer, 4).is_err());
    }
}
