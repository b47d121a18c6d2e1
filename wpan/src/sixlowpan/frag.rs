use super::{Compressed, Error, DISPATCH_FRAG1, DISPATCH_FRAGN, DISPATCH_FRAG_MASK};

/// Length of the FRAG1 header: dispatch and size, tag.
pub const FRAG1_HEADER_LEN: usize = 4;
/// Length of the FRAGN header: FRAG1 header and offset.
pub const FRAGN_HEADER_LEN: usize = 5;

/// A parsed fragment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FragmentHeader {
    /// Size of the uncompressed datagram.
    pub size: u16,
    pub tag: u16,
    /// Offset in the uncompressed datagram, in octets. `None` for FRAG1.
    pub offset: Option<usize>,
}

impl FragmentHeader {
    pub fn parse(fragment: &[u8]) -> Result<Self, Error> {
        let dispatch = fragment.first().ok_or(Error::Malformed)? & DISPATCH_FRAG_MASK;
        let header_len = match dispatch {
            DISPATCH_FRAG1 => FRAG1_HEADER_LEN,
            DISPATCH_FRAGN => FRAGN_HEADER_LEN,
            _ => return Err(Error::UnsupportedDispatch),
        };
        if fragment.len() < header_len {
            return Err(Error::Malformed);
        }

        Ok(Self {
            size: u16::from_be_bytes([fragment[0] & 0x07, fragment[1]]),
            tag: u16::from_be_bytes([fragment[2], fragment[3]]),
            offset: (dispatch == DISPATCH_FRAGN).then(|| fragment[4] as usize * 8),
        })
    }

    pub fn header_len(&self) -> usize {
        if self.offset.is_some() {
            FRAGN_HEADER_LEN
        } else {
            FRAG1_HEADER_LEN
        }
    }

    pub fn emit(&self, buffer: &mut [u8]) {
        let dispatch = if self.offset.is_some() {
            DISPATCH_FRAGN
        } else {
            DISPATCH_FRAG1
        };
        let size = self.size.to_be_bytes();
        buffer[0] = dispatch | (size[0] & 0x07);
        buffer[1] = size[1];
        buffer[2..4].copy_from_slice(&self.tag.to_be_bytes());
        if let Some(offset) = self.offset {
            buffer[4] = (offset / 8) as u8;
        }
    }
}

/// Splits a compressed datagram in fragments.
///
/// Every fragment but the last covers a multiple of 8 octets of the
/// uncompressed datagram.
#[derive(Debug)]
pub struct Fragmenter<'a> {
    packet: &'a [u8],
    compressed: Compressed,
    size: u16,
    tag: u16,
    /// Octets of `packet` already sent.
    sent: usize,
    /// Octets of the uncompressed datagram already covered.
    processed: usize,
}

impl<'a> Fragmenter<'a> {
    /// `packet` is the compressed datagram described by `compressed`.
    pub fn new(packet: &'a [u8], compressed: Compressed, tag: u16) -> Result<Self, Error> {
        let size = compressed.len as isize - compressed.hdr_diff();
        // The size field holds 11 bits.
        if size <= 0 || size > 0x7ff || packet.len() != compressed.len {
            return Err(Error::TooLarge);
        }

        Ok(Self {
            packet,
            compressed,
            size: size as u16,
            tag,
            sent: 0,
            processed: 0,
        })
    }

    /// Size of the uncompressed datagram.
    pub fn datagram_size(&self) -> u16 {
        self.size
    }

    pub fn tag(&self) -> u16 {
        self.tag
    }

    pub fn is_done(&self) -> bool {
        self.sent == self.packet.len()
    }

    /// Write the next fragment, at most `capacity` octets, into `out`.
    /// Returns `None` once every fragment was produced.
    pub fn next_fragment(&mut self, capacity: usize, out: &mut [u8]) -> Result<Option<usize>, Error> {
        if self.is_done() {
            return Ok(None);
        }

        let remaining = self.packet.len() - self.sent;
        let (header, chunk, covered) = if self.sent == 0 {
            let avail = capacity
                .checked_sub(FRAG1_HEADER_LEN)
                .ok_or(Error::BufferTooSmall)?;
            if remaining <= avail {
                (FRAG1_HEADER_LEN, remaining, self.size as usize)
            } else {
                let covered = (avail + self.compressed.uncompressed_header_len)
                    .checked_sub(self.compressed.header_len)
                    .ok_or(Error::BufferTooSmall)?
                    / 8
                    * 8;
                if covered < self.compressed.uncompressed_header_len {
                    return Err(Error::BufferTooSmall);
                }
                let chunk = covered - self.compressed.uncompressed_header_len
                    + self.compressed.header_len;
                (FRAG1_HEADER_LEN, chunk, covered)
            }
        } else {
            let avail = capacity
                .checked_sub(FRAGN_HEADER_LEN)
                .ok_or(Error::BufferTooSmall)?;
            let chunk = if remaining <= avail {
                remaining
            } else {
                avail / 8 * 8
            };
            if chunk == 0 {
                return Err(Error::BufferTooSmall);
            }
            (FRAGN_HEADER_LEN, chunk, chunk)
        };

        let len = header + chunk;
        let out = out.get_mut(..len).ok_or(Error::BufferTooSmall)?;

        FragmentHeader {
            size: self.size,
            tag: self.tag,
            offset: (self.sent != 0).then_some(self.processed),
        }
        .emit(out);
        out[header..].copy_from_slice(&self.packet[self.sent..][..chunk]);

        trace!(
            "fragment tag {} offset {} len {}",
            self.tag,
            self.processed,
            chunk
        );

        self.sent += chunk;
        self.processed += covered;
        Ok(Some(len))
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;
    use crate::sixlowpan::tests::udp_datagram;
    use crate::sixlowpan::{compress, Uncompressed};

    #[test]
    fn header_round_trip() {
        let mut buffer = [0u8; 5];
        let header = FragmentHeader {
            size: 0x2c4,
            tag: 0x1234,
            offset: Some(96),
        };
        header.emit(&mut buffer);
        assert_eq!(buffer, [0xe2, 0xc4, 0x12, 0x34, 12]);
        assert_eq!(FragmentHeader::parse(&buffer), Ok(header));

        let first = FragmentHeader {
            offset: None,
            ..header
        };
        first.emit(&mut buffer[..4]);
        assert_eq!(&buffer[..4], &[0xc2, 0xc4, 0x12, 0x34]);
        assert_eq!(first.header_len(), FRAG1_HEADER_LEN);

        assert_eq!(FragmentHeader::parse(&[0xe2, 0xc4, 0x12]), Err(Error::Malformed));
        assert_eq!(FragmentHeader::parse(&[0x41]), Err(Error::UnsupportedDispatch));
    }

    #[test]
    fn fragments_cover_multiples_of_eight() {
        let packet = udp_datagram(300);
        let mut compressed_buffer = [0u8; 400];
        let compressed = compress(&Uncompressed, &packet, &mut compressed_buffer).unwrap();
        let mut fragmenter =
            Fragmenter::new(&compressed_buffer[..compressed.len], compressed, 7).unwrap();
        assert_eq!(fragmenter.datagram_size() as usize, packet.len());

        let mut fragments: Vec<Vec<u8>> = Vec::new();
        let mut out = [0u8; 127];
        while let Some(len) = fragmenter.next_fragment(100, &mut out).unwrap() {
            assert!(len <= 100);
            fragments.push(out[..len].to_vec());
        }
        assert!(fragmenter.is_done());

        // FRAG1: 96 - 41 + 40 = 95, rounded down to 88 octets of the datagram.
        assert_eq!(fragments[0].len(), FRAG1_HEADER_LEN + 89);
        let mut expected_offset = 88;
        for fragment in &fragments[1..] {
            let header = FragmentHeader::parse(fragment).unwrap();
            assert_eq!(header.offset, Some(expected_offset));
            assert_eq!(header.tag, 7);
            expected_offset += fragment.len() - FRAGN_HEADER_LEN;
        }
        assert_eq!(expected_offset, packet.len());

        for fragment in &fragments[1..fragments.len() - 1] {
            assert_eq!((fragment.len() - FRAGN_HEADER_LEN) % 8, 0);
        }
    }

    #[test]
    fn capacity_must_hold_the_header() {
        let packet = udp_datagram(100);
        let mut compressed_buffer = [0u8; 200];
        let compressed = compress(&Uncompressed, &packet, &mut compressed_buffer).unwrap();
        let mut fragmenter =
            Fragmenter::new(&compressed_buffer[..compressed.len], compressed, 1).unwrap();
        let mut out = [0u8; 127];
        assert_eq!(
            fragmenter.next_fragment(40, &mut out),
            Err(Error::BufferTooSmall)
        );
    }
}
