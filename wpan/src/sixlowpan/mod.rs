//! 6LoWPAN adaptation: header compression and fragmentation (RFC 4944).
//!
//! A datagram that does not fit in a single MAC frame is split by a
//! [`Fragmenter`] into a FRAG1 fragment, carrying the compressed IPv6 header,
//! and FRAGN fragments. The receiving side collects them in a
//! [`ReassemblyCache`].

use heapless::Vec;

use crate::config::REASS_BUFFER_SIZE;
use crate::frame::{FCS_LENGTH, MTU};

mod frag;
pub use frag::{FragmentHeader, Fragmenter, FRAG1_HEADER_LEN, FRAGN_HEADER_LEN};

mod reassembly;
pub use reassembly::ReassemblyCache;

/// Dispatch of an uncompressed IPv6 header.
pub const DISPATCH_IPV6: u8 = 0x41;
/// Dispatch of the first fragment, in the upper 5 bits.
pub const DISPATCH_FRAG1: u8 = 0xc0;
/// Dispatch of the subsequent fragments, in the upper 5 bits.
pub const DISPATCH_FRAGN: u8 = 0xe0;
const DISPATCH_FRAG_MASK: u8 = 0xf8;

/// Length of the fixed IPv6 header.
pub const IPV6_HEADER_LEN: usize = 40;
const UDP_HEADER_LEN: usize = 8;
const NEXT_HEADER_UDP: u8 = 17;
/// Largest header a [`HeaderCompression`] may restore.
pub const MAX_UNCOMPRESSED_HEADER_LEN: usize = IPV6_HEADER_LEN + UDP_HEADER_LEN;

/// A reassembled or decoded IPv6 datagram.
pub type Datagram = Vec<u8, REASS_BUFFER_SIZE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Truncated or inconsistent headers.
    Malformed,
    /// The dispatch is not handled.
    UnsupportedDispatch,
    /// The datagram is larger than the reassembly buffer.
    TooLarge,
    /// Every reassembly entry is in use.
    CacheFull,
    /// The fragment overlaps data that was already received.
    Overlap,
    /// The output buffer is too small.
    BufferTooSmall,
}

/// What kind of payload a MAC data frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dispatch {
    FirstFragment,
    SubsequentFragment,
    /// A complete datagram, with a possibly compressed header.
    Datagram,
}

impl Dispatch {
    pub fn of(payload: &[u8]) -> Result<Self, Error> {
        match payload.first() {
            Some(b) if b & DISPATCH_FRAG_MASK == DISPATCH_FRAG1 => Ok(Self::FirstFragment),
            Some(b) if b & DISPATCH_FRAG_MASK == DISPATCH_FRAGN => Ok(Self::SubsequentFragment),
            Some(_) => Ok(Self::Datagram),
            None => Err(Error::Malformed),
        }
    }
}

/// IPv6 header compression.
pub trait HeaderCompression {
    /// Compress the headers at the start of `packet` into `out`. Returns the
    /// number of octets written and the number of octets of `packet`
    /// consumed.
    fn compress(&self, packet: &[u8], out: &mut [u8]) -> Result<(usize, usize), Error>;

    /// Restore the headers at the start of `payload` into `out`, which holds
    /// at least [`MAX_UNCOMPRESSED_HEADER_LEN`] octets. Returns the number of
    /// octets of `payload` consumed and the number of octets written.
    fn decompress(&self, payload: &[u8], out: &mut [u8]) -> Result<(usize, usize), Error>;
}

/// The uncompressed IPv6 dispatch: a single octet in front of the plain
/// IPv6 header.
#[derive(Debug, Default, Clone, Copy)]
pub struct Uncompressed;

impl HeaderCompression for Uncompressed {
    fn compress(&self, packet: &[u8], out: &mut [u8]) -> Result<(usize, usize), Error> {
        if packet.len() < IPV6_HEADER_LEN || packet[0] >> 4 != 6 {
            return Err(Error::Malformed);
        }
        let out = out
            .get_mut(..1 + IPV6_HEADER_LEN)
            .ok_or(Error::BufferTooSmall)?;
        out[0] = DISPATCH_IPV6;
        out[1..].copy_from_slice(&packet[..IPV6_HEADER_LEN]);
        Ok((1 + IPV6_HEADER_LEN, IPV6_HEADER_LEN))
    }

    fn decompress(&self, payload: &[u8], out: &mut [u8]) -> Result<(usize, usize), Error> {
        match payload.first() {
            Some(&DISPATCH_IPV6) => {}
            Some(_) => return Err(Error::UnsupportedDispatch),
            None => return Err(Error::Malformed),
        }
        let header = payload
            .get(1..1 + IPV6_HEADER_LEN)
            .ok_or(Error::Malformed)?;
        out.get_mut(..IPV6_HEADER_LEN)
            .ok_or(Error::BufferTooSmall)?
            .copy_from_slice(header);
        Ok((1 + IPV6_HEADER_LEN, IPV6_HEADER_LEN))
    }
}

/// Result of [`compress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compressed {
    /// Length of the compressed datagram.
    pub len: usize,
    /// Length of the compressed headers.
    pub header_len: usize,
    /// Length of the headers before compression.
    pub uncompressed_header_len: usize,
}

impl Compressed {
    /// Growth (positive) or reduction of the headers through compression.
    pub fn hdr_diff(&self) -> isize {
        self.header_len as isize - self.uncompressed_header_len as isize
    }
}

/// Compress a whole IPv6 datagram into `out`.
pub fn compress<H: HeaderCompression>(
    hc: &H,
    packet: &[u8],
    out: &mut [u8],
) -> Result<Compressed, Error> {
    let (header_len, consumed) = hc.compress(packet, out)?;
    let rest = &packet[consumed..];
    out.get_mut(header_len..header_len + rest.len())
        .ok_or(Error::BufferTooSmall)?
        .copy_from_slice(rest);

    Ok(Compressed {
        len: header_len + rest.len(),
        header_len,
        uncompressed_header_len: consumed,
    })
}

/// Returns `true` when a compressed datagram does not fit in a single frame
/// with `ll_header_len` octets of MAC header and `tag_len` octets of MIC.
pub fn needs_fragmentation(ll_header_len: usize, compressed_len: usize, tag_len: usize) -> bool {
    ll_header_len + compressed_len + tag_len + FCS_LENGTH > MTU
}

/// Decode a datagram that was sent in a single frame.
pub fn decode<H: HeaderCompression>(hc: &H, payload: &[u8]) -> Result<Datagram, Error> {
    let mut header = [0u8; MAX_UNCOMPRESSED_HEADER_LEN];
    let (consumed, written) = hc.decompress(payload, &mut header)?;

    let mut datagram = Datagram::new();
    datagram
        .extend_from_slice(&header[..written])
        .map_err(|_| Error::TooLarge)?;
    datagram
        .extend_from_slice(&payload[consumed..])
        .map_err(|_| Error::TooLarge)?;

    patch_lengths(&mut datagram);
    Ok(datagram)
}

/// Write the IPv6 payload length, and the UDP length for UDP datagrams,
/// from the size of the datagram.
pub(crate) fn patch_lengths(datagram: &mut [u8]) {
    if datagram.len() < IPV6_HEADER_LEN {
        return;
    }
    let payload_len = (datagram.len() - IPV6_HEADER_LEN) as u16;
    datagram[4..6].copy_from_slice(&payload_len.to_be_bytes());

    if datagram[6] == NEXT_HEADER_UDP && datagram.len() >= IPV6_HEADER_LEN + UDP_HEADER_LEN {
        datagram[IPV6_HEADER_LEN + 4..IPV6_HEADER_LEN + 6]
            .copy_from_slice(&payload_len.to_be_bytes());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::vec::Vec;

    use super::*;

    /// An IPv6/UDP datagram carrying `len` octets of payload.
    pub fn udp_datagram(len: usize) -> Vec<u8> {
        let total = IPV6_HEADER_LEN + UDP_HEADER_LEN + len;
        let mut packet = vec![0u8; total];
        packet[0] = 0x60;
        packet[4..6].copy_from_slice(&((total - IPV6_HEADER_LEN) as u16).to_be_bytes());
        packet[6] = NEXT_HEADER_UDP;
        packet[7] = 64;
        packet[8..24].copy_from_slice(&[0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        packet[24..40].copy_from_slice(&[0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
        packet[40..42].copy_from_slice(&5683u16.to_be_bytes());
        packet[42..44].copy_from_slice(&5683u16.to_be_bytes());
        packet[44..46].copy_from_slice(&((UDP_HEADER_LEN + len) as u16).to_be_bytes());
        for (i, b) in packet[48..].iter_mut().enumerate() {
            *b = i as u8;
        }
        packet
    }

    #[test]
    fn dispatch() {
        assert_eq!(Dispatch::of(&[0xc1, 0x2c]), Ok(Dispatch::FirstFragment));
        assert_eq!(Dispatch::of(&[0xe0]), Ok(Dispatch::SubsequentFragment));
        assert_eq!(Dispatch::of(&[0x41]), Ok(Dispatch::Datagram));
        assert_eq!(Dispatch::of(&[]), Err(Error::Malformed));
    }

    #[test]
    fn uncompressed_round_trip() {
        let packet = udp_datagram(10);
        let mut out = [0u8; 128];
        let compressed = compress(&Uncompressed, &packet, &mut out).unwrap();
        assert_eq!(compressed.len, packet.len() + 1);
        assert_eq!(compressed.hdr_diff(), 1);
        assert_eq!(out[0], DISPATCH_IPV6);

        let datagram = decode(&Uncompressed, &out[..compressed.len]).unwrap();
        assert_eq!(&datagram[..], &packet[..]);
    }

    #[test]
    fn unknown_dispatch_is_refused() {
        assert_eq!(
            decode(&Uncompressed, &[0x7a, 0x33, 0x3a]),
            Err(Error::UnsupportedDispatch)
        );
        assert_eq!(decode(&Uncompressed, &[0x41, 0x60]), Err(Error::Malformed));
        assert_eq!(
            compress(&Uncompressed, &[0x45; 40], &mut [0u8; 64]),
            Err(Error::Malformed)
        );
    }

    #[test]
    fn fragmentation_threshold() {
        // 23 octets of MAC header leave 102 octets of payload.
        assert!(!needs_fragmentation(23, 102, 0));
        assert!(needs_fragmentation(23, 103, 0));
        assert!(needs_fragmentation(23, 100, 4));
    }

    #[test]
    fn lengths_are_patched() {
        let mut packet = udp_datagram(4);
        packet[4..6].fill(0);
        packet[44..46].fill(0);
        patch_lengths(&mut packet);
        assert_eq!(&packet[4..6], &[0, 12]);
        assert_eq!(&packet[44..46], &[0, 12]);
    }
}
