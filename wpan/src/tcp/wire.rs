//! TCP header (RFC 793) and the options used on constrained links.
use core::net::Ipv6Addr;

use heapless::Vec;

use super::seq::SeqNumber;
use crate::config::IPV6_MTU;
use crate::net::ip::{checksum, Endpoint, Packet, Protocol, IPV6_HEADER_LEN};

pub const TCP_HEADER_LEN: usize = 20;
const MAX_OPTIONS_LEN: usize = 40;

const OPT_END: u8 = 0x00;
const OPT_NOP: u8 = 0x01;
const OPT_MSS: u8 = 0x02;
const OPT_WS: u8 = 0x03;

bitflags::bitflags! {
    /// Control bits of a segment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Flags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=u8:#x}", self.bits())
    }
}

/// Why a segment was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    Truncated,
    Checksum,
    /// An option with a bad length, or running past the header.
    Options,
}

/// A parsed or to be emitted TCP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpRepr {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: SeqNumber,
    pub ack: SeqNumber,
    pub flags: Flags,
    pub window: u16,
    pub mss: Option<u16>,
    /// Parsed, never applied.
    pub window_scale: Option<u8>,
}

impl TcpRepr {
    /// Check a segment sent from `src` to `dst`, returning its header and
    /// payload.
    pub fn parse<'a>(
        src: &Ipv6Addr,
        dst: &Ipv6Addr,
        segment: &'a [u8],
    ) -> Result<(Self, &'a [u8]), Error> {
        if segment.len() < TCP_HEADER_LEN {
            return Err(Error::Truncated);
        }
        let header_len = ((segment[12] >> 4) as usize) * 4;
        if header_len < TCP_HEADER_LEN || header_len > segment.len() {
            return Err(Error::Truncated);
        }
        if checksum(src, dst, Protocol::Tcp, segment) != 0 {
            return Err(Error::Checksum);
        }

        let read_u16 = |at: usize| u16::from_be_bytes([segment[at], segment[at + 1]]);
        let read_u32 = |at: usize| {
            u32::from_be_bytes([segment[at], segment[at + 1], segment[at + 2], segment[at + 3]])
        };

        let mut repr = Self {
            src_port: read_u16(0),
            dst_port: read_u16(2),
            seq: SeqNumber(read_u32(4)),
            ack: SeqNumber(read_u32(8)),
            flags: Flags::from_bits_truncate(segment[13]),
            window: read_u16(14),
            mss: None,
            window_scale: None,
        };
        repr.parse_options(&segment[TCP_HEADER_LEN..header_len])?;

        Ok((repr, &segment[header_len..]))
    }

    fn parse_options(&mut self, mut options: &[u8]) -> Result<(), Error> {
        while let Some(&kind) = options.first() {
            match kind {
                OPT_END => break,
                OPT_NOP => {
                    options = &options[1..];
                    continue;
                }
                _ => {}
            }

            let len = *options.get(1).ok_or(Error::Options)? as usize;
            if len < 2 || len > options.len() {
                return Err(Error::Options);
            }
            let value = &options[2..len];
            match kind {
                OPT_MSS if len == 4 => {
                    // A zero MSS would never let data out.
                    let mss = u16::from_be_bytes([value[0], value[1]]);
                    if mss == 0 {
                        return Err(Error::Options);
                    }
                    self.mss = Some(mss);
                }
                OPT_WS if len == 3 => self.window_scale = Some(value[0]),
                OPT_MSS | OPT_WS => return Err(Error::Options),
                _ => trace!("skipping TCP option {}", kind),
            }
            options = &options[len..];
        }
        Ok(())
    }

    fn options_len(&self) -> usize {
        if self.mss.is_some() {
            4
        } else {
            0
        }
    }

    pub fn header_len(&self) -> usize {
        TCP_HEADER_LEN + self.options_len()
    }

    /// Sequence space taken by a segment with this header and `payload_len`
    /// octets of data.
    pub fn segment_len(&self, payload_len: usize) -> u32 {
        payload_len as u32
            + self.flags.contains(Flags::SYN) as u32
            + self.flags.contains(Flags::FIN) as u32
    }

    /// Build the segment carrying `payload` from `src` to `dst`. The ports of
    /// the endpoints take precedence over the ones of the header.
    pub fn emit(&self, src: &Endpoint, dst: &Endpoint, payload: &[u8]) -> Option<Packet> {
        let header_len = self.header_len();
        debug_assert!(header_len - TCP_HEADER_LEN <= MAX_OPTIONS_LEN);
        if header_len + payload.len() > IPV6_MTU - IPV6_HEADER_LEN {
            return None;
        }

        let mut segment: Vec<u8, IPV6_MTU> = Vec::new();
        segment.resize(header_len + payload.len(), 0).ok()?;
        segment[0..2].copy_from_slice(&src.port.to_be_bytes());
        segment[2..4].copy_from_slice(&dst.port.to_be_bytes());
        segment[4..8].copy_from_slice(&self.seq.0.to_be_bytes());
        segment[8..12].copy_from_slice(&self.ack.0.to_be_bytes());
        segment[12] = ((header_len / 4) as u8) << 4;
        segment[13] = self.flags.bits();
        segment[14..16].copy_from_slice(&self.window.to_be_bytes());
        if let Some(mss) = self.mss {
            segment[20] = OPT_MSS;
            segment[21] = 4;
            segment[22..24].copy_from_slice(&mss.to_be_bytes());
        }
        segment[header_len..].copy_from_slice(payload);
        let checksum = checksum(&src.addr, &dst.addr, Protocol::Tcp, &segment);
        segment[16..18].copy_from_slice(&checksum.to_be_bytes());

        Some(Packet {
            src: src.addr,
            dst: dst.addr,
            protocol: Protocol::Tcp,
            payload: segment,
        })
    }
}
