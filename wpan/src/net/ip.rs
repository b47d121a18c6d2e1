//! IPv6 and UDP headers, as far as the transport layer needs them.
use core::net::Ipv6Addr;

use heapless::Vec;

use crate::config::IPV6_MTU;
use crate::net::Errno;

pub const IPV6_HEADER_LEN: usize = 40;
pub const UDP_HEADER_LEN: usize = 8;
const HOP_LIMIT: u8 = 64;

/// Transport protocols, by IPv6 next header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Protocol {
    Tcp = 6,
    Udp = 17,
}

impl TryFrom<u8> for Protocol {
    type Error = Errno;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            6 => Ok(Self::Tcp),
            17 => Ok(Self::Udp),
            _ => Err(Errno::EPROTONOSUPPORT),
        }
    }
}

/// An IPv6 address and a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub addr: Ipv6Addr,
    pub port: u16,
}

impl Endpoint {
    pub const UNSPECIFIED: Endpoint = Endpoint::new(Ipv6Addr::UNSPECIFIED, 0);

    pub const fn new(addr: Ipv6Addr, port: u16) -> Self {
        Self { addr, port }
    }

    pub fn is_specified(&self) -> bool {
        self.port != 0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Endpoint {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "[{}]:{}", self.addr.octets(), self.port)
    }
}

impl core::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}]:{}", self.addr, self.port)
    }
}

/// A transport payload with the addresses of the IPv6 header carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub protocol: Protocol,
    /// The TCP segment or UDP datagram, header included.
    pub payload: Vec<u8, IPV6_MTU>,
}

impl Packet {
    /// Length of the complete IPv6 packet.
    pub fn total_len(&self) -> usize {
        IPV6_HEADER_LEN + self.payload.len()
    }

    /// Write the IPv6 packet into `buffer`, returning its length.
    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize, Errno> {
        let len = self.total_len();
        let buffer = buffer.get_mut(..len).ok_or(Errno::EMSGSIZE)?;
        buffer[..IPV6_HEADER_LEN].fill(0);
        buffer[0] = 0x60;
        buffer[4..6].copy_from_slice(&(self.payload.len() as u16).to_be_bytes());
        buffer[6] = self.protocol as u8;
        buffer[7] = HOP_LIMIT;
        buffer[8..24].copy_from_slice(&self.src.octets());
        buffer[24..40].copy_from_slice(&self.dst.octets());
        buffer[IPV6_HEADER_LEN..].copy_from_slice(&self.payload);
        Ok(len)
    }

    /// Read an IPv6 packet. Extension headers are not supported.
    pub fn parse(packet: &[u8]) -> Result<Self, Errno> {
        if packet.len() < IPV6_HEADER_LEN || packet[0] >> 4 != 6 {
            return Err(Errno::EINVAL);
        }
        let payload_len = u16::from_be_bytes([packet[4], packet[5]]) as usize;
        let payload = packet
            .get(IPV6_HEADER_LEN..IPV6_HEADER_LEN + payload_len)
            .ok_or(Errno::EINVAL)?;

        Ok(Self {
            src: address(&packet[8..24]),
            dst: address(&packet[24..40]),
            protocol: Protocol::try_from(packet[6])?,
            payload: Vec::from_slice(payload).map_err(|_| Errno::EMSGSIZE)?,
        })
    }
}

fn address(octets: &[u8]) -> Ipv6Addr {
    let mut address = [0u8; 16];
    address.copy_from_slice(octets);
    Ipv6Addr::from(address)
}

fn sum(mut acc: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        acc += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        acc += (*last as u32) << 8;
    }
    acc
}

/// Internet checksum of `data` with the IPv6 pseudo-header.
pub fn checksum(src: &Ipv6Addr, dst: &Ipv6Addr, protocol: Protocol, data: &[u8]) -> u16 {
    let mut acc = sum(0, &src.octets());
    acc = sum(acc, &dst.octets());
    acc += data.len() as u32;
    acc += protocol as u32;
    acc = sum(acc, data);
    while acc > 0xffff {
        acc = (acc & 0xffff) + (acc >> 16);
    }
    !(acc as u16)
}

/// Parsed UDP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpRepr {
    pub src_port: u16,
    pub dst_port: u16,
}

impl UdpRepr {
    /// Check a UDP datagram, returning its header and payload.
    pub fn parse<'a>(src: &Ipv6Addr, dst: &Ipv6Addr, datagram: &'a [u8]) -> Result<(Self, &'a [u8]), Errno> {
        if datagram.len() < UDP_HEADER_LEN {
            return Err(Errno::EINVAL);
        }
        let len = u16::from_be_bytes([datagram[4], datagram[5]]) as usize;
        if len < UDP_HEADER_LEN || len > datagram.len() {
            return Err(Errno::EINVAL);
        }
        let datagram = &datagram[..len];
        // A zero checksum is not allowed over IPv6.
        if datagram[6..8] == [0, 0] || checksum(src, dst, Protocol::Udp, datagram) != 0 {
            return Err(Errno::EINVAL);
        }

        Ok((
            Self {
                src_port: u16::from_be_bytes([datagram[0], datagram[1]]),
                dst_port: u16::from_be_bytes([datagram[2], datagram[3]]),
            },
            &datagram[UDP_HEADER_LEN..],
        ))
    }

    /// Build the datagram carrying `payload` from `src` to `dst`.
    pub fn emit(src: &Endpoint, dst: &Endpoint, payload: &[u8]) -> Result<Packet, Errno> {
        let len = UDP_HEADER_LEN + payload.len();
        if len > IPV6_MTU - IPV6_HEADER_LEN {
            return Err(Errno::EMSGSIZE);
        }
        let mut datagram: Vec<u8, IPV6_MTU> = Vec::new();
        datagram
            .resize(len, 0)
            .map_err(|_| Errno::EMSGSIZE)?;
        datagram[0..2].copy_from_slice(&src.port.to_be_bytes());
        datagram[2..4].copy_from_slice(&dst.port.to_be_bytes());
        datagram[4..6].copy_from_slice(&(len as u16).to_be_bytes());
        datagram[UDP_HEADER_LEN..].copy_from_slice(payload);
        let checksum = match checksum(&src.addr, &dst.addr, Protocol::Udp, &datagram) {
            0 => 0xffff,
            checksum => checksum,
        };
        datagram[6..8].copy_from_slice(&checksum.to_be_bytes());

        Ok(Packet {
            src: src.addr,
            dst: dst.addr,
            protocol: Protocol::Udp,
            payload: datagram,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const ADDR_A: Ipv6Addr = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
    pub const ADDR_B: Ipv6Addr = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 2);

    #[test]
    fn udp_datagram() {
        let src = Endpoint::new(ADDR_A, 5683);
        let dst = Endpoint::new(ADDR_B, 1234);
        let packet = UdpRepr::emit(&src, &dst, b"hello").unwrap();
        assert_eq!(packet.payload.len(), 13);

        let (repr, payload) = UdpRepr::parse(&ADDR_A, &ADDR_B, &packet.payload).unwrap();
        assert_eq!(repr.src_port, 5683);
        assert_eq!(repr.dst_port, 1234);
        assert_eq!(payload, b"hello");

        // Another destination address breaks the checksum.
        assert_eq!(
            UdpRepr::parse(&ADDR_A, &ADDR_A, &packet.payload),
            Err(Errno::EINVAL)
        );
    }

    #[test]
    fn ipv6_header() {
        let src = Endpoint::new(ADDR_A, 1);
        let dst = Endpoint::new(ADDR_B, 2);
        let packet = UdpRepr::emit(&src, &dst, &[0xaa; 4]).unwrap();

        let mut buffer = [0u8; 128];
        let len = packet.emit(&mut buffer).unwrap();
        assert_eq!(len, 52);
        assert_eq!(buffer[0], 0x60);
        assert_eq!(&buffer[4..8], &[0, 12, 17, 64]);
        assert_eq!(Packet::parse(&buffer[..len]), Ok(packet.clone()));

        assert_eq!(packet.emit(&mut [0u8; 40]), Err(Errno::EMSGSIZE));
        buffer[6] = 58;
        assert_eq!(Packet::parse(&buffer[..len]), Err(Errno::EPROTONOSUPPORT));
    }
}
