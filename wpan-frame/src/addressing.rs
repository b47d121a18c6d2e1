//! Addressing fields readers and writers.

use crate::{Error, FrameControl, FrameVersion, Result};

/// An IEEE 802.15.4 address, stored in human readable order.
///
/// On the wire, addresses are transmitted least significant octet first.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum Address {
    /// No address.
    Absent,
    /// A 16-bit short address.
    Short([u8; 2]),
    /// A 64-bit extended address.
    Extended([u8; 8]),
}

impl Address {
    /// The broadcast address.
    pub const BROADCAST: Address = Address::Short([0xff; 2]);

    /// Query whether the address is an unicast address.
    pub fn is_unicast(&self) -> bool {
        !self.is_broadcast()
    }

    /// Query whether this address is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Create an address from a slice of 0, 2 or 8 octets.
    pub fn from_bytes(a: &[u8]) -> Result<Self> {
        match a.len() {
            0 => Ok(Address::Absent),
            2 => Ok(Address::Short([a[0], a[1]])),
            8 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(a);
                Ok(Address::Extended(b))
            }
            _ => Err(Error),
        }
    }

    /// Create a short address from its numeric value.
    pub const fn from_short(value: u16) -> Self {
        Self::Short(value.to_be_bytes())
    }

    /// Return the numeric value of a short address.
    pub fn as_short(&self) -> Option<u16> {
        match self {
            Address::Short(value) => Some(u16::from_be_bytes(*value)),
            _ => None,
        }
    }

    /// Read an address of the given mode from its wire representation.
    pub fn from_wire(mode: AddressingMode, wire: &[u8]) -> Option<Self> {
        match mode {
            AddressingMode::Absent => Some(Address::Absent),
            AddressingMode::Short if wire.len() >= 2 => Some(Address::Short([wire[1], wire[0]])),
            AddressingMode::Extended if wire.len() >= 8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&wire[..8]);
                raw.reverse();
                Some(Address::Extended(raw))
            }
            _ => None,
        }
    }

    /// Write the wire representation of the address into `buffer`.
    pub fn emit(&self, buffer: &mut [u8]) {
        let b = &mut buffer[..self.len()];
        b.copy_from_slice(self.as_bytes());
        b.reverse();
    }

    /// Return the address octets in human readable order.
    pub const fn as_bytes(&self) -> &[u8] {
        match self {
            Address::Absent => &[],
            Address::Short(value) => value,
            Address::Extended(value) => value,
        }
    }

    /// Return the length of the address in octets.
    pub fn len(&self) -> usize {
        match self {
            Address::Absent => 0,
            Address::Short(_) => 2,
            Address::Extended(_) => 8,
        }
    }

    /// Returns `true` for [`Address::Absent`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Address::Absent)
    }
}

impl From<Address> for AddressingMode {
    fn from(value: Address) -> Self {
        match value {
            Address::Absent => AddressingMode::Absent,
            Address::Short(_) => AddressingMode::Short,
            Address::Extended(_) => AddressingMode::Extended,
        }
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Address::Absent => write!(f, "absent"),
            Address::Short(value) => write!(f, "{:02x}:{:02x}", value[0], value[1]),
            Address::Extended(value) => {
                for (i, b) in value.iter().enumerate() {
                    if i != 0 {
                        write!(f, ":")?;
                    }
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// IEEE 802.15.4 addressing mode.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum AddressingMode {
    /// Address not present.
    Absent = 0b00,
    /// Reserved in 2003/2006, a single octet address in later revisions.
    Reserved = 0b01,
    /// Short address.
    Short = 0b10,
    /// Extended address.
    Extended = 0b11,
}

impl AddressingMode {
    /// Return the size of the address in octets.
    pub fn size(&self) -> usize {
        match self {
            Self::Absent | Self::Reserved => 0,
            Self::Short => 2,
            Self::Extended => 8,
        }
    }
}

impl From<u8> for AddressingMode {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0b00 => Self::Absent,
            0b01 => Self::Reserved,
            0b10 => Self::Short,
            _ => Self::Extended,
        }
    }
}

/// Which PAN identifier and address fields a frame carries.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct AddressingLayout {
    /// The destination PAN ID is present.
    pub dst_pan_id: bool,
    /// Destination addressing mode.
    pub dst: AddressingMode,
    /// The source PAN ID is present.
    pub src_pan_id: bool,
    /// Source addressing mode.
    pub src: AddressingMode,
}

impl AddressingLayout {
    /// Resolve the layout from the frame control field.
    ///
    /// Returns `None` for combinations that are not allowed by the frame
    /// version.
    pub fn resolve(
        frame_version: FrameVersion,
        dst: AddressingMode,
        src: AddressingMode,
        pan_id_compression: bool,
    ) -> Option<Self> {
        use AddressingMode::*;

        let layout = |dst_pan_id, dst, src_pan_id, src| Self {
            dst_pan_id,
            dst,
            src_pan_id,
            src,
        };

        if dst == Reserved || src == Reserved {
            return None;
        }

        match frame_version {
            FrameVersion::Ieee802154_2003 | FrameVersion::Ieee802154_2006 => {
                Some(match (dst, src) {
                    (Absent, Absent) => layout(false, Absent, false, Absent),
                    (Absent, src) => layout(false, Absent, true, src),
                    (dst, Absent) => layout(true, dst, false, Absent),
                    (dst, src) => layout(true, dst, !pan_id_compression, src),
                })
            }
            FrameVersion::Ieee802154_2020 => Some(match (dst, src, pan_id_compression) {
                (Absent, Absent, false) => layout(false, Absent, false, Absent),
                (Absent, Absent, true) => layout(true, Absent, false, Absent),
                (dst, Absent, false) => layout(true, dst, false, Absent),
                (dst, Absent, true) => layout(false, dst, false, Absent),
                (Absent, src, false) => layout(false, Absent, true, src),
                (Absent, src, true) => layout(false, Absent, false, src),
                (Extended, Extended, false) => layout(true, Extended, false, Extended),
                (Extended, Extended, true) => layout(false, Extended, false, Extended),
                (dst, src, false) => layout(true, dst, true, src),
                (dst, src, true) => layout(true, dst, false, src),
            }),
            FrameVersion::Reserved => None,
        }
    }

    /// Return the length of the addressing fields in octets.
    pub fn len(&self) -> usize {
        (if self.dst_pan_id { 2 } else { 0 })
            + self.dst.size()
            + (if self.src_pan_id { 2 } else { 0 })
            + self.src.size()
    }

    /// Returns `true` when no addressing field is present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A reader for the IEEE 802.15.4 Addressing Fields.
pub struct AddressingFields<T: AsRef<[u8]>> {
    buffer: T,
    layout: AddressingLayout,
}

impl<T: AsRef<[u8]>> AddressingFields<T> {
    /// Create a new [`AddressingFields`] reader from a given buffer starting
    /// right after the sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error when the frame control field describes an invalid
    /// combination or when the buffer is too short.
    pub fn new<F: AsRef<[u8]>>(buffer: T, fc: &FrameControl<F>) -> Result<Self> {
        let layout = AddressingLayout::resolve(
            fc.frame_version(),
            fc.dst_addressing_mode(),
            fc.src_addressing_mode(),
            fc.pan_id_compression(),
        )
        .ok_or(Error)?;

        let af = Self { buffer, layout };

        if af.buffer.as_ref().len() < layout.len() {
            return Err(Error);
        }

        Ok(af)
    }

    /// A reader for a frame without any addressing field.
    pub(crate) fn absent(buffer: T) -> Self {
        Self {
            buffer,
            layout: AddressingLayout {
                dst_pan_id: false,
                dst: AddressingMode::Absent,
                src_pan_id: false,
                src: AddressingMode::Absent,
            },
        }
    }

    /// Return the resolved layout.
    pub fn layout(&self) -> AddressingLayout {
        self.layout
    }

    /// Return the length of the Addressing Fields in octets.
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    /// Returns `true` when no addressing field is present.
    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    fn dst_address_offset(&self) -> usize {
        if self.layout.dst_pan_id {
            2
        } else {
            0
        }
    }

    fn src_pan_id_offset(&self) -> usize {
        self.dst_address_offset() + self.layout.dst.size()
    }

    fn src_address_offset(&self) -> usize {
        self.src_pan_id_offset() + if self.layout.src_pan_id { 2 } else { 0 }
    }

    /// Return the destination PAN ID if not elided.
    pub fn dst_pan_id(&self) -> Option<u16> {
        if self.layout.dst_pan_id {
            let b = &self.buffer.as_ref()[..2];
            Some(u16::from_le_bytes([b[0], b[1]]))
        } else {
            None
        }
    }

    /// Return the destination [`Address`].
    pub fn dst_address(&self) -> Address {
        Address::from_wire(
            self.layout.dst,
            &self.buffer.as_ref()[self.dst_address_offset()..],
        )
        .unwrap_or(Address::Absent)
    }

    /// Return the source PAN ID if not elided.
    pub fn src_pan_id(&self) -> Option<u16> {
        if self.layout.src_pan_id {
            let b = &self.buffer.as_ref()[self.src_pan_id_offset()..][..2];
            Some(u16::from_le_bytes([b[0], b[1]]))
        } else {
            None
        }
    }

    /// Return the source [`Address`].
    pub fn src_address(&self) -> Address {
        Address::from_wire(
            self.layout.src,
            &self.buffer.as_ref()[self.src_address_offset()..],
        )
        .unwrap_or(Address::Absent)
    }

    /// The PAN the source belongs to: its own PAN ID, or the destination PAN
    /// ID when compressed.
    pub fn src_pan_id_or_dst(&self) -> Option<u16> {
        self.src_pan_id().or_else(|| self.dst_pan_id())
    }
}

impl<T: AsRef<[u8]>> core::fmt::Display for AddressingFields<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Addressing Fields")?;

        if let Some(id) = self.dst_pan_id() {
            writeln!(f, "  dst pan id: {:0x}", id)?;
        }

        if !self.dst_address().is_empty() {
            writeln!(f, "  dst address: {}", self.dst_address())?;
        }

        if let Some(id) = self.src_pan_id() {
            writeln!(f, "  src pan id: {:0x}", id)?;
        }

        if !self.src_address().is_empty() {
            writeln!(f, "  src address: {}", self.src_address())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_broadcast() {
        assert!(Address::BROADCAST.is_broadcast());
        assert!(Address::Short([0xff, 0xff]).is_broadcast());
        assert!(!Address::Short([0xff, 0xfe]).is_broadcast());

        assert!(!Address::BROADCAST.is_unicast());
        assert!(Address::Short([0xff, 0xfe]).is_unicast());
    }

    #[test]
    fn from_bytes() {
        assert_eq!(
            Address::from_bytes(&[0xff, 0xfe]).unwrap(),
            Address::Short([0xff, 0xfe])
        );
        assert_eq!(
            Address::from_bytes(&[0x01; 8]).unwrap(),
            Address::Extended([0x01; 8])
        );
        assert_eq!(Address::from_bytes(&[]).unwrap(), Address::Absent);
        assert!(Address::from_bytes(&[0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn short_value() {
        let addr = Address::from_short(0x1234);
        assert_eq!(addr, Address::Short([0x12, 0x34]));
        assert_eq!(addr.as_short(), Some(0x1234));

        let mut wire = [0u8; 2];
        addr.emit(&mut wire);
        assert_eq!(wire, [0x34, 0x12]);
        assert_eq!(Address::from_wire(AddressingMode::Short, &wire), Some(addr));
    }

    #[test]
    fn legacy_layout() {
        use AddressingMode::*;
        let v = FrameVersion::Ieee802154_2006;

        let l = AddressingLayout::resolve(v, Short, Extended, true).unwrap();
        assert_eq!(l.len(), 2 + 2 + 8);

        let l = AddressingLayout::resolve(v, Short, Extended, false).unwrap();
        assert_eq!(l.len(), 2 + 2 + 2 + 8);

        let l = AddressingLayout::resolve(v, Absent, Extended, false).unwrap();
        assert!(!l.dst_pan_id);
        assert!(l.src_pan_id);

        assert!(AddressingLayout::resolve(v, Reserved, Short, false).is_none());
        assert!(AddressingLayout::resolve(FrameVersion::Reserved, Short, Short, false).is_none());
    }

    #[test]
    fn read_fields() {
        let fc = FrameControl::new_unchecked([0x41, 0xd8]);
        let data = [
            0xcd, 0xab, 0xff, 0xff, 0xc7, 0xd9, 0xb5, 0x14, 0x00, 0x4b, 0x12, 0x00,
        ];
        let af = AddressingFields::new(&data[..], &fc).unwrap();
        assert_eq!(af.dst_pan_id(), Some(0xabcd));
        assert_eq!(af.dst_address(), Address::BROADCAST);
        assert_eq!(af.src_pan_id(), None);
        assert_eq!(af.src_pan_id_or_dst(), Some(0xabcd));
        assert_eq!(
            af.src_address(),
            Address::Extended([0x00, 0x12, 0x4b, 0x00, 0x14, 0xb5, 0xd9, 0xc7])
        );

        assert!(AddressingFields::new(&data[..6], &fc).is_err());
    }
}
