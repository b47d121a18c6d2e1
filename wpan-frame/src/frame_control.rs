//! IEEE 802.15.4 Frame Control field readers and writers.

use crate::AddressingMode;
use crate::{Error, Result};

/// IEEE 802.15.4 frame type.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum FrameType {
    /// Beacon frame.
    Beacon = 0b000,
    /// Data frame.
    Data = 0b001,
    /// Acknowledgment frame.
    Ack = 0b010,
    /// MAC command frame.
    MacCommand = 0b011,
    /// Low latency deterministic network frame.
    Lldn = 0b100,
    /// Multipurpose frame.
    Multipurpose = 0b101,
    /// Fragment or FRAK frame.
    FragmentOrFrak = 0b110,
    /// Extended frame type.
    Extended = 0b111,
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value & 0b111 {
            0b000 => Self::Beacon,
            0b001 => Self::Data,
            0b010 => Self::Ack,
            0b011 => Self::MacCommand,
            0b100 => Self::Lldn,
            0b101 => Self::Multipurpose,
            0b110 => Self::FragmentOrFrak,
            _ => Self::Extended,
        }
    }
}

/// IEEE 802.15.4 frame version.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum FrameVersion {
    /// IEEE 802.15.4-2003.
    Ieee802154_2003 = 0b00,
    /// IEEE 802.15.4-2006.
    Ieee802154_2006 = 0b01,
    /// IEEE 802.15.4-2015 and later revisions.
    Ieee802154_2020 = 0b10,
    /// Reserved value `0b11`.
    Reserved = 0b11,
}

impl From<u8> for FrameVersion {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0b00 => Self::Ieee802154_2003,
            0b01 => Self::Ieee802154_2006,
            0b10 => Self::Ieee802154_2020,
            _ => Self::Reserved,
        }
    }
}

impl FrameVersion {
    /// Returns `true` for the 2003 and 2006 revisions.
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Ieee802154_2003 | Self::Ieee802154_2006)
    }
}

/// A reader/writer for the IEEE 802.15.4 Frame Control field.
#[derive(Clone, Copy)]
pub struct FrameControl<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> FrameControl<T> {
    /// Create a new [`FrameControl`] reader/writer from a given buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is too short.
    pub fn new(buffer: T) -> Result<Self> {
        let fc = Self::new_unchecked(buffer);

        if !fc.check_len() {
            return Err(Error);
        }

        Ok(fc)
    }

    /// Returns `false` if the buffer is too short to contain the Frame
    /// Control field.
    pub fn check_len(&self) -> bool {
        self.buffer.as_ref().len() >= 2
    }

    /// Create a new [`FrameControl`] reader/writer from a given buffer
    /// without length checking.
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Copy the two octets into an owned reader.
    pub fn to_owned(&self) -> FrameControl<[u8; 2]> {
        let b = self.buffer.as_ref();
        FrameControl::new_unchecked([b[0], b[1]])
    }

    fn raw(&self) -> u16 {
        let b = &self.buffer.as_ref()[..2];
        u16::from_le_bytes([b[0], b[1]])
    }

    fn bit(&self, shift: u16) -> bool {
        (self.raw() >> shift) & 0b1 == 1
    }

    /// Return the [`FrameType`] field.
    pub fn frame_type(&self) -> FrameType {
        FrameType::from((self.raw() & 0b111) as u8)
    }

    /// Returns `true` when the security enabled field is set.
    pub fn security_enabled(&self) -> bool {
        self.bit(3)
    }

    /// Returns `true` when the frame pending field is set.
    pub fn frame_pending(&self) -> bool {
        self.bit(4)
    }

    /// Returns `true` when the acknowledgement request field is set.
    pub fn ack_request(&self) -> bool {
        self.bit(5)
    }

    /// Returns `true` when the PAN ID compression field is set.
    pub fn pan_id_compression(&self) -> bool {
        self.bit(6)
    }

    /// Returns `true` when the sequence number suppression field is set.
    pub fn sequence_number_suppression(&self) -> bool {
        self.bit(8)
    }

    /// Returns `true` when the information element field is set.
    pub fn information_elements_present(&self) -> bool {
        self.bit(9)
    }

    /// Return the Destination [`AddressingMode`].
    pub fn dst_addressing_mode(&self) -> AddressingMode {
        AddressingMode::from(((self.raw() >> 10) & 0b11) as u8)
    }

    /// Return the [`FrameVersion`].
    pub fn frame_version(&self) -> FrameVersion {
        FrameVersion::from(((self.raw() >> 12) & 0b11) as u8)
    }

    /// Return the Source [`AddressingMode`].
    pub fn src_addressing_mode(&self) -> AddressingMode {
        AddressingMode::from(((self.raw() >> 14) & 0b11) as u8)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> FrameControl<T> {
    fn set_field(&mut self, shift: u16, mask: u16, value: u16) {
        let b = &mut self.buffer.as_mut()[..2];
        let mut raw = u16::from_le_bytes([b[0], b[1]]);
        raw = (raw & !(mask << shift)) | ((value & mask) << shift);
        b.copy_from_slice(&raw.to_le_bytes());
    }

    /// Set the frame type field.
    pub fn set_frame_type(&mut self, frame_type: FrameType) {
        self.set_field(0, 0b111, frame_type as u16);
    }

    /// Set the security enabled field.
    pub fn set_security_enabled(&mut self, security_enabled: bool) {
        self.set_field(3, 0b1, security_enabled as u16);
    }

    /// Set the frame pending field.
    pub fn set_frame_pending(&mut self, frame_pending: bool) {
        self.set_field(4, 0b1, frame_pending as u16);
    }

    /// Set the acknowledgement request field.
    pub fn set_ack_request(&mut self, ack_request: bool) {
        self.set_field(5, 0b1, ack_request as u16);
    }

    /// Set the PAN ID compression field.
    pub fn set_pan_id_compression(&mut self, pan_id_compression: bool) {
        self.set_field(6, 0b1, pan_id_compression as u16);
    }

    /// Set the sequence number suppression field.
    pub fn set_sequence_number_suppression(&mut self, suppression: bool) {
        self.set_field(8, 0b1, suppression as u16);
    }

    /// Set the information element present field.
    pub fn set_information_elements_present(&mut self, present: bool) {
        self.set_field(9, 0b1, present as u16);
    }

    /// Set the destination addressing mode field.
    pub fn set_dst_addressing_mode(&mut self, addressing_mode: AddressingMode) {
        self.set_field(10, 0b11, addressing_mode as u16);
    }

    /// Set the frame version field.
    pub fn set_frame_version(&mut self, frame_version: FrameVersion) {
        self.set_field(12, 0b11, frame_version as u16);
    }

    /// Set the source addressing mode field.
    pub fn set_src_addressing_mode(&mut self, addressing_mode: AddressingMode) {
        self.set_field(14, 0b11, addressing_mode as u16);
    }
}

impl<T: AsRef<[u8]>> core::fmt::Display for FrameControl<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Frame Control")?;
        writeln!(f, "  type: {:?}", self.frame_type())?;
        writeln!(f, "  security enabled: {}", self.security_enabled() as usize)?;
        writeln!(f, "  frame pending: {}", self.frame_pending() as usize)?;
        writeln!(f, "  ack request: {}", self.ack_request() as usize)?;
        writeln!(
            f,
            "  pan id compression: {}",
            self.pan_id_compression() as usize
        )?;
        writeln!(
            f,
            "  sequence number suppression: {}",
            self.sequence_number_suppression() as usize
        )?;
        writeln!(
            f,
            "  information elements present: {}",
            self.information_elements_present() as usize
        )?;
        writeln!(f, "  dst addressing mode: {:?}", self.dst_addressing_mode())?;
        writeln!(f, "  src addressing mode: {:?}", self.src_addressing_mode())?;
        writeln!(f, "  frame version: {:?}", self.frame_version())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_control() {
        let fc = FrameControl::new(&[0x41, 0xd8][..]).unwrap();
        assert_eq!(fc.frame_type(), FrameType::Data);
        assert!(!fc.security_enabled());
        assert!(!fc.ack_request());
        assert!(fc.pan_id_compression());
        assert_eq!(fc.dst_addressing_mode(), AddressingMode::Short);
        assert_eq!(fc.src_addressing_mode(), AddressingMode::Extended);
        assert_eq!(fc.frame_version(), FrameVersion::Ieee802154_2006);
    }

    #[test]
    fn setters_clear_previous_value() {
        let mut fc = FrameControl::new_unchecked([0xff, 0xff]);
        fc.set_ack_request(false);
        fc.set_security_enabled(false);
        fc.set_frame_type(FrameType::Ack);
        fc.set_frame_version(FrameVersion::Ieee802154_2003);
        fc.set_dst_addressing_mode(AddressingMode::Absent);

        assert!(!fc.ack_request());
        assert!(!fc.security_enabled());
        assert!(fc.frame_pending());
        assert_eq!(fc.frame_type(), FrameType::Ack);
        assert_eq!(fc.frame_version(), FrameVersion::Ieee802154_2003);
        assert_eq!(fc.dst_addressing_mode(), AddressingMode::Absent);
        assert_eq!(fc.src_addressing_mode(), AddressingMode::Extended);
    }

    #[test]
    fn too_short() {
        assert!(FrameControl::new(&[0x41][..]).is_err());
    }
}
