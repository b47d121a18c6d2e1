use super::*;
use crate::{Address, FrameType, FrameVersion};

/// Marker for acknowledgment frame builders.
pub struct Ack;
/// Marker for beacon frame builders.
pub struct Beacon;
/// Marker for data frame builders.
pub struct Data;
/// Marker for MAC command frame builders.
pub struct MacCommand;

/// A helper for building IEEE 802.15.4 frames.
pub struct FrameBuilder<'p, T> {
    frame: FrameRepr<'p>,
    r#type: core::marker::PhantomData<T>,
}

impl<'p, T> FrameBuilder<'p, T> {
    fn with_type(frame_type: FrameType, payload: Option<&'p [u8]>) -> Self {
        Self {
            frame: FrameRepr {
                frame_control: FrameControlRepr::new(frame_type),
                sequence_number: None,
                addressing_fields: None,
                aux_security_header: None,
                payload,
            },
            r#type: core::marker::PhantomData,
        }
    }
}

impl<'p> FrameBuilder<'p, Ack> {
    /// Create a new builder for an immediate acknowledgment frame.
    pub fn new_imm_ack(sequence_number: u8) -> Self {
        Self::with_type(FrameType::Ack, None).set_sequence_number(sequence_number)
    }
}

impl<'p> FrameBuilder<'p, Beacon> {
    /// Create a new builder for a beacon frame.
    pub fn new_beacon(payload: &'p [u8]) -> Self {
        Self::with_type(FrameType::Beacon, Some(payload))
    }
}

impl<'p> FrameBuilder<'p, Data> {
    /// Create a new builder for a data frame.
    pub fn new_data(payload: &'p [u8]) -> Self {
        Self::with_type(FrameType::Data, Some(payload))
    }
}

impl<'p> FrameBuilder<'p, MacCommand> {
    /// Create a new builder for a MAC command frame. The payload starts with
    /// the command frame identifier.
    pub fn new_mac_command(payload: &'p [u8]) -> Self {
        Self::with_type(FrameType::MacCommand, Some(payload))
    }
}

impl<'p, T> FrameBuilder<'p, T> {
    /// Set the frame sequence number.
    ///
    /// # Note
    /// This method disables sequence number suppression.
    pub fn set_sequence_number(mut self, sequence_number: u8) -> Self {
        self.frame.sequence_number = Some(sequence_number);
        self.frame.frame_control.sequence_number_suppression = false;
        self
    }

    /// Set the acknowledgment request bit.
    pub fn set_ack_request(mut self, ack_request: bool) -> Self {
        self.frame.frame_control.ack_request = ack_request;
        self
    }

    /// Set the frame pending bit.
    pub fn set_frame_pending(mut self, frame_pending: bool) -> Self {
        self.frame.frame_control.frame_pending = frame_pending;
        self
    }

    /// Set the frame version.
    pub fn set_frame_version(mut self, version: FrameVersion) -> Self {
        self.frame.frame_control.frame_version = version;
        self
    }

    /// Set the destination PAN ID.
    pub fn set_dst_pan_id(mut self, pan_id: u16) -> Self {
        self.frame
            .addressing_fields
            .get_or_insert_with(AddressingFieldsRepr::default)
            .dst_pan_id = Some(pan_id);
        self
    }

    /// Set the source PAN ID.
    pub fn set_src_pan_id(mut self, pan_id: u16) -> Self {
        self.frame
            .addressing_fields
            .get_or_insert_with(AddressingFieldsRepr::default)
            .src_pan_id = Some(pan_id);
        self
    }

    /// Set the destination address.
    ///
    /// # Note
    /// Based on the address, the addressing mode will be set.
    pub fn set_dst_address(mut self, address: Address) -> Self {
        self.frame.frame_control.dst_addressing_mode = address.into();
        self.frame
            .addressing_fields
            .get_or_insert_with(AddressingFieldsRepr::default)
            .dst_address = Some(address).filter(|a| !a.is_empty());
        self
    }

    /// Set the source address.
    ///
    /// # Note
    /// Based on the address, the addressing mode will be set.
    pub fn set_src_address(mut self, address: Address) -> Self {
        self.frame.frame_control.src_addressing_mode = address.into();
        self.frame
            .addressing_fields
            .get_or_insert_with(AddressingFieldsRepr::default)
            .src_address = Some(address).filter(|a| !a.is_empty());
        self
    }

    /// Add an auxiliary security header.
    ///
    /// # Note
    /// This method sets the security enabled bit; room for the MIC is
    /// reserved after the payload.
    pub fn set_security(mut self, header: AuxSecurityHeaderRepr) -> Self {
        self.frame.frame_control.security_enabled = true;
        self.frame.aux_security_header = Some(header);
        self
    }

    /// Set the frame payload.
    pub fn set_payload(mut self, payload: &'p [u8]) -> Self {
        self.frame.payload = Some(payload);
        self
    }

    /// Finalize the frame builder, returning the frame representation.
    ///
    /// # Note
    /// This method will check and set if PAN ID compression is possible,
    /// depending on the frame version. It fails when the resulting frame
    /// does not fit in the MTU.
    pub fn finalize(mut self) -> Result<FrameRepr<'p>> {
        if matches!(self.frame.frame_control.frame_type, FrameType::Ack) {
            // The sequence number is required for immediate acknowledgment frames.
            if self.frame.sequence_number.is_none() {
                return Err(Error);
            }

            // The addressing fields are not present in acknowledgment frames.
            self.frame.addressing_fields = None;
            self.frame.frame_control.dst_addressing_mode = crate::AddressingMode::Absent;
            self.frame.frame_control.src_addressing_mode = crate::AddressingMode::Absent;
        } else if self.frame.frame_control.frame_version == FrameVersion::Ieee802154_2020 {
            let Some(addr) = self.frame.addressing_fields.as_mut() else {
                return Err(Error);
            };

            self.frame.frame_control.pan_id_compression = match (
                addr.dst_address,
                addr.src_address,
                addr.dst_pan_id,
                addr.src_pan_id,
            ) {
                (None, None, None, None) => false,
                (None, None, Some(_), None) => true,
                (Some(_), None, Some(_), None) => false,
                (None, Some(_), None, Some(_)) => false,
                (None, Some(_), None, None) => true,
                (Some(Address::Extended(_)), Some(Address::Extended(_)), Some(_), None) => false,
                (Some(Address::Extended(_)), Some(Address::Extended(_)), None, None) => true,
                (Some(_), Some(_), Some(dst), Some(src)) => {
                    if dst == src {
                        addr.src_pan_id = None;
                    }

                    dst == src
                }
                (Some(_), Some(_), Some(_), None) => true,
                _ => return Err(Error),
            };
        } else {
            // - If both destination and source addresses are present, and the PAN IDs are
            //   equal, then PAN ID compression is possible. In this case, the source PAN ID
            //   field is omitted and the PAN ID compression bit is set to 1. If PAN IDs are
            //   different, the PAN ID compression bit is set to 0.
            // - If only either the destination or source address is present, the PAN ID
            //   compression bit is set to 0. The PAN ID field of the single address shall
            //   be included in the frame.
            let Some(addr) = self.frame.addressing_fields.as_mut() else {
                return Err(Error);
            };

            match (
                addr.dst_address,
                addr.src_address,
                addr.dst_pan_id,
                addr.src_pan_id,
            ) {
                (Some(_), Some(_), Some(dst_pan_id), Some(src_pan_id)) => {
                    self.frame.frame_control.pan_id_compression = dst_pan_id == src_pan_id;
                    if dst_pan_id == src_pan_id {
                        addr.src_pan_id = None;
                    }
                }
                (Some(_), Some(_), Some(_), None) => {
                    self.frame.frame_control.pan_id_compression = true;
                }
                (Some(_), None, Some(_), _) => {
                    self.frame.frame_control.pan_id_compression = false;
                    addr.src_pan_id = None;
                }
                (None, Some(_), _, Some(_)) => {
                    self.frame.frame_control.pan_id_compression = false;
                    addr.dst_pan_id = None;
                }
                _ => return Err(Error),
            }
        }

        if self.frame.buffer_len() + crate::FCS_LENGTH > crate::MTU {
            return Err(Error);
        }

        Ok(self.frame)
    }
}
