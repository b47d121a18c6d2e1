//! High-level representation of IEEE 802.15.4 frames.

use crate::{
    AuxSecurityHeaderRepr, Error, Frame, FrameControl, Result, FCS_LENGTH, MTU,
};

mod addressing;
pub use addressing::AddressingFieldsRepr;

mod frame_control;
pub use frame_control::FrameControlRepr;

mod builder;
pub use builder::{Ack, Beacon, Data, FrameBuilder, MacCommand};

/// A high-level representation of an IEEE 802.15.4 frame.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct FrameRepr<'p> {
    /// The frame control field.
    pub frame_control: FrameControlRepr,
    /// The sequence number.
    pub sequence_number: Option<u8>,
    /// The addressing fields.
    pub addressing_fields: Option<AddressingFieldsRepr>,
    /// The auxiliary security header.
    pub aux_security_header: Option<AuxSecurityHeaderRepr>,
    /// The payload, excluding any MIC.
    pub payload: Option<&'p [u8]>,
}

impl<'f> FrameRepr<'f> {
    /// Parse an IEEE 802.15.4 frame.
    ///
    /// For secured frames the MIC is stripped from the payload.
    pub fn parse(reader: &Frame<&'f [u8]>) -> Result<Self> {
        let frame_control = FrameControlRepr::parse(&reader.frame_control());
        let addressing = reader.addressing();
        let addressing_fields = if addressing.is_empty() {
            None
        } else {
            Some(AddressingFieldsRepr::parse(&addressing))
        };
        let aux_security_header = reader
            .auxiliary_security_header()
            .map(|aux| AuxSecurityHeaderRepr::parse(&aux));

        let buffer: &'f [u8] = *reader.as_inner();
        let payload_end = buffer
            .len()
            .checked_sub(reader.mic_len())
            .ok_or(Error)?;
        let payload = buffer.get(reader.header_len()..payload_end).ok_or(Error)?;

        Ok(Self {
            frame_control,
            sequence_number: reader.sequence_number(),
            addressing_fields,
            aux_security_header,
            payload: if payload.is_empty() { None } else { Some(payload) },
        })
    }

    /// Return the length of the MAC header when emitted.
    pub fn header_len(&self) -> usize {
        self.frame_control.buffer_len()
            + self.sequence_number.map(|_| 1).unwrap_or(0)
            + self
                .addressing_fields
                .map(|af| af.buffer_len())
                .unwrap_or(0)
            + self
                .aux_security_header
                .map(|aux| aux.buffer_len())
                .unwrap_or(0)
    }

    /// Return the length of the MIC appended after the payload.
    pub fn mic_len(&self) -> usize {
        self.aux_security_header
            .map(|aux| aux.security_level.mic_length())
            .unwrap_or(0)
    }

    /// Return the length of the frame when emitted into a buffer, without
    /// FCS, including room for the MIC.
    pub fn buffer_len(&self) -> usize {
        self.header_len() + self.payload.map(|p| p.len()).unwrap_or(0) + self.mic_len()
    }

    /// Emit the frame into `buffer`, returning the emitted length.
    ///
    /// The MIC octets are zeroed, the security transform fills them.
    pub fn emit(&self, buffer: &mut [u8]) -> Result<usize> {
        let len = self.buffer_len();
        if buffer.len() < len || len + FCS_LENGTH > MTU {
            return Err(Error);
        }

        self.frame_control
            .emit(&mut FrameControl::new_unchecked(&mut buffer[..2]));
        let mut offset = 2;

        if let Some(sequence_number) = self.sequence_number {
            buffer[offset] = sequence_number;
            offset += 1;
        }

        if let Some(af) = &self.addressing_fields {
            af.emit(&mut buffer[offset..]);
            offset += af.buffer_len();
        }

        if let Some(aux) = &self.aux_security_header {
            aux.emit(&mut buffer[offset..]);
            offset += aux.buffer_len();
        }

        if let Some(payload) = self.payload {
            buffer[offset..][..payload.len()].copy_from_slice(payload);
            offset += payload.len();
        }

        buffer[offset..len].fill(0);

        Ok(len)
    }
}
