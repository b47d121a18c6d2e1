//! Reader for a complete MAC frame and the structural validator.

use crate::{
    AddressingFields, AuxiliarySecurityHeader, BeaconPayload, Command, CommandId, Error,
    FrameControl, FrameType, FrameVersion, KeyIdMode, Result, SecurityLevel,
};

/// Shortest valid frame: frame control and sequence number.
pub const MIN_LENGTH: usize = 3;
/// Maximum PSDU size, including the frame check sequence.
pub const MTU: usize = 127;
/// Length of the frame check sequence.
pub const FCS_LENGTH: usize = 2;

/// A reader/writer for an IEEE 802.15.4 frame without frame check sequence.
pub struct Frame<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Frame<T> {
    /// Create a new reader, checking that the header fits in the buffer.
    ///
    /// This only checks lengths. Use [`validate_frame`] for the full set of
    /// structural rules.
    pub fn new(buffer: T) -> Result<Self> {
        let frame = Self::new_unchecked(buffer);

        if !frame.check_len() {
            return Err(Error);
        }

        Ok(frame)
    }

    /// Returns `false` if the header runs past the end of the buffer.
    pub fn check_len(&self) -> bool {
        let buffer = self.buffer.as_ref();

        if buffer.len() < MIN_LENGTH || buffer.len() > MTU {
            return false;
        }

        let fc = self.frame_control();
        let mut offset = self.addressing_offset();
        let Ok(addressing) = AddressingFields::new(&buffer[offset.min(buffer.len())..], &fc) else {
            return false;
        };
        offset += addressing.len();

        if fc.security_enabled() {
            let Some(rest) = buffer.get(offset..) else {
                return false;
            };
            let Ok(aux) = AuxiliarySecurityHeader::new(rest) else {
                return false;
            };
            offset += aux.len();
        }

        buffer.len() >= offset
    }

    /// Create a new reader without checking the length.
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Return the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return a reference to the underlying buffer.
    pub fn as_inner(&self) -> &T {
        &self.buffer
    }

    /// Return a [`FrameControl`] reader.
    pub fn frame_control(&self) -> FrameControl<&[u8]> {
        FrameControl::new_unchecked(&self.buffer.as_ref()[..2])
    }

    /// Return the sequence number, unless suppressed.
    pub fn sequence_number(&self) -> Option<u8> {
        if self.frame_control().sequence_number_suppression() {
            None
        } else {
            Some(self.buffer.as_ref()[2])
        }
    }

    fn addressing_offset(&self) -> usize {
        if self.frame_control().sequence_number_suppression() {
            2
        } else {
            3
        }
    }

    /// Return an [`AddressingFields`] reader.
    pub fn addressing(&self) -> AddressingFields<&[u8]> {
        let fc = self.frame_control();
        let buffer = &self.buffer.as_ref()[self.addressing_offset()..];
        // Only fails through `new_unchecked` with a malformed buffer.
        AddressingFields::new(buffer, &fc).unwrap_or_else(|_| AddressingFields::absent(buffer))
    }

    fn aux_offset(&self) -> usize {
        self.addressing_offset() + self.addressing().len()
    }

    /// Return the Auxiliary Security Header, if security is enabled.
    pub fn auxiliary_security_header(&self) -> Option<AuxiliarySecurityHeader<&[u8]>> {
        if self.frame_control().security_enabled() {
            Some(AuxiliarySecurityHeader::new_unchecked(
                &self.buffer.as_ref()[self.aux_offset()..],
            ))
        } else {
            None
        }
    }

    /// Return the length of the MAC header in octets.
    pub fn header_len(&self) -> usize {
        self.aux_offset()
            + self
                .auxiliary_security_header()
                .map(|aux| aux.len())
                .unwrap_or(0)
    }

    /// Return the length of the message integrity code trailing the payload.
    pub fn mic_len(&self) -> usize {
        self.auxiliary_security_header()
            .map(|aux| aux.security_level().mic_length())
            .unwrap_or(0)
    }

    /// Return the MAC payload, including a trailing MIC for secured frames.
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[self.header_len()..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Frame<T> {
    /// Return a mutable reference to the MAC payload.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let offset = self.header_len();
        &mut self.buffer.as_mut()[offset..]
    }

    /// Set the sequence number.
    pub fn set_sequence_number(&mut self, sequence_number: u8) {
        self.buffer.as_mut()[2] = sequence_number;
    }
}

impl<T: AsRef<[u8]>> core::fmt::Display for Frame<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.frame_control())?;
        if let Some(seq) = self.sequence_number() {
            writeln!(f, "Sequence number: {seq}")?;
        }
        if !self.addressing().is_empty() {
            write!(f, "{}", self.addressing())?;
        }
        if let Some(aux) = self.auxiliary_security_header() {
            write!(f, "{aux}")?;
        }
        Ok(())
    }
}

/// A typed view of a validated MAC payload.
pub enum Payload<'a> {
    /// Beacon payload.
    Beacon(BeaconPayload<&'a [u8]>),
    /// Data payload.
    Data(&'a [u8]),
    /// Acknowledgments carry no payload.
    Ack,
    /// MAC command.
    Command(Command<'a>),
    /// Secured payload, including its MIC. Validate it with
    /// [`validate_payload`] once unsecured.
    Secured(&'a [u8]),
}

/// A validated MAC protocol data unit.
pub struct Mpdu<'a> {
    frame: Frame<&'a [u8]>,
    payload: Payload<'a>,
}

impl<'a> Mpdu<'a> {
    /// Return the frame reader.
    pub fn frame(&self) -> &Frame<&'a [u8]> {
        &self.frame
    }

    /// Return a [`FrameControl`] reader.
    pub fn frame_control(&self) -> FrameControl<&[u8]> {
        self.frame.frame_control()
    }

    /// Return the sequence number, unless suppressed.
    pub fn sequence_number(&self) -> Option<u8> {
        self.frame.sequence_number()
    }

    /// Return an [`AddressingFields`] reader.
    pub fn addressing(&self) -> AddressingFields<&[u8]> {
        self.frame.addressing()
    }

    /// Return the Auxiliary Security Header, if any.
    pub fn auxiliary_security_header(&self) -> Option<AuxiliarySecurityHeader<&[u8]>> {
        self.frame.auxiliary_security_header()
    }

    /// Return the length of the MAC header.
    pub fn header_len(&self) -> usize {
        self.frame.header_len()
    }

    /// Return the typed payload.
    pub fn payload(&self) -> &Payload<'a> {
        &self.payload
    }

    /// Consume the MPDU and return the typed payload.
    pub fn into_payload(self) -> Payload<'a> {
        self.payload
    }
}

/// Validate a received frame (without frame check sequence) and return a
/// typed view of it.
///
/// Frames with Information Elements are refused, as are frame types and
/// versions this codec cannot validate.
pub fn validate_frame(buffer: &[u8]) -> Result<Mpdu<'_>> {
    if buffer.len() < MIN_LENGTH || buffer.len() > MTU {
        return Err(Error);
    }

    let fc = FrameControl::new(&buffer[..2])?;

    let version = fc.frame_version();
    if version == FrameVersion::Reserved {
        return Err(Error);
    }

    if !matches!(
        fc.frame_type(),
        FrameType::Beacon | FrameType::Data | FrameType::Ack | FrameType::MacCommand
    ) {
        return Err(Error);
    }

    if fc.information_elements_present() {
        return Err(Error);
    }

    if cfg!(not(feature = "security")) && fc.security_enabled() {
        return Err(Error);
    }

    let frame = Frame::new(buffer)?;
    let addressing = frame.addressing();

    match fc.frame_type() {
        FrameType::Beacon => {
            if !addressing.dst_address().is_empty()
                || addressing.src_address().is_empty()
                || fc.pan_id_compression()
            {
                return Err(Error);
            }
        }
        FrameType::Data => {
            if addressing.dst_address().is_empty() && addressing.src_address().is_empty() {
                return Err(Error);
            }
        }
        FrameType::MacCommand => {
            if fc.frame_pending() {
                return Err(Error);
            }
        }
        FrameType::Ack => {
            if !addressing.is_empty() {
                return Err(Error);
            }
        }
        _ => return Err(Error),
    }

    if let Some(aux) = frame.auxiliary_security_header() {
        if aux.security_level() == SecurityLevel::None {
            return Err(Error);
        }

        if aux.key_id_mode() != KeyIdMode::Implicit && aux.key_index() == Some(0) {
            return Err(Error);
        }

        if frame.payload().len() < aux.security_level().mic_length() {
            return Err(Error);
        }

        let payload = Payload::Secured(frame_payload(buffer, frame.header_len()));
        return Ok(Mpdu { frame, payload });
    }

    let payload = validate_payload(
        &frame.frame_control(),
        &frame.addressing(),
        frame_payload(buffer, frame.header_len()),
    )?;

    Ok(Mpdu { frame, payload })
}

fn frame_payload(buffer: &[u8], header_len: usize) -> &[u8] {
    &buffer[header_len..]
}

/// Validate a plaintext MAC payload against the frame type described by the
/// header.
pub fn validate_payload<'a, F: AsRef<[u8]>, A: AsRef<[u8]>>(
    fc: &FrameControl<F>,
    addressing: &AddressingFields<A>,
    payload: &'a [u8],
) -> Result<Payload<'a>> {
    match fc.frame_type() {
        FrameType::Beacon => Ok(Payload::Beacon(BeaconPayload::new(payload)?)),
        FrameType::Data if !payload.is_empty() => Ok(Payload::Data(payload)),
        FrameType::Ack if payload.is_empty() => Ok(Payload::Ack),
        FrameType::MacCommand => {
            let (&cfi, body) = payload.split_first().ok_or(Error)?;
            let id = CommandId::try_from(cfi)?;
            id.validate(fc, addressing, body.len())?;
            Ok(Payload::Command(Command::parse(payload)?))
        }
        _ => Err(Error),
    }
}
