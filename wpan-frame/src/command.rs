//! MAC command frame payloads.
//!
//! Every command carries a one octet Command Frame Identifier followed by a
//! fixed size payload. [`CommandId::validate`] checks a received command
//! against the header rules of its identifier; [`CommandRepr`] builds the
//! payload of outgoing commands.

use wpan_macros::frame;

use crate::{Address, AddressingFields, AddressingMode, Error, FrameControl, Result};

/// Command Frame Identifier.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum CommandId {
    /// Association Request.
    AssociationRequest = 0x01,
    /// Association Response.
    AssociationResponse = 0x02,
    /// Disassociation Notification.
    DisassociationNotification = 0x03,
    /// Data Request.
    DataRequest = 0x04,
    /// PAN ID Conflict Notification.
    PanIdConflictNotification = 0x05,
    /// Orphan Notification.
    OrphanNotification = 0x06,
    /// Beacon Request.
    BeaconRequest = 0x07,
    /// Coordinator Realignment.
    CoordinatorRealignment = 0x08,
    /// GTS Request.
    GtsRequest = 0x09,
}

impl TryFrom<u8> for CommandId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0x01 => Self::AssociationRequest,
            0x02 => Self::AssociationResponse,
            0x03 => Self::DisassociationNotification,
            0x04 => Self::DataRequest,
            0x05 => Self::PanIdConflictNotification,
            0x06 => Self::OrphanNotification,
            0x07 => Self::BeaconRequest,
            0x08 => Self::CoordinatorRealignment,
            0x09 => Self::GtsRequest,
            _ => return Err(Error),
        })
    }
}

/// Header settings a command frame must be built with.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct CommandHeaderRules {
    /// Acknowledgment request bit.
    pub ack_request: bool,
    /// PAN ID compression bit, `None` when it depends on the destination
    /// address being present.
    pub pan_id_compression: Option<bool>,
    /// Allowed source addressing modes.
    pub src: &'static [AddressingMode],
    /// Allowed destination addressing modes.
    pub dst: &'static [AddressingMode],
}

const EXT: &[AddressingMode] = &[AddressingMode::Extended];
const SHORT: &[AddressingMode] = &[AddressingMode::Short];
const NONE: &[AddressingMode] = &[AddressingMode::Absent];
const SHORT_OR_EXT: &[AddressingMode] = &[AddressingMode::Short, AddressingMode::Extended];
const ANY: &[AddressingMode] = &[
    AddressingMode::Absent,
    AddressingMode::Short,
    AddressingMode::Extended,
];

impl CommandId {
    /// Return the allowed payload lengths, excluding the identifier octet.
    pub const fn payload_lengths(&self) -> &'static [usize] {
        match self {
            Self::AssociationRequest => &[1],
            Self::AssociationResponse => &[3],
            Self::DisassociationNotification => &[1],
            Self::DataRequest
            | Self::PanIdConflictNotification
            | Self::OrphanNotification
            | Self::BeaconRequest => &[0],
            Self::CoordinatorRealignment => &[7, 8],
            Self::GtsRequest => &[1],
        }
    }

    /// Return the header rules for this command.
    pub fn header_rules(&self) -> CommandHeaderRules {
        let rules = |ack_request, pan_id_compression, src, dst| CommandHeaderRules {
            ack_request,
            pan_id_compression,
            src,
            dst,
        };

        match self {
            Self::AssociationRequest => rules(true, Some(false), EXT, SHORT_OR_EXT),
            Self::AssociationResponse => rules(true, Some(true), EXT, EXT),
            Self::DisassociationNotification => rules(true, Some(true), EXT, SHORT_OR_EXT),
            Self::DataRequest => rules(true, None, SHORT_OR_EXT, ANY),
            Self::PanIdConflictNotification => rules(true, Some(true), EXT, EXT),
            Self::OrphanNotification => rules(false, Some(true), EXT, SHORT),
            Self::BeaconRequest => rules(false, Some(false), NONE, SHORT),
            Self::CoordinatorRealignment => rules(false, Some(false), EXT, SHORT_OR_EXT),
            Self::GtsRequest => rules(true, Some(false), SHORT, NONE),
        }
    }

    /// Validate a received command frame against the rules of its
    /// identifier.
    pub fn validate<F: AsRef<[u8]>, A: AsRef<[u8]>>(
        &self,
        fc: &FrameControl<F>,
        addressing: &AddressingFields<A>,
        payload_len: usize,
    ) -> Result<()> {
        if !self.payload_lengths().contains(&payload_len) {
            return Err(Error);
        }

        let rules = self.header_rules();

        if fc.ack_request() != rules.ack_request {
            return Err(Error);
        }

        let dst_mode = fc.dst_addressing_mode();
        let src_mode = fc.src_addressing_mode();

        if !rules.src.contains(&src_mode) || !rules.dst.contains(&dst_mode) {
            return Err(Error);
        }

        let expected_compression = rules
            .pan_id_compression
            .unwrap_or(dst_mode != AddressingMode::Absent);
        if fc.pan_id_compression() != expected_compression {
            return Err(Error);
        }

        match self {
            Self::AssociationRequest if addressing.src_pan_id() != Some(0xffff) => Err(Error),
            Self::OrphanNotification | Self::BeaconRequest
                if addressing.dst_address() != Address::BROADCAST =>
            {
                Err(Error)
            }
            Self::CoordinatorRealignment
                if dst_mode == AddressingMode::Short
                    && addressing.dst_address() != Address::BROADCAST =>
            {
                Err(Error)
            }
            _ => Ok(()),
        }
    }
}

bitflags::bitflags! {
    /// Capability Information field of an Association Request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapabilityInformation: u8 {
        /// The device is capable of becoming a PAN coordinator.
        const ALTERNATE_PAN_COORDINATOR = 0b0000_0001;
        /// The device is a full function device.
        const FULL_FUNCTION_DEVICE = 0b0000_0010;
        /// The device is mains powered.
        const MAINS_POWERED = 0b0000_0100;
        /// The receiver is enabled during idle periods.
        const RX_ON_WHEN_IDLE = 0b0000_1000;
        /// Fast association.
        const ASSOCIATION_TYPE = 0b0001_0000;
        /// The device can secure MAC frames.
        const SECURITY_CAPABLE = 0b0100_0000;
        /// The device wants the coordinator to allocate a short address.
        const ALLOCATE_ADDRESS = 0b1000_0000;
    }
}

/// Association status.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum AssociationStatus {
    /// Association successful.
    Successful,
    /// PAN at capacity.
    PanAtCapacity,
    /// PAN access denied.
    PanAccessDenied,
    /// Any other, reserved, value.
    Other(u8),
}

impl From<u8> for AssociationStatus {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Successful,
            0x01 => Self::PanAtCapacity,
            0x02 => Self::PanAccessDenied,
            other => Self::Other(other),
        }
    }
}

impl From<AssociationStatus> for u8 {
    fn from(value: AssociationStatus) -> Self {
        match value {
            AssociationStatus::Successful => 0x00,
            AssociationStatus::PanAtCapacity => 0x01,
            AssociationStatus::PanAccessDenied => 0x02,
            AssociationStatus::Other(other) => other,
        }
    }
}

/// Disassociation reason.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum DisassociationReason {
    /// The coordinator wishes the device to leave the PAN.
    CoordinatorWishes,
    /// The device wishes to leave the PAN.
    DeviceWishes,
    /// Any other, reserved, value.
    Other(u8),
}

impl From<u8> for DisassociationReason {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Self::CoordinatorWishes,
            0x02 => Self::DeviceWishes,
            other => Self::Other(other),
        }
    }
}

impl From<DisassociationReason> for u8 {
    fn from(value: DisassociationReason) -> Self {
        match value {
            DisassociationReason::CoordinatorWishes => 0x01,
            DisassociationReason::DeviceWishes => 0x02,
            DisassociationReason::Other(other) => other,
        }
    }
}

#[frame]
/// Association Response payload.
pub struct AssociationResponse {
    /// Allocated short address, `0xfffe` when none was allocated.
    short_address: u16,
    /// Association status.
    #[into(AssociationStatus)]
    status: u8,
}

#[frame]
/// Coordinator Realignment payload.
pub struct CoordinatorRealignment {
    /// PAN identifier.
    pan_id: u16,
    /// Coordinator short address.
    coordinator_short_address: u16,
    /// Channel number.
    channel: u8,
    /// Short address of the orphaned device.
    short_address: u16,
}

impl<T: AsRef<[u8]>> CoordinatorRealignment<T> {
    /// Return the channel page, if present.
    pub fn channel_page(&self) -> Option<u8> {
        self.buffer.as_ref().get(Self::size()).copied()
    }
}

#[frame]
/// GTS Characteristics field of a GTS Request.
pub struct GtsCharacteristics {
    /// Number of superframe slots requested.
    #[bits(4)]
    length: u8,
    /// `true` for a receive-only GTS.
    #[bits(1)]
    receive_only: bool,
    /// `true` for a GTS allocation, `false` for a deallocation.
    #[bits(1)]
    allocation: bool,
    #[bits(2)]
    _reserved: u8,
}

/// A typed view of a received command payload.
pub enum Command<'a> {
    /// Association Request.
    AssociationRequest(CapabilityInformation),
    /// Association Response.
    AssociationResponse(AssociationResponse<&'a [u8]>),
    /// Disassociation Notification.
    DisassociationNotification(DisassociationReason),
    /// Data Request.
    DataRequest,
    /// PAN ID Conflict Notification.
    PanIdConflictNotification,
    /// Orphan Notification.
    OrphanNotification,
    /// Beacon Request.
    BeaconRequest,
    /// Coordinator Realignment.
    CoordinatorRealignment(CoordinatorRealignment<&'a [u8]>),
    /// GTS Request.
    GtsRequest(GtsCharacteristics<&'a [u8]>),
}

impl<'a> Command<'a> {
    /// Parse a command payload, starting at the identifier octet.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (&cfi, body) = payload.split_first().ok_or(Error)?;
        let id = CommandId::try_from(cfi)?;

        if !id.payload_lengths().contains(&body.len()) {
            return Err(Error);
        }

        Ok(match id {
            CommandId::AssociationRequest => {
                Self::AssociationRequest(CapabilityInformation::from_bits_retain(body[0]))
            }
            CommandId::AssociationResponse => {
                Self::AssociationResponse(AssociationResponse::new(body)?)
            }
            CommandId::DisassociationNotification => {
                Self::DisassociationNotification(DisassociationReason::from(body[0]))
            }
            CommandId::DataRequest => Self::DataRequest,
            CommandId::PanIdConflictNotification => Self::PanIdConflictNotification,
            CommandId::OrphanNotification => Self::OrphanNotification,
            CommandId::BeaconRequest => Self::BeaconRequest,
            CommandId::CoordinatorRealignment => {
                Self::CoordinatorRealignment(CoordinatorRealignment::new(body)?)
            }
            CommandId::GtsRequest => Self::GtsRequest(GtsCharacteristics::new(body)?),
        })
    }

    /// Return the command identifier.
    pub fn id(&self) -> CommandId {
        match self {
            Self::AssociationRequest(_) => CommandId::AssociationRequest,
            Self::AssociationResponse(_) => CommandId::AssociationResponse,
            Self::DisassociationNotification(_) => CommandId::DisassociationNotification,
            Self::DataRequest => CommandId::DataRequest,
            Self::PanIdConflictNotification => CommandId::PanIdConflictNotification,
            Self::OrphanNotification => CommandId::OrphanNotification,
            Self::BeaconRequest => CommandId::BeaconRequest,
            Self::CoordinatorRealignment(_) => CommandId::CoordinatorRealignment,
            Self::GtsRequest(_) => CommandId::GtsRequest,
        }
    }
}

impl core::fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "MAC Command")?;
        writeln!(f, "  id: {:?}", self.id())?;
        match self {
            Self::AssociationRequest(capability) => {
                writeln!(f, "  capability: {:?}", capability)
            }
            Self::AssociationResponse(response) => {
                writeln!(f, "  short address: {:04x}", response.short_address())?;
                writeln!(f, "  status: {:?}", response.status())
            }
            Self::DisassociationNotification(reason) => writeln!(f, "  reason: {:?}", reason),
            Self::CoordinatorRealignment(realignment) => {
                writeln!(f, "  pan id: {:04x}", realignment.pan_id())?;
                writeln!(
                    f,
                    "  coordinator short address: {:04x}",
                    realignment.coordinator_short_address()
                )?;
                writeln!(f, "  channel: {}", realignment.channel())?;
                writeln!(f, "  short address: {:04x}", realignment.short_address())
            }
            Self::GtsRequest(gts) => {
                writeln!(f, "  length: {}", gts.length())?;
                writeln!(f, "  receive only: {}", gts.receive_only() as usize)?;
                writeln!(f, "  allocation: {}", gts.allocation() as usize)
            }
            _ => Ok(()),
        }
    }
}

/// A high-level representation of an outgoing command payload.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum CommandRepr {
    /// Association Request.
    AssociationRequest(CapabilityInformation),
    /// Association Response.
    AssociationResponse {
        /// Allocated short address.
        short_address: u16,
        /// Status.
        status: AssociationStatus,
    },
    /// Disassociation Notification.
    DisassociationNotification(DisassociationReason),
    /// Data Request.
    DataRequest,
    /// Beacon Request.
    BeaconRequest,
    /// Orphan Notification.
    OrphanNotification,
}

impl CommandRepr {
    /// Return the command identifier.
    pub fn id(&self) -> CommandId {
        match self {
            Self::AssociationRequest(_) => CommandId::AssociationRequest,
            Self::AssociationResponse { .. } => CommandId::AssociationResponse,
            Self::DisassociationNotification(_) => CommandId::DisassociationNotification,
            Self::DataRequest => CommandId::DataRequest,
            Self::BeaconRequest => CommandId::BeaconRequest,
            Self::OrphanNotification => CommandId::OrphanNotification,
        }
    }

    /// Return the payload length including the identifier octet.
    pub fn buffer_len(&self) -> usize {
        1 + self.id().payload_lengths()[0]
    }

    /// Emit the payload, including the identifier octet, into `buffer`.
    pub fn emit(&self, buffer: &mut [u8]) {
        buffer[0] = self.id() as u8;
        let body = &mut buffer[1..];
        match *self {
            Self::AssociationRequest(capability) => body[0] = capability.bits(),
            Self::AssociationResponse {
                short_address,
                status,
            } => {
                let mut response = AssociationResponse::new_unchecked(body);
                response.set_short_address(short_address);
                response.set_status(status);
            }
            Self::DisassociationNotification(reason) => body[0] = reason.into(),
            Self::DataRequest | Self::BeaconRequest | Self::OrphanNotification => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_association_response() {
        let payload = [0x02, 0x34, 0x12, 0x00];
        let Command::AssociationResponse(response) = Command::parse(&payload).unwrap() else {
            panic!("not an association response");
        };
        assert_eq!(response.short_address(), 0x1234);
        assert_eq!(response.status(), AssociationStatus::Successful);
    }

    #[test]
    fn wrong_payload_length() {
        assert!(Command::parse(&[0x02, 0x34, 0x12]).is_err());
        assert!(Command::parse(&[0x07, 0x00]).is_err());
        assert!(Command::parse(&[0x0a]).is_err());
        assert!(Command::parse(&[]).is_err());
    }

    #[test]
    fn coordinator_realignment_with_page() {
        let payload = [0x08, 0xcd, 0xab, 0x00, 0x00, 0x0f, 0xfe, 0xff, 0x00];
        let Command::CoordinatorRealignment(r) = Command::parse(&payload).unwrap() else {
            panic!("not a coordinator realignment");
        };
        assert_eq!(r.pan_id(), 0xabcd);
        assert_eq!(r.channel(), 15);
        assert_eq!(r.short_address(), 0xfffe);
        assert_eq!(r.channel_page(), Some(0));
    }

    #[test]
    fn gts_request() {
        let payload = [0x09, 0b0011_0011];
        let Command::GtsRequest(gts) = Command::parse(&payload).unwrap() else {
            panic!("not a gts request");
        };
        assert_eq!(gts.length(), 3);
        assert!(gts.receive_only());
        assert!(gts.allocation());
    }

    #[test]
    fn emit_commands() {
        let repr = CommandRepr::AssociationResponse {
            short_address: 0x0001,
            status: AssociationStatus::PanAtCapacity,
        };
        let mut buffer = [0u8; 4];
        assert_eq!(repr.buffer_len(), 4);
        repr.emit(&mut buffer);
        assert_eq!(buffer, [0x02, 0x01, 0x00, 0x01]);

        let repr = CommandRepr::AssociationRequest(
            CapabilityInformation::FULL_FUNCTION_DEVICE | CapabilityInformation::ALLOCATE_ADDRESS,
        );
        let mut buffer = [0u8; 2];
        repr.emit(&mut buffer);
        assert_eq!(buffer, [0x01, 0x82]);

        let mut buffer = [0u8; 1];
        CommandRepr::BeaconRequest.emit(&mut buffer);
        assert_eq!(buffer, [0x07]);
    }
}
