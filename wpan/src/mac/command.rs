use heapless::Vec;

use crate::config::IPV6_MTU;
use crate::frame::{Address, CommandId, DisassociationReason};
use crate::net::Errno;
use crate::sixlowpan::Datagram;

use super::mlme::beacon::PanDescriptor;
use super::mlme::{MlmeConfirm, MlmeRequest};

/// Requests an upper layer hands over to the MAC service.
#[derive(Debug, Clone)]
pub enum MacRequest {
    Data(DataRequest),
    Mlme(MlmeRequest),
}

/// Transfer of an IPv6 datagram to another device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    pub dst: Address,
    pub payload: Vec<u8, IPV6_MTU>,
    /// Send `payload` as is, in a single frame, without 6LoWPAN processing.
    pub raw: bool,
}

impl DataRequest {
    pub fn new(dst: Address, payload: &[u8]) -> Option<Self> {
        Some(Self {
            dst,
            payload: Vec::from_slice(payload).ok()?,
            raw: false,
        })
    }
}

/// Everything the MAC service reports to the upper layer.
#[derive(Debug, Clone)]
pub enum MacIndication {
    /// A datagram, decoded or reassembled.
    Datagram {
        src: Address,
        dst: Address,
        datagram: Datagram,
        lqi: u8,
    },
    /// A beacon received outside of a scan.
    Beacon(PanDescriptor),
    /// The coordinator dissociated us.
    Disassociated(DisassociationReason),
    /// A MAC command with no handler on a device.
    Command { src: Address, id: CommandId },
    /// Outcome of an [`MlmeRequest`].
    Confirm(Result<MlmeConfirm, Errno>),
}
