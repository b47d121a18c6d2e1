//! MAC sublayer management: scanning, association, and access to the PIB.
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;
use rand_core::RngCore;

use crate::frame::{Address, CapabilityInformation, DisassociationReason, KeyIdMode, SecurityLevel};
use crate::net::Errno;
use crate::phy::radio::Radio;
use crate::security::{CcmCipher, MAX_KEY_LENGTH};
use crate::sixlowpan::HeaderCompression;
use crate::time::Clock;
use crate::upper::UpperLayer;

use super::constants::MAX_PAN_DESCRIPTORS;
use super::MacService;

pub mod associate;
pub mod beacon;
pub mod commands;
pub mod disassociate;
pub mod scan;
pub mod set;

pub use beacon::PanDescriptor;
pub use scan::{ScanChannels, ScanType};

/// Collected beacons, in order of reception.
pub type ScanResults = Vec<PanDescriptor, MAX_PAN_DESCRIPTORS>;

/// State of a running scan, guarded by its own lock so that a scan can be
/// cancelled while it runs.
#[derive(Debug, Default)]
pub struct ScanContext {
    pub(crate) active: bool,
    pub(crate) cancel: bool,
    /// Channel being listened to.
    pub(crate) channel: u8,
    pub(crate) results: ScanResults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanRequest {
    pub scan_type: ScanType,
    pub channels: ScanChannels,
    /// Time spent on each channel, `BASE_SUPERFRAME_DURATION * (2^n + 1)`
    /// symbols.
    pub duration: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociateRequest {
    pub channel: u8,
    pub pan_id: u16,
    pub coordinator: Address,
    pub capability: CapabilityInformation,
}

/// Attributes of the PIB that may be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PibAttribute {
    Channel,
    PanId,
    ExtendedAddress,
    ShortAddress,
    TxPower,
    AckRequested,
    SecurityLevel,
    KeyIdMode,
    FrameCounter,
    CoordExtendedAddress,
    CoordShortAddress,
    Associated,
}

/// Value of a PIB attribute. The key can be written but never read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Channel(u8),
    PanId(u16),
    ExtendedAddress([u8; 8]),
    ShortAddress(u16),
    TxPower(i8),
    AckRequested(bool),
    SecurityLevel(SecurityLevel),
    KeyIdMode(KeyIdMode),
    Key(Vec<u8, MAX_KEY_LENGTH>),
    FrameCounter(u32),
    CoordExtendedAddress(Option<[u8; 8]>),
    CoordShortAddress(u16),
    Associated(bool),
}

/// Management requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MlmeRequest {
    Scan(ScanRequest),
    /// Stop the running scan before its next channel.
    CancelScan,
    Associate(AssociateRequest),
    Disassociate(DisassociationReason),
    Set(AttributeValue),
    Get(PibAttribute),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MlmeConfirm {
    Scan(ScanResults),
    /// Whether a scan was running.
    CancelScan { cancelled: bool },
    Associate { short_address: u16 },
    Disassociate,
    Set,
    Get(AttributeValue),
}

impl<R, Rng, U, TIMER, C, K, H> MacService<'_, R, Rng, U, TIMER, C, K, H>
where
    R: Radio,
    Rng: RngCore,
    U: UpperLayer,
    TIMER: DelayNs + Clone,
    C: Clock,
    K: CcmCipher,
    H: HeaderCompression,
{
    /// Execute a management request.
    pub async fn mlme_request(&self, request: MlmeRequest) -> Result<MlmeConfirm, Errno> {
        let confirm = match request {
            MlmeRequest::Scan(request) => MlmeConfirm::Scan(self.scan(&request).await?),
            MlmeRequest::CancelScan => MlmeConfirm::CancelScan {
                cancelled: self.cancel_scan().await,
            },
            MlmeRequest::Associate(request) => MlmeConfirm::Associate {
                short_address: self.associate(&request).await?,
            },
            MlmeRequest::Disassociate(reason) => {
                self.disassociate(reason).await?;
                MlmeConfirm::Disassociate
            }
            MlmeRequest::Set(value) => {
                self.set(value).await?;
                MlmeConfirm::Set
            }
            MlmeRequest::Get(attribute) => MlmeConfirm::Get(self.get(attribute).await),
        };
        Ok(confirm)
    }
}
