use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::frame::{Address, BeaconOrder, Mpdu, Payload, SuperframeOrder};
use crate::mac::command::MacIndication;
use crate::mac::MacService;
use crate::phy::radio::Radio;
use crate::security::CcmCipher;
use crate::sixlowpan::HeaderCompression;
use crate::time::Clock;
use crate::upper::UpperLayer;

/// A PAN, as announced by the beacon of its coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PanDescriptor {
    pub channel: u8,
    pub pan_id: u16,
    pub coordinator: Address,
    pub beacon_order: BeaconOrder,
    pub superframe_order: SuperframeOrder,
    pub pan_coordinator: bool,
    pub association_permit: bool,
    pub lqi: u8,
}

impl PanDescriptor {
    /// Describe the PAN of a received beacon.
    pub fn from_beacon(mpdu: &Mpdu<'_>, channel: u8, lqi: u8) -> Option<Self> {
        let Payload::Beacon(beacon) = mpdu.payload() else {
            return None;
        };
        let addressing = mpdu.addressing();
        let superframe = beacon.superframe_specification();

        Some(Self {
            channel,
            pan_id: addressing.src_pan_id()?,
            coordinator: addressing.src_address(),
            beacon_order: superframe.beacon_order(),
            superframe_order: superframe.superframe_order(),
            pan_coordinator: superframe.pan_coordinator(),
            association_permit: superframe.association_permit(),
            lqi,
        })
    }

    /// Whether both describe the same coordinator on the same channel.
    pub fn same_pan(&self, other: &Self) -> bool {
        self.channel == other.channel
            && self.pan_id == other.pan_id
            && self.coordinator == other.coordinator
    }
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
    /// A beacon was received. While scanning it is added to the scan
    /// results, otherwise the upper layer is notified.
    pub(crate) async fn beacon_indication(&self, mpdu: &Mpdu<'_>, lqi: u8) {
        {
            let mut scan = self.scan_ctx_lock.lock().await;
            if scan.active {
                let Some(descriptor) = PanDescriptor::from_beacon(mpdu, scan.channel, lqi) else {
                    return;
                };
                if scan.results.iter().any(|known| known.same_pan(&descriptor)) {
                    return;
                }
                info!(
                    "found PAN {:x} on channel {}",
                    descriptor.pan_id, descriptor.channel
                );
                if scan.results.push(descriptor).is_err() {
                    debug!("scan results full, dropping beacon");
                }
                return;
            }
        }

        let channel = self.ctx_lock.lock().await.channel;
        if let Some(descriptor) = PanDescriptor::from_beacon(mpdu, channel, lqi) {
            self.upper_layer
                .received_mac_indication(MacIndication::Beacon(descriptor))
                .await;
        }
    }
}
