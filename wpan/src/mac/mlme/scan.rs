use core::ops::RangeInclusive;

use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::frame::{Address, CommandRepr, MTU};
use crate::mac::constants::{BASE_SUPERFRAME_DURATION, BROADCAST_PAN_ID, MAX_SCAN_DURATION};
use crate::mac::frames::{create_mac_cmd_frame, CommandAddressing};
use crate::mac::MacService;
use crate::net::Errno;
use crate::phy::constants::{CHANNELS_2450, SYMBOL_RATE_INV_US};
use crate::phy::radio::Radio;
use crate::security::CcmCipher;
use crate::sixlowpan::HeaderCompression;
use crate::sync::select;
use crate::time::Clock;
use crate::upper::UpperLayer;

use super::{ScanContext, ScanRequest, ScanResults};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanType {
    /// Solicit beacons with a Beacon Request on each channel.
    Active,
    /// Only listen.
    Passive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanChannels {
    All,
    Single(u8),
    /// Bit `n` selects channel `n`.
    Mask(u32),
}

impl ScanChannels {
    pub fn contains(&self, channel: u8) -> bool {
        match *self {
            ScanChannels::All => CHANNELS_2450.contains(&channel),
            ScanChannels::Single(single) => single == channel,
            ScanChannels::Mask(mask) => channel < 32 && mask & (1 << channel) != 0,
        }
    }

    /// The selected channels within `range`.
    pub fn within(self, range: RangeInclusive<u8>) -> impl Iterator<Item = u8> {
        range.filter(move |channel| self.contains(*channel))
    }
}

/// Time spent on a channel for a scan duration exponent.
pub fn scan_duration_us(duration: u8) -> u32 {
    BASE_SUPERFRAME_DURATION * ((1 << duration) + 1) * SYMBOL_RATE_INV_US
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
    /// Scan the requested channels for beacons. The radio is tuned back to
    /// the PIB channel afterwards, also when the scan was cancelled.
    pub(crate) async fn scan(&self, request: &ScanRequest) -> Result<ScanResults, Errno> {
        if request.duration > MAX_SCAN_DURATION {
            return Err(Errno::EINVAL);
        }
        {
            let mut scan = self.scan_ctx_lock.lock().await;
            if scan.active {
                return Err(Errno::EALREADY);
            }
            *scan = ScanContext {
                active: true,
                ..Default::default()
            };
        }

        let range = self.radio.lock().await.channel_range();
        let mut outcome = Ok(());
        for channel in request.channels.within(range) {
            if self.scan_ctx_lock.lock().await.cancel {
                info!("scan cancelled before channel {}", channel);
                break;
            }
            if let Err(err) = self.scan_channel(channel, request).await {
                outcome = Err(err);
                break;
            }
        }

        let channel = self.ctx_lock.lock().await.channel;
        let restored = self.tune(channel).await;

        let results = {
            let mut scan = self.scan_ctx_lock.lock().await;
            core::mem::take(&mut *scan).results
        };
        outcome.and(restored)?;
        Ok(results)
    }

    async fn scan_channel(&self, channel: u8, request: &ScanRequest) -> Result<(), Errno> {
        self.tune(channel).await?;
        self.scan_ctx_lock.lock().await.channel = channel;
        trace!("scanning channel {}", channel);

        if request.scan_type == ScanType::Active {
            let mut buffer = [0u8; MTU];
            let emitted = {
                let mut pib = self.ctx_lock.lock().await;
                create_mac_cmd_frame(
                    &mut pib,
                    CommandRepr::BeaconRequest,
                    CommandAddressing {
                        dst_pan_id: BROADCAST_PAN_ID,
                        dst: Address::BROADCAST,
                        src_pan_id: BROADCAST_PAN_ID,
                        src: Address::Absent,
                    },
                    false,
                    &mut buffer,
                )?
            };
            if let Err(err) = self.transmit_frame(&buffer[..emitted.len], None).await {
                // Still listen, beacons may come on their own.
                debug!("beacon request on channel {} failed: {:?}", channel, err);
            }
        }

        let mut timer = self.timer.clone();
        let mut buffer = [0u8; MTU + 1];
        select(
            async {
                loop {
                    self.receive_one(&mut buffer).await;
                }
            },
            timer.delay_us(scan_duration_us(request.duration)),
        )
        .await;
        Ok(())
    }

    /// Stop a running scan before the next channel. The scan returns what
    /// it collected so far. Returns `false` when no scan is running.
    pub async fn cancel_scan(&self) -> bool {
        let mut scan = self.scan_ctx_lock.lock().await;
        if scan.active {
            scan.cancel = true;
        }
        scan.active
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;
    use crate::frame::{validate_frame, Command, Payload};
    use crate::mac::mlme::beacon::tests::beacon_frame;
    use crate::mac::mlme::{AttributeValue, MlmeConfirm, MlmeRequest, PibAttribute};
    use crate::mac::tests::*;
    use crate::mac::{ChannelAccess, MacIndication, MacRequest};
    use crate::phy::radio::tests::{TestRadio, TestRadioEvent};
    use crate::sync::join;

    const PAN_A: u16 = 0x1111;
    const PAN_B: u16 = 0x2222;

    fn is_beacon_request(frame: &[u8]) -> bool {
        matches!(
            validate_frame(frame).map(|mpdu| mpdu.into_payload()),
            Ok(Payload::Command(Command::BeaconRequest))
        )
    }

    /// Coordinators of PAN A on channel 12 and of PAN B on channel 14
    /// answering beacon requests.
    fn radio() -> TestRadio {
        let radio = TestRadio::new(EXT_ADDRESS);
        let handle = radio.clone();
        radio.set_responder(move |frame| {
            if !is_beacon_request(frame) {
                return Vec::new();
            }
            match handle.channel() {
                12 => vec![beacon_frame(PAN_A, Address::from_short(0), true)],
                14 => vec![
                    beacon_frame(PAN_B, Address::Extended(COORD_ADDRESS), false),
                    beacon_frame(PAN_B, Address::Extended(COORD_ADDRESS), false),
                ],
                _ => Vec::new(),
            }
        });
        radio
    }

    fn request(scan_type: ScanType, channels: ScanChannels) -> ScanRequest {
        ScanRequest {
            scan_type,
            channels,
            duration: 2,
        }
    }

    #[test]
    fn channel_selection() {
        let all: Vec<u8> = ScanChannels::All.within(11..=26).collect();
        assert_eq!(all.len(), 16);
        let mask: Vec<u8> = ScanChannels::Mask((1 << 12) | (1 << 14) | (1 << 30))
            .within(11..=26)
            .collect();
        assert_eq!(mask, vec![12, 14]);
        assert_eq!(scan_duration_us(0), 960 * 2 * 16);
    }

    #[pollster::test]
    async fn active_scan_collects_beacons() {
        let harness = Harness::new(radio());
        let mac = mac_service(&harness, ChannelAccess::Aloha);

        let confirm = mac
            .mlme_request(MlmeRequest::Scan(request(
                ScanType::Active,
                ScanChannels::Mask(0b111 << 12),
            )))
            .await;

        let results = match confirm {
            Ok(MlmeConfirm::Scan(results)) => results,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].pan_id, PAN_A);
        assert_eq!(results[0].channel, 12);
        assert!(results[0].association_permit);
        // Duplicates are collected once.
        assert_eq!(results[1].pan_id, PAN_B);
        assert_eq!(results[1].channel, 14);

        // One beacon request per channel, then back to the PIB channel.
        let requests = harness
            .radio
            .transmitted()
            .iter()
            .filter(|frame| is_beacon_request(frame))
            .count();
        assert_eq!(requests, 3);
        assert_eq!(harness.radio.channel(), 11);
        assert!(harness.upper.indications().is_empty());
    }

    #[pollster::test]
    async fn passive_scan_only_listens() {
        let harness = Harness::new(radio());
        let mac = mac_service(&harness, ChannelAccess::Aloha);

        let results = mac
            .scan(&request(ScanType::Passive, ScanChannels::Single(12)))
            .await
            .unwrap();
        assert!(results.is_empty());
        assert!(harness.radio.transmitted().is_empty());
        assert!(harness
            .radio
            .events()
            .contains(&TestRadioEvent::SetChannel(12)));
    }

    #[pollster::test]
    async fn cancelled_scan_keeps_partial_results() {
        let harness = Harness::new(radio());
        let mac = mac_service(&harness, ChannelAccess::Aloha);

        let canceller = async {
            // Wait until the first channel was scanned.
            while harness.radio.channel() != 13 {
                crate::sync::yield_now().await;
            }
            assert!(mac.cancel_scan().await);
        };
        let (results, ()) = join(
            mac.scan(&request(ScanType::Active, ScanChannels::All)),
            canceller,
        )
        .await;

        let results = results.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pan_id, PAN_A);
        assert!(!harness
            .radio
            .events()
            .contains(&TestRadioEvent::SetChannel(20)));
        assert_eq!(harness.radio.channel(), 11);
        assert!(!mac.cancel_scan().await);
    }

    #[pollster::test]
    async fn cancel_request_stops_a_running_scan() {
        let harness = Harness::new(radio());
        let mac = mac_service(&harness, ChannelAccess::Aloha);

        harness.upper.push_request(MacRequest::Mlme(MlmeRequest::Scan(request(
            ScanType::Active,
            ScanChannels::All,
        ))));
        let script = async {
            while harness.radio.channel() != 13 {
                crate::sync::yield_now().await;
            }
            harness
                .upper
                .push_request(MacRequest::Mlme(MlmeRequest::CancelScan));
            harness.upper.push_request(MacRequest::Mlme(MlmeRequest::Get(
                PibAttribute::Channel,
            )));
            while harness.upper.indications().len() < 3 {
                crate::sync::yield_now().await;
            }
        };
        let _ = select(mac.run(), script).await;

        let confirms: Vec<_> = harness
            .upper
            .indications()
            .into_iter()
            .map(|indication| match indication {
                MacIndication::Confirm(confirm) => confirm,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(confirms[0], Ok(MlmeConfirm::CancelScan { cancelled: true }));
        let Ok(MlmeConfirm::Scan(results)) = &confirms[1] else {
            panic!("unexpected {:?}", confirms[1]);
        };
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pan_id, PAN_A);
        // Handled once the scan was over.
        assert_eq!(
            confirms[2],
            Ok(MlmeConfirm::Get(AttributeValue::Channel(11)))
        );
        assert!(!harness
            .radio
            .events()
            .contains(&TestRadioEvent::SetChannel(20)));
    }

    #[pollster::test]
    async fn cancel_without_scan() {
        let harness = Harness::new(radio());
        let mac = mac_service(&harness, ChannelAccess::Aloha);
        assert_eq!(
            mac.mlme_request(MlmeRequest::CancelScan).await,
            Ok(MlmeConfirm::CancelScan { cancelled: false })
        );
    }

    #[pollster::test]
    async fn scan_duration_is_bounded() {
        let harness = Harness::new(radio());
        let mac = mac_service(&harness, ChannelAccess::Aloha);

        let mut request = request(ScanType::Active, ScanChannels::All);
        request.duration = 15;
        assert_eq!(mac.scan(&request).await, Err(Errno::EINVAL));
    }
}
