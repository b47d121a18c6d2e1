use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::frame::{KeyIdMode, SecurityLevel};
use crate::mac::MacService;
use crate::net::Errno;
use crate::phy::radio::Radio;
use crate::security::{self, CcmCipher};
use crate::sixlowpan::HeaderCompression;
use crate::time::Clock;
use crate::upper::UpperLayer;

use super::{AttributeValue, PibAttribute};

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
    /// Tune the radio, leaving the PIB alone.
    pub(crate) async fn tune(&self, channel: u8) -> Result<(), Errno> {
        self.radio
            .lock()
            .await
            .set_channel(channel)
            .map_err(|_| Errno::EINVAL)
    }

    /// Used by the next higher layer to attempt to write the given value to
    /// the indicated MAC PIB attribute.
    ///
    /// The PAN ID and the short address belong to the association and are
    /// refused with `EBUSY` while associated.
    pub(crate) async fn set(&self, value: AttributeValue) -> Result<(), Errno> {
        let mut filter_changed = false;
        {
            let mut pib = self.ctx_lock.lock().await;
            match value {
                AttributeValue::Channel(channel) => {
                    self.tune(channel).await?;
                    pib.channel = channel;
                }
                AttributeValue::PanId(pan_id) => {
                    if pib.is_associated() {
                        return Err(Errno::EBUSY);
                    }
                    pib.pan_id = pan_id;
                    filter_changed = true;
                }
                AttributeValue::ShortAddress(short_address) => {
                    if pib.is_associated() {
                        return Err(Errno::EBUSY);
                    }
                    pib.short_address = short_address;
                    filter_changed = true;
                }
                AttributeValue::ExtendedAddress(extended_address) => {
                    pib.extended_address = extended_address;
                    filter_changed = true;
                }
                AttributeValue::TxPower(dbm) => {
                    self.radio
                        .lock()
                        .await
                        .set_tx_power(dbm)
                        .map_err(|_| Errno::EINVAL)?;
                    pib.tx_power = dbm;
                }
                AttributeValue::AckRequested(ack_requested) => pib.ack_requested = ack_requested,
                AttributeValue::SecurityLevel(SecurityLevel::Enc) => {
                    warn!("encryption without authentication is not supported");
                    return Err(Errno::EOPNOTSUPP);
                }
                AttributeValue::SecurityLevel(level) => pib.security.set_level(level),
                AttributeValue::KeyIdMode(KeyIdMode::Implicit) => {
                    pib.security.set_key_id_mode(KeyIdMode::Implicit)
                }
                AttributeValue::KeyIdMode(_) => return Err(Errno::EOPNOTSUPP),
                AttributeValue::Key(key) => {
                    pib.security.set_key(&key).map_err(|err| match err {
                        security::Error::InvalidKey => Errno::EINVAL,
                        _ => Errno::EPERM,
                    })?
                }
                AttributeValue::FrameCounter(frame_counter) => {
                    pib.security.set_frame_counter(frame_counter)
                }
                AttributeValue::CoordExtendedAddress(_)
                | AttributeValue::CoordShortAddress(_)
                | AttributeValue::Associated(_) => return Err(Errno::EPERM),
            }
        }

        if filter_changed {
            self.update_filter().await;
        }
        Ok(())
    }

    /// Read a PIB attribute.
    pub(crate) async fn get(&self, attribute: PibAttribute) -> AttributeValue {
        let pib = self.ctx_lock.lock().await;
        match attribute {
            PibAttribute::Channel => AttributeValue::Channel(pib.channel),
            PibAttribute::PanId => AttributeValue::PanId(pib.pan_id),
            PibAttribute::ExtendedAddress => AttributeValue::ExtendedAddress(pib.extended_address),
            PibAttribute::ShortAddress => AttributeValue::ShortAddress(pib.short_address),
            PibAttribute::TxPower => AttributeValue::TxPower(pib.tx_power),
            PibAttribute::AckRequested => AttributeValue::AckRequested(pib.ack_requested),
            PibAttribute::SecurityLevel => AttributeValue::SecurityLevel(pib.security.level()),
            PibAttribute::KeyIdMode => AttributeValue::KeyIdMode(pib.security.key_id_mode()),
            PibAttribute::FrameCounter => AttributeValue::FrameCounter(pib.security.frame_counter()),
            PibAttribute::CoordExtendedAddress => {
                AttributeValue::CoordExtendedAddress(pib.coord_extended_address)
            }
            PibAttribute::CoordShortAddress => {
                AttributeValue::CoordShortAddress(pib.coord_short_address)
            }
            PibAttribute::Associated => AttributeValue::Associated(pib.is_associated()),
        }
    }
}

#[cfg(test)]
mod tests {
    use heapless::Vec;

    use super::*;
    use crate::mac::mlme::{MlmeConfirm, MlmeRequest};
    use crate::mac::tests::*;
    use crate::mac::{AssociationState, ChannelAccess};
    use crate::phy::radio::tests::{TestRadio, TestRadioEvent};
    use crate::phy::radio::{Capabilities, Filter};

    async fn set(mac: &TestMac<'_>, value: AttributeValue) -> Result<MlmeConfirm, Errno> {
        mac.mlme_request(MlmeRequest::Set(value)).await
    }

    async fn get(mac: &TestMac<'_>, attribute: PibAttribute) -> AttributeValue {
        match mac.mlme_request(MlmeRequest::Get(attribute)).await {
            Ok(MlmeConfirm::Get(value)) => value,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[pollster::test]
    async fn channel_is_checked_against_the_radio() {
        let harness = Harness::new(TestRadio::new(EXT_ADDRESS));
        let mac = mac_service(&harness, ChannelAccess::Aloha);

        assert_eq!(set(&mac, AttributeValue::Channel(20)).await, Ok(MlmeConfirm::Set));
        assert_eq!(harness.radio.channel(), 20);
        assert_eq!(get(&mac, PibAttribute::Channel).await, AttributeValue::Channel(20));

        assert_eq!(set(&mac, AttributeValue::Channel(27)).await, Err(Errno::EINVAL));
        assert_eq!(get(&mac, PibAttribute::Channel).await, AttributeValue::Channel(20));
    }

    #[pollster::test]
    async fn frame_counter_can_be_restored() {
        let harness = Harness::new(TestRadio::new(EXT_ADDRESS));
        let mac = mac_service(&harness, ChannelAccess::Aloha);

        assert_eq!(
            set(&mac, AttributeValue::FrameCounter(0x1000)).await,
            Ok(MlmeConfirm::Set)
        );
        assert_eq!(
            get(&mac, PibAttribute::FrameCounter).await,
            AttributeValue::FrameCounter(0x1000)
        );
    }

    #[pollster::test]
    async fn addresses_update_the_filter() {
        let radio = TestRadio::new(EXT_ADDRESS)
            .with_capabilities(Capabilities::FCS | Capabilities::FILTER);
        let harness = Harness::new(radio);
        let mac = mac_service(&harness, ChannelAccess::Aloha);

        set(&mac, AttributeValue::PanId(PAN_ID)).await.unwrap();
        set(&mac, AttributeValue::ShortAddress(0x0042)).await.unwrap();

        let last = harness.radio.events().pop();
        assert_eq!(
            last,
            Some(TestRadioEvent::Filter(Filter {
                pan_id: PAN_ID,
                short_address: crate::frame::Address::from_short(0x0042),
                extended_address: EXT_ADDRESS,
            }))
        );
    }

    #[pollster::test]
    async fn association_owns_pan_id_and_short_address() {
        let harness = Harness::new(TestRadio::new(EXT_ADDRESS));
        let mac = mac_service(&harness, ChannelAccess::Aloha);
        mac.ctx_lock.lock().await.association = AssociationState::Associated;

        assert_eq!(set(&mac, AttributeValue::PanId(0x1234)).await, Err(Errno::EBUSY));
        assert_eq!(
            set(&mac, AttributeValue::ShortAddress(0x0001)).await,
            Err(Errno::EBUSY)
        );
        assert_eq!(get(&mac, PibAttribute::PanId).await, AttributeValue::PanId(0xffff));
        assert_eq!(
            get(&mac, PibAttribute::Associated).await,
            AttributeValue::Associated(true)
        );
        assert!(set(&mac, AttributeValue::TxPower(4)).await.is_ok());
        assert_eq!(set(&mac, AttributeValue::TxPower(30)).await, Err(Errno::EINVAL));
    }

    #[pollster::test]
    async fn security_settings() {
        let harness = Harness::new(TestRadio::new(EXT_ADDRESS));
        let mac = mac_service(&harness, ChannelAccess::Aloha);

        assert_eq!(
            set(&mac, AttributeValue::SecurityLevel(SecurityLevel::Enc)).await,
            Err(Errno::EOPNOTSUPP)
        );
        assert_eq!(
            set(&mac, AttributeValue::KeyIdMode(KeyIdMode::Index)).await,
            Err(Errno::EOPNOTSUPP)
        );
        assert_eq!(
            set(&mac, AttributeValue::Key(Vec::new())).await,
            Err(Errno::EINVAL)
        );

        set(&mac, AttributeValue::SecurityLevel(SecurityLevel::EncMic64))
            .await
            .unwrap();
        set(&mac, AttributeValue::Key(Vec::from_slice(&[7; 16]).unwrap()))
            .await
            .unwrap();
        assert_eq!(
            get(&mac, PibAttribute::SecurityLevel).await,
            AttributeValue::SecurityLevel(SecurityLevel::EncMic64)
        );
        assert!(mac.pib().await.security.is_enabled());
    }
}
