//! Channel access: unslotted ALOHA and CSMA-CA, below a shared retry loop.
use core::future::poll_fn;

use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::config::{
    MAC_MAX_BE, MAC_MAX_CSMA_BACKOFFS, MAC_MAX_FRAME_RETRIES, MAC_MIN_BE,
    MAC_UNIT_BACKOFF_DURATION,
};
use crate::frame::{append_fcs, FCS_LENGTH, MTU};
use crate::mac::{Error, MacService};
use crate::phy::radio::futures::{receive, transmit};
use crate::phy::radio::{Capabilities, Radio, RxInfo, TxConfig, TxError};
use crate::security::CcmCipher;
use crate::sixlowpan::HeaderCompression;
use crate::sync::Mutex;
use crate::time::Clock;
use crate::upper::UpperLayer;

/// How the MAC layer gets hold of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelAccess {
    /// Transmit right away.
    Aloha,
    /// Clear channel assessment with random exponential backoff. Radios
    /// with [`Capabilities::CSMA`] run it in hardware.
    #[default]
    Csma,
}

/// Backoff exponent state of one CSMA-CA attempt.
pub(crate) struct Backoff<'r, Rng: RngCore> {
    exponent: u8,
    rng: &'r Mutex<Rng>,
}

impl<'r, Rng: RngCore> Backoff<'r, Rng> {
    pub(crate) fn new(rng: &'r Mutex<Rng>) -> Self {
        Self {
            exponent: MAC_MIN_BE,
            rng,
        }
    }

    pub(crate) fn exponent(&self) -> u8 {
        self.exponent
    }

    /// Double the contention window, up to `2^MAC_MAX_BE`.
    pub(crate) fn increase(&mut self) {
        self.exponent = core::cmp::min(self.exponent + 1, MAC_MAX_BE);
    }

    pub(crate) async fn wait<TIMER: DelayNs>(&self, timer: &mut TIMER) {
        // delay periods = random(2^{BE} - 1) periods
        // Page 63 IEEE 802.15.4 2015 edition
        let max_backoff = (1u32 << self.exponent) - 1;
        let periods = self.rng.lock().await.next_u32() % (max_backoff + 1);
        let delay = MAC_UNIT_BACKOFF_DURATION * periods as usize;
        timer.delay_us(delay.as_delay_us()).await;
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
    /// Transmit a frame, given without FCS, through the configured channel
    /// access strategy.
    ///
    /// When `ack_request` holds the sequence number of the frame, the
    /// transmission is repeated until it is acknowledged, at most
    /// `MAC_MAX_FRAME_RETRIES` times. A channel that stays busy ends the
    /// transmission right away.
    pub(crate) async fn transmit_frame(
        &self,
        frame: &[u8],
        ack_request: Option<u8>,
    ) -> Result<(), Error> {
        let mut buffer = [0u8; MTU];
        let content = buffer.get_mut(..frame.len()).ok_or(Error::FrameTooLong)?;
        content.copy_from_slice(frame);
        let len = self.append_fcs(&mut buffer, frame.len()).await?;
        let capabilities = self.radio.lock().await.capabilities();

        for attempt in 0..=MAC_MAX_FRAME_RETRIES {
            if attempt > 0 {
                debug!("retransmission {} of {:?}", attempt, ack_request);
                self.count(|stats| stats.tx_retries += 1);
            }

            match self.channel_access(&buffer[..len], capabilities).await {
                Ok(()) => {}
                Err(Error::NoAck) => continue,
                Err(err) => {
                    self.count(|stats| stats.tx_failed += 1);
                    return Err(err);
                }
            }

            let Some(sequence_number) = ack_request else {
                return Ok(());
            };
            if capabilities.contains(Capabilities::TX_ACK)
                || self.wait_for_ack(sequence_number).await
            {
                return Ok(());
            }
        }

        self.count(|stats| stats.tx_failed += 1);
        Err(Error::NoAck)
    }

    async fn channel_access(&self, frame: &[u8], capabilities: Capabilities) -> Result<(), Error> {
        match self.access {
            ChannelAccess::Aloha => self.radio_transmit(frame, TxConfig::default()).await,
            ChannelAccess::Csma if capabilities.contains(Capabilities::CSMA) => {
                self.radio_transmit(frame, TxConfig { cca: true }).await
            }
            ChannelAccess::Csma => self.csma_ca(frame).await,
        }
    }

    /// Unslotted CSMA-CA: back off, assess the channel, and widen the
    /// contention window each time the channel is busy.
    async fn csma_ca(&self, frame: &[u8]) -> Result<(), Error> {
        let mut timer = self.timer.clone();
        let mut backoff = Backoff::new(self.rng);

        for number_of_backoffs in 0..=MAC_MAX_CSMA_BACKOFFS {
            if number_of_backoffs > 0 {
                backoff.increase();
                trace!(
                    "channel busy, backoff {} with BE {}",
                    number_of_backoffs,
                    backoff.exponent()
                );
            }
            backoff.wait(&mut timer).await;

            let clear = {
                let mut radio = self.radio.lock().await;
                poll_fn(|cx| radio.cca(cx)).await
            };
            if clear {
                return self.radio_transmit(frame, TxConfig::default()).await;
            }
        }

        debug!("channel access failure");
        Err(Error::ChannelAccessFailure)
    }

    pub(crate) async fn radio_transmit(&self, frame: &[u8], config: TxConfig) -> Result<(), Error> {
        let mut radio = self.radio.lock().await;
        transmit(&mut *radio, frame, config)
            .await
            .map_err(|err| match err {
                TxError::ChannelBusy => Error::ChannelAccessFailure,
                TxError::NoAck => Error::NoAck,
                TxError::Failed => Error::TxFailed,
            })
    }

    pub(crate) async fn receive_raw(&self, buffer: &mut [u8; MTU + 1]) -> Option<RxInfo> {
        let mut radio = self.radio.lock().await;
        receive(&mut *radio, buffer).await
    }

    /// Append the FCS after `len` octets, unless the radio does it.
    pub(crate) async fn append_fcs(&self, buffer: &mut [u8], len: usize) -> Result<usize, Error> {
        if self
            .radio
            .lock()
            .await
            .capabilities()
            .contains(Capabilities::FCS)
        {
            return Ok(len);
        }
        if len + FCS_LENGTH > MTU {
            return Err(Error::FrameTooLong);
        }
        append_fcs(buffer, len).map_err(|_| Error::FrameTooLong)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::mock::StepRng;

    use super::*;
    use crate::mac::tests::{mac_service, Harness, EXT_ADDRESS};
    use crate::phy::radio::tests::{TestRadio, TestRadioEvent};

    fn ccas(radio: &TestRadio) -> usize {
        radio
            .events()
            .iter()
            .filter(|e| matches!(e, TestRadioEvent::Cca(_)))
            .count()
    }

    #[pollster::test]
    async fn backoff_window_doubles_up_to_the_maximum() {
        let rng = Mutex::new(StepRng::new(u64::MAX, 0));
        let mut backoff = Backoff::new(&rng);
        let mut timer = crate::sync::test::Delay::default();
        let clock = timer.clock.clone();

        let mut expected = 0;
        for exponent in MAC_MIN_BE..=MAC_MAX_BE + 2 {
            assert_eq!(backoff.exponent(), exponent.min(MAC_MAX_BE));
            // The largest draw waits the whole window.
            backoff.wait(&mut timer).await;
            expected += MAC_UNIT_BACKOFF_DURATION.as_us()
                * ((1i64 << exponent.min(MAC_MAX_BE)) - 1);
            assert_eq!(clock.now().as_us(), expected);
            backoff.increase();
        }
    }

    #[pollster::test]
    async fn aloha_sends_once_without_ack_request() {
        let harness = Harness::new(TestRadio::new(EXT_ADDRESS));
        let mac = mac_service(&harness, ChannelAccess::Aloha);

        mac.transmit_frame(&[0x41, 0xd8, 0x01, 0xff, 0xff], None)
            .await
            .unwrap();
        assert_eq!(harness.radio.transmitted().len(), 1);
        assert_eq!(ccas(&harness.radio), 0);
    }

    #[pollster::test]
    async fn csma_gives_up_on_a_busy_channel() {
        let harness = Harness::new(TestRadio::new(EXT_ADDRESS));
        harness.radio.inner(|inner| inner.busy_cca = 100);
        let mac = mac_service(&harness, ChannelAccess::Csma);

        assert_eq!(
            mac.transmit_frame(&[0x41, 0xd8, 0x01, 0xff, 0xff], Some(1))
                .await,
            Err(Error::ChannelAccessFailure)
        );
        // One assessment per backoff, and no retransmission.
        assert_eq!(ccas(&harness.radio), MAC_MAX_CSMA_BACKOFFS as usize + 1);
        assert!(harness.radio.transmitted().is_empty());
        assert_eq!(mac.stats().tx_failed, 1);
    }

    #[pollster::test]
    async fn csma_transmits_once_the_channel_clears() {
        let harness = Harness::new(TestRadio::new(EXT_ADDRESS).with_auto_ack());
        harness.radio.inner(|inner| inner.busy_cca = 2);
        let mac = mac_service(&harness, ChannelAccess::Csma);

        mac.transmit_frame(&[0x61, 0xd8, 0x07, 0xff, 0xff], Some(7))
            .await
            .unwrap();
        assert_eq!(ccas(&harness.radio), 3);
        assert_eq!(harness.radio.transmitted().len(), 1);
    }

    #[pollster::test]
    async fn hardware_csma_skips_the_assessment() {
        let radio = TestRadio::new(EXT_ADDRESS)
            .with_capabilities(Capabilities::FCS | Capabilities::CSMA | Capabilities::TX_ACK);
        radio.inner(|inner| inner.tx_results.push_back(Err(TxError::ChannelBusy)));
        let harness = Harness::new(radio);
        let mac = mac_service(&harness, ChannelAccess::Csma);

        assert_eq!(
            mac.transmit_frame(&[0x61, 0xd8, 0x07, 0xff, 0xff], Some(7))
                .await,
            Err(Error::ChannelAccessFailure)
        );
        assert_eq!(ccas(&harness.radio), 0);
    }

    #[pollster::test]
    async fn unacknowledged_frames_are_retried() {
        let harness = Harness::new(TestRadio::new(EXT_ADDRESS));
        let mac = mac_service(&harness, ChannelAccess::Aloha);

        assert_eq!(
            mac.transmit_frame(&[0x61, 0xd8, 0x07, 0xff, 0xff], Some(7))
                .await,
            Err(Error::NoAck)
        );
        assert_eq!(
            harness.radio.transmitted().len(),
            MAC_MAX_FRAME_RETRIES as usize + 1
        );
        assert_eq!(mac.stats().tx_retries, MAC_MAX_FRAME_RETRIES as u32);
    }

    #[pollster::test]
    async fn hardware_ack_failures_are_retried() {
        let radio = TestRadio::new(EXT_ADDRESS)
            .with_capabilities(Capabilities::FCS | Capabilities::TX_ACK);
        radio.inner(|inner| {
            inner.tx_results.push_back(Err(TxError::NoAck));
            inner.tx_results.push_back(Ok(()));
        });
        let harness = Harness::new(radio);
        let mac = mac_service(&harness, ChannelAccess::Aloha);

        mac.transmit_frame(&[0x61, 0xd8, 0x07, 0xff, 0xff], Some(7))
            .await
            .unwrap();
        assert_eq!(harness.radio.transmitted().len(), 2);
    }

    #[pollster::test]
    async fn fcs_is_appended_for_radios_without_offload() {
        let radio = TestRadio::new(EXT_ADDRESS).with_capabilities(Capabilities::empty());
        let harness = Harness::new(radio);
        let mac = mac_service(&harness, ChannelAccess::Aloha);

        let frame = [0x41, 0xd8, 0x01, 0xff, 0xff];
        mac.transmit_frame(&frame, None).await.unwrap();

        let sent = &harness.radio.transmitted()[0];
        assert_eq!(sent.len(), frame.len() + FCS_LENGTH);
        let with_fcs = crate::frame::FrameWithFcs::new(&sent[..]).unwrap();
        assert_eq!(with_fcs.content(), &frame);
    }
}
