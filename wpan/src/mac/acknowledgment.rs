use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::config::MAC_ACK_WAIT_DURATION;
use crate::frame::{validate_frame, FrameBuilder, Payload, FCS_LENGTH, MTU};
use crate::mac::{Error, MacService};
use crate::phy::radio::{Capabilities, Radio, TxConfig};
use crate::security::CcmCipher;
use crate::sixlowpan::HeaderCompression;
use crate::sync::{select, Either};
use crate::time::Clock;
use crate::upper::UpperLayer;

/// Write an immediate acknowledgment for `sequence_number` into `buffer`.
pub fn create_ack_frame(sequence_number: u8, buffer: &mut [u8]) -> Result<usize, Error> {
    FrameBuilder::new_imm_ack(sequence_number)
        .finalize()
        .and_then(|repr| repr.emit(buffer))
        .map_err(|_| Error::FrameTooLong)
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
    /// Acknowledge a received frame, unless the radio already did.
    pub(crate) async fn transmit_ack(&self, sequence_number: u8) {
        let mut buffer = [0u8; MTU];
        let Ok(len) = create_ack_frame(sequence_number, &mut buffer) else {
            return;
        };
        let len = match self.append_fcs(&mut buffer, len).await {
            Ok(len) => len,
            Err(_) => return,
        };

        if let Err(err) = self.radio_transmit(&buffer[..len], TxConfig::default()).await {
            debug!("acknowledgment of {} not sent: {:?}", sequence_number, err);
        }
    }

    /// Wait for the acknowledgment of `sequence_number`. Other frames
    /// received in the meantime are dropped.
    ///
    /// Returns `false` when nothing arrived within the ACK wait duration.
    pub(crate) async fn wait_for_ack(&self, sequence_number: u8) -> bool {
        let mut timer = self.timer.clone();
        let fcs_offload = self
            .radio
            .lock()
            .await
            .capabilities()
            .contains(Capabilities::FCS);

        match select(
            async {
                let mut buffer = [0u8; MTU + 1];
                loop {
                    let Some(info) = self.receive_raw(&mut buffer).await else {
                        continue;
                    };
                    let len = if fcs_offload {
                        info.len
                    } else {
                        info.len.saturating_sub(FCS_LENGTH)
                    };
                    let Ok(mpdu) = validate_frame(&buffer[..len]) else {
                        continue;
                    };
                    if matches!(mpdu.payload(), Payload::Ack)
                        && mpdu.sequence_number() == Some(sequence_number)
                    {
                        break;
                    }
                }
            },
            timer.delay_us(MAC_ACK_WAIT_DURATION.as_delay_us()),
        )
        .await
        {
            Either::First(_) => true,
            Either::Second(_) => {
                trace!("no acknowledgment for {}", sequence_number);
                false
            }
        }
    }
}
