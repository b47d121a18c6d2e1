use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::config::MAC_RESPONSE_WAIT_TIME;
use crate::frame::{Address, AssociationStatus, CommandRepr, MTU};
use crate::mac::constants::BROADCAST_PAN_ID;
use crate::mac::frames::{create_mac_cmd_frame, CommandAddressing};
use crate::mac::{AssociationState, MacService};
use crate::net::Errno;
use crate::phy::radio::Radio;
use crate::security::CcmCipher;
use crate::sixlowpan::HeaderCompression;
use crate::sync::{select, Either};
use crate::time::Clock;
use crate::upper::UpperLayer;

use super::AssociateRequest;

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
    /// Requests the association with a coordinator, returning the short
    /// address it allocated.
    ///
    /// The device moves to the channel and PAN of the coordinator and waits
    /// up to `MAC_RESPONSE_WAIT_TIME` for the Association Response. Channel
    /// and PAN are restored when the association fails.
    pub(crate) async fn associate(&self, request: &AssociateRequest) -> Result<u16, Errno> {
        if request.pan_id == BROADCAST_PAN_ID || request.coordinator.is_empty() {
            return Err(Errno::EINVAL);
        }

        let (pan_id, channel) = {
            let pib = self.ctx_lock.lock().await;
            match pib.association {
                AssociationState::Associated => return Err(Errno::EISCONN),
                AssociationState::Pending { .. } => return Err(Errno::EALREADY),
                AssociationState::Idle => (pib.pan_id, pib.channel),
            }
        };

        self.tune(request.channel).await?;
        {
            let mut pib = self.ctx_lock.lock().await;
            pib.channel = request.channel;
            pib.pan_id = request.pan_id;
            pib.association = AssociationState::Pending {
                coordinator: request.coordinator,
                response: None,
            };
        }
        self.update_filter().await;

        let result = self.request_association(request).await;
        if let Err(err) = result {
            warn!("association with {:x} failed: {:?}", request.pan_id, err);
            {
                let mut pib = self.ctx_lock.lock().await;
                pib.association = AssociationState::Idle;
                pib.pan_id = pan_id;
                pib.channel = channel;
            }
            if self.tune(channel).await.is_err() {
                warn!("channel {} refused by the radio", channel);
            }
            self.update_filter().await;
        }
        result
    }

    async fn request_association(&self, request: &AssociateRequest) -> Result<u16, Errno> {
        let mut buffer = [0u8; MTU];
        let emitted = {
            let mut pib = self.ctx_lock.lock().await;
            let src = Address::Extended(pib.extended_address);
            create_mac_cmd_frame(
                &mut pib,
                CommandRepr::AssociationRequest(request.capability),
                CommandAddressing {
                    dst_pan_id: request.pan_id,
                    dst: request.coordinator,
                    src_pan_id: BROADCAST_PAN_ID,
                    src,
                },
                true,
                &mut buffer,
            )?
        };
        self.transmit_frame(&buffer[..emitted.len], emitted.ack_request)
            .await?;
        debug!("association request sent to {:?}", request.coordinator);

        let mut timer = self.timer.clone();
        let mut buffer = [0u8; MTU + 1];
        let response = select(
            async {
                loop {
                    self.receive_one(&mut buffer).await;
                    if let AssociationState::Pending {
                        response: Some(status),
                        ..
                    } = self.ctx_lock.lock().await.association
                    {
                        break status;
                    }
                }
            },
            timer.delay_us(MAC_RESPONSE_WAIT_TIME.as_delay_us()),
        )
        .await;

        match response {
            Either::First(AssociationStatus::Successful) => {
                let short_address = {
                    let mut pib = self.ctx_lock.lock().await;
                    pib.association = AssociationState::Associated;
                    pib.short_address
                };
                self.update_filter().await;
                info!(
                    "associated with PAN {:x} as {:x}",
                    request.pan_id, short_address
                );
                Ok(short_address)
            }
            Either::First(status) => {
                debug!("association refused: {:?}", status);
                Err(Errno::ECONNREFUSED)
            }
            Either::Second(()) => Err(Errno::ETIMEDOUT),
        }
    }
}
