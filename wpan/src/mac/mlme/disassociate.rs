use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::frame::{Address, CommandRepr, DisassociationReason, MTU};
use crate::mac::frames::{create_mac_cmd_frame, CommandAddressing};
use crate::mac::MacService;
use crate::net::Errno;
use crate::phy::radio::Radio;
use crate::security::CcmCipher;
use crate::sixlowpan::HeaderCompression;
use crate::time::Clock;
use crate::upper::UpperLayer;

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
    /// Notify the coordinator that we leave the PAN.
    ///
    /// The association is over even when the notification could not be
    /// delivered; the transmission error is still returned.
    pub(crate) async fn disassociate(&self, reason: DisassociationReason) -> Result<(), Errno> {
        let mut buffer = [0u8; MTU];
        let emitted = {
            let mut pib = self.ctx_lock.lock().await;
            if !pib.is_associated() {
                return Err(Errno::ENOTCONN);
            }
            let coordinator = pib.coordinator_address().ok_or(Errno::ENOTCONN)?;
            let pan_id = pib.pan_id;
            let src = Address::Extended(pib.extended_address);
            create_mac_cmd_frame(
                &mut pib,
                CommandRepr::DisassociationNotification(reason),
                CommandAddressing {
                    dst_pan_id: pan_id,
                    dst: coordinator,
                    src_pan_id: pan_id,
                    src,
                },
                true,
                &mut buffer,
            )
        };

        let sent = match emitted {
            Ok(emitted) => {
                self.transmit_frame(&buffer[..emitted.len], emitted.ack_request)
                    .await
            }
            Err(err) => Err(err),
        };

        self.ctx_lock.lock().await.clear_association();
        self.update_filter().await;
        info!("disassociated: {:?}", reason);

        sent.map_err(Errno::from)
    }
}
