use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::frame::{
    Address, AssociationResponse, AssociationStatus, Command, DisassociationReason, Mpdu, Payload,
};
use crate::mac::command::MacIndication;
use crate::mac::{AssociationState, MacService};
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
    /// A MAC command was received. `command` is given for commands that
    /// were unsecured, otherwise it is read from `mpdu`.
    pub(crate) async fn command_indication(&self, mpdu: &Mpdu<'_>, command: Option<&Command<'_>>) {
        let command = match (command, mpdu.payload()) {
            (Some(command), _) => command,
            (None, Payload::Command(command)) => command,
            _ => return,
        };

        match command {
            Command::AssociationResponse(response) => {
                self.association_response(mpdu, response).await
            }
            Command::DisassociationNotification(reason) => {
                self.disassociation_notification(mpdu, *reason).await
            }
            command => {
                let src = mpdu.addressing().src_address();
                debug!("command {:?} from {:?}", command.id(), src);
                self.upper_layer
                    .received_mac_indication(MacIndication::Command {
                        src,
                        id: command.id(),
                    })
                    .await;
            }
        }
    }

    async fn association_response(&self, mpdu: &Mpdu<'_>, response: &AssociationResponse<&[u8]>) {
        let addressing = mpdu.addressing();
        let mut pib = self.ctx_lock.lock().await;

        let AssociationState::Pending {
            coordinator,
            response: None,
        } = pib.association
        else {
            debug!("unexpected association response");
            return;
        };
        if addressing.dst_pan_id() != Some(pib.pan_id)
            || addressing.dst_address() != Address::Extended(pib.extended_address)
        {
            return;
        }

        let src = addressing.src_address();
        let from_coordinator = match coordinator {
            Address::Extended(_) => src == coordinator,
            // Only the short address is known, any extended source goes.
            _ => matches!(src, Address::Extended(_)),
        };
        if !from_coordinator {
            debug!("association response from {:?} ignored", src);
            return;
        }

        // The response is not authenticated: any device in range can
        // complete or refuse a pending association.
        let status = response.status();
        if status == AssociationStatus::Successful {
            pib.short_address = response.short_address();
            if let Address::Extended(address) = src {
                pib.coord_extended_address = Some(address);
            }
            if let Some(short_address) = coordinator.as_short() {
                pib.coord_short_address = short_address;
            }
        }
        pib.association = AssociationState::Pending {
            coordinator,
            response: Some(status),
        };
    }

    async fn disassociation_notification(&self, mpdu: &Mpdu<'_>, reason: DisassociationReason) {
        let addressing = mpdu.addressing();
        {
            let mut pib = self.ctx_lock.lock().await;
            if !pib.is_associated() || addressing.dst_pan_id() != Some(pib.pan_id) {
                return;
            }
            let dst = addressing.dst_address();
            let for_us = dst == Address::Extended(pib.extended_address)
                || dst.as_short() == Some(pib.short_address);
            let from_coordinator = pib.coordinator_address() == Some(addressing.src_address());
            if !for_us || !from_coordinator {
                debug!("disassociation notification ignored");
                return;
            }

            // As for association, nothing authenticates the coordinator
            // here and any device in range can end the association.
            info!("disassociated by the coordinator: {:?}", reason);
            pib.clear_association();
        }
        self.update_filter().await;
        self.upper_layer
            .received_mac_indication(MacIndication::Disassociated(reason))
            .await;
    }
}
