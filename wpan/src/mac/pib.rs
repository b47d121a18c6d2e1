use crate::config::MAC_PAN_ID;
use crate::frame::{Address, AssociationStatus};
use crate::security::SecurityContext;

use super::constants::*;

/// Where the device stands with respect to a PAN coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AssociationState {
    #[default]
    Idle,
    /// An Association Request was sent to `coordinator`. `response` holds
    /// the status of the Association Response once it arrived.
    Pending {
        coordinator: Address,
        response: Option<AssociationStatus>,
    },
    Associated,
}

/// PAN Information Base (PIB) of the MAC sublayer.
///
/// Guarded by the `ctx_lock` of the [`MacService`](super::MacService);
/// scanning state lives apart in a [`ScanContext`](super::mlme::ScanContext).
#[derive(Debug, Clone)]
pub struct Pib {
    /// The extended address of the device, read from the radio.
    pub(crate) extended_address: [u8; 8],
    /// The address that the device uses to communicate in the PAN,
    /// allocated by the coordinator during association. `0xffff` when none
    /// is allocated, `0xfffe` when the extended address is used instead.
    pub(crate) short_address: u16,
    /// The identifier of the PAN on which the device is operating. If this
    /// value is 0xffff, the device is not associated.
    pub(crate) pan_id: u16,
    pub(crate) channel: u8,
    pub(crate) tx_power: i8,
    /// Request an acknowledgment for unicast data frames.
    pub(crate) ack_requested: bool,
    /// The address of the coordinator through which the device is associated.
    pub(crate) coord_extended_address: Option<[u8; 8]>,
    /// The short address of that coordinator. 0xfffe when the coordinator
    /// only uses its extended address, 0xffff when unknown.
    pub(crate) coord_short_address: u16,
    pub(crate) security: SecurityContext,
    pub(crate) sequence_number: u8,
    pub(crate) datagram_tag: u16,
    pub(crate) association: AssociationState,
}

impl Pib {
    pub(crate) fn new(extended_address: [u8; 8]) -> Self {
        Self {
            extended_address,
            short_address: BROADCAST_SHORT_ADDRESS,
            pan_id: MAC_PAN_ID,
            channel: *crate::phy::constants::CHANNELS_2450.start(),
            tx_power: 0,
            ack_requested: true,
            coord_extended_address: None,
            coord_short_address: BROADCAST_SHORT_ADDRESS,
            security: SecurityContext::default(),
            sequence_number: 0,
            datagram_tag: 0,
            association: AssociationState::Idle,
        }
    }

    pub fn is_associated(&self) -> bool {
        self.association == AssociationState::Associated
    }

    /// The short address when one was allocated, the extended address
    /// otherwise.
    pub fn source_address(&self) -> Address {
        if self.short_address < NO_SHORT_ADDRESS {
            Address::from_short(self.short_address)
        } else {
            Address::Extended(self.extended_address)
        }
    }

    /// The address through which the coordinator is reached.
    pub fn coordinator_address(&self) -> Option<Address> {
        if let Some(address) = self.coord_extended_address {
            Some(Address::Extended(address))
        } else if self.coord_short_address < NO_SHORT_ADDRESS {
            Some(Address::from_short(self.coord_short_address))
        } else {
            None
        }
    }

    pub(crate) fn next_sequence_number(&mut self) -> u8 {
        let sequence_number = self.sequence_number;
        self.sequence_number = self.sequence_number.wrapping_add(1);
        sequence_number
    }

    pub(crate) fn next_datagram_tag(&mut self) -> u16 {
        let tag = self.datagram_tag;
        self.datagram_tag = self.datagram_tag.wrapping_add(1);
        tag
    }

    /// Forget everything the association established.
    pub(crate) fn clear_association(&mut self) {
        self.association = AssociationState::Idle;
        self.pan_id = BROADCAST_PAN_ID;
        self.short_address = BROADCAST_SHORT_ADDRESS;
        self.coord_extended_address = None;
        self.coord_short_address = BROADCAST_SHORT_ADDRESS;
        self.security.clear();
    }
}
