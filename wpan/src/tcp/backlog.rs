use super::seq::SeqNumber;
use super::wire::{Flags, TcpRepr};
use crate::config::NET_TCP_MSS;
use crate::net::ip::Endpoint;
use crate::net::{Handle, TcbHandle};

pub type BacklogHandle = Handle<BacklogEntry>;

/// A passive open waiting for the final ACK of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogEntry {
    pub listener: TcbHandle,
    pub local: Endpoint,
    pub remote: Endpoint,
    pub iss: SeqNumber,
    /// Initial sequence number of the peer.
    pub irs: SeqNumber,
    pub peer_mss: u16,
    pub peer_window: u16,
}

impl BacklogEntry {
    pub fn matches(&self, local: &Endpoint, remote: &Endpoint) -> bool {
        self.local.port == local.port && self.remote == *remote
    }

    /// The SYN-ACK answering the SYN of the peer.
    pub fn syn_ack(&self, window: u16) -> TcpRepr {
        TcpRepr {
            src_port: self.local.port,
            dst_port: self.remote.port,
            seq: self.iss,
            ack: self.irs + 1,
            flags: Flags::SYN | Flags::ACK,
            window,
            mss: Some(NET_TCP_MSS),
            window_scale: None,
        }
    }

    /// Whether `repr` completes the handshake.
    pub fn is_final_ack(&self, repr: &TcpRepr) -> bool {
        repr.flags.contains(Flags::ACK)
            && !repr.flags.intersects(Flags::SYN | Flags::RST)
            && repr.ack == self.iss + 1
            && repr.seq == self.irs + 1
    }
}
