//! The TCP engine.
//!
//! Connections live in the [`NetStack`](crate::net::NetStack): segments are
//! processed in [`input`], sent from [`output`], and [`timer`] handles the
//! retransmission and connection timers.

mod backlog;
mod input;
mod output;
pub mod seq;
pub mod state;
mod tcb;
mod timer;
pub mod wire;

pub use backlog::{BacklogEntry, BacklogHandle};
pub use seq::SeqNumber;
pub use state::{Input, State};
pub use tcb::{SentSegment, Tcb};
pub use wire::{Flags, TcpRepr};

use crate::net::TcbHandle;

/// MSS assumed when the peer does not announce one.
pub const DEFAULT_MSS: u16 = 536;

/// Timers armed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timer {
    /// Resend the head of the sent list.
    Retransmit(TcbHandle),
    /// Give up on an active open.
    Connect(TcbHandle),
    /// Force the close of a connection in FIN-WAIT-2, LAST-ACK or TIME-WAIT.
    Close(TcbHandle),
    /// Drop a half-open passive connection.
    Backlog(BacklogHandle),
}

impl Timer {
    pub fn tcb(&self) -> Option<TcbHandle> {
        match self {
            Timer::Retransmit(tcb) | Timer::Connect(tcb) | Timer::Close(tcb) => Some(*tcb),
            Timer::Backlog(_) => None,
        }
    }
}

/// Counters of the engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TcpStats {
    pub rx_segments: u32,
    pub tx_segments: u32,
    /// Segments failing the checksum, length or option checks.
    pub malformed: u32,
    pub retransmissions: u32,
    pub rst_sent: u32,
    pub rst_received: u32,
    /// RSTs outside of the receive window.
    pub invalid_rst: u32,
    /// Segments ignored in the current state or out of order.
    pub dropped: u32,
    pub aborted: u32,
}
