//! Network contexts and the stack they live in.
//!
//! A [`NetStack`] owns every context, connection and timer. It performs no
//! I/O: inbound packets and the passing of time go in through
//! [`NetStack::input`] and [`NetStack::poll`], outbound packets and
//! notifications come out as [`Effects`].

mod arena;
pub mod context;
mod errno;
pub mod ip;
mod stack;

pub use arena::{Arena, Handle};
pub use context::{Family, NetContext, SocketType};
pub use errno::Errno;
pub use stack::{NetStack, UdpStats};

use crate::config::NET_EFFECTS_SIZE;
use crate::tcp::Tcb;
use ip::Packet;

pub type ContextHandle = Handle<NetContext>;
pub type TcbHandle = Handle<Tcb>;

/// What happened to a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The active open completed.
    Connected,
    /// The active open failed.
    ConnectFailed(Errno),
    /// A connection is waiting in the accept queue of this listener.
    Accepted(ContextHandle),
    /// Octets were added to the receive buffer.
    DataReceived(usize),
    /// The peer will not send anymore.
    PeerClosed,
    /// The connection ended abnormally.
    Aborted(Errno),
    /// The connection is gone after a close.
    Closed,
}

/// Output of the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Hand the packet to the IPv6 layer.
    Transmit(Packet),
    /// Tell the owner of the context.
    Notify(ContextHandle, Event),
}

pub type Effects = heapless::Vec<Effect, NET_EFFECTS_SIZE>;
