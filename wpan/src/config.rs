//! Compile-time configuration.
//!
//! Timing and retry parameters are generated by the build script from
//! `WPAN_*` environment variables, e.g. `WPAN_MAC_MAX_BE=6`. Pool sizes are
//! fixed here.
#![allow(dead_code)]

pub use customizable::*;

/// Number of network contexts in the registry.
pub const NET_MAX_CONTEXTS: usize = 8;
/// Number of TCP control blocks.
pub const NET_MAX_TCP_CONTEXT: usize = 4;
/// Number of half-open passive connections per stack.
pub const NET_TCP_BACKLOG_SIZE: usize = 4;
/// Number of unacknowledged segments per connection.
pub const NET_TCP_SENT_LIST_SIZE: usize = 8;
/// Size of the per-connection send buffer.
pub const NET_TCP_SEND_BUFFER_SIZE: usize = 1280;
/// Size of the per-context receive buffer.
pub const NET_RECV_BUFFER_SIZE: usize = 1280;
/// Maximum size of an IPv6 datagram handled by the 6LoWPAN layer.
pub const IPV6_MTU: usize = 1280;
/// Maximum size of a reassembled datagram.
pub const REASS_BUFFER_SIZE: usize = 1500;
/// Number of pending timers in a [`TimerQueue`](crate::time::TimerQueue).
pub const TIMER_QUEUE_SIZE: usize = 32;
/// Number of effects returned by a single call into the TCP engine.
pub const NET_EFFECTS_SIZE: usize = 16;


#[cfg(not(test))]
mod customizable {
    #![allow(unused)]
    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}
