//! IEEE 802.15.4 MAC layer, 6LoWPAN fragmentation and a sans-IO TCP engine
//! for constrained devices.
//!
//! - [`mac`] drives a [`Radio`](phy::radio::Radio): channel access,
//!   acknowledgments, frame security, association and scanning.
//! - [`sixlowpan`] splits IPv6 datagrams over the 127-byte PHY MTU and
//!   reassembles them.
//! - [`net`] holds the network contexts; [`tcp`] is the engine running the
//!   stream ones.
#![no_std]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
pub(crate) mod utils;

pub use wpan_frame as frame;

pub mod config;
pub mod mac;
pub mod net;
pub mod phy;
pub mod security;
pub mod sixlowpan;
pub mod sync;
pub mod tcp;
pub mod time;
pub mod upper;
