//! Access to IEEE 802.15.4 radios.
//!
//! The [`Radio`](radio::Radio) trait is what the MAC layer drives; the
//! futures in [`radio::futures`] wrap its poll based methods.

pub mod constants;
pub mod radio;
