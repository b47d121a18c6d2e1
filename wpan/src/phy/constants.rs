//! PHY constants of the 2.4 GHz O-QPSK PHY.
#![allow(dead_code)]

/// The maximum PSDU size (in octets) the PHY shall be able to receive.
pub const MAX_PHY_PACKET_SIZE: usize = 127;
/// RX-to-TX or TX-to-RX turnaround time (in symbol periods).
pub const TURNAROUND_TIME: u32 = 12;
/// The time required to perform CCA detection in symbol periods.
pub const CCA_TIME: u32 = 8;
/// The symbol rate of IEEE 802.15.4 on 2.4 GHz (symbols/s).
pub const SYMBOL_RATE: u32 = 62_500;
/// The symbol period of IEEE 802.15.4 on 2.4 GHz (µs/symbol).
pub const SYMBOL_RATE_INV_US: u32 = 1_000_000 / SYMBOL_RATE;
/// Channels of the 2.4 GHz band.
pub const CHANNELS_2450: core::ops::RangeInclusive<u8> = 11..=26;
