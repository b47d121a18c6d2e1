//! MAC constants of section 8.4.2, Table 8-93.
use crate::phy::constants::{CCA_TIME, TURNAROUND_TIME};

/// PAN ID used to reach every PAN.
pub const BROADCAST_PAN_ID: u16 = 0xffff;
/// Short address of every device, also used when no short address is set.
pub const BROADCAST_SHORT_ADDRESS: u16 = 0xffff;
/// Short address of an associated device that only uses its extended
/// address.
pub const NO_SHORT_ADDRESS: u16 = 0xfffe;
/// The number of symbols forming the basic time period used by the CSMA-CA
/// algorithm.
pub const UNIT_BACKOFF_PERIOD: u32 = TURNAROUND_TIME + CCA_TIME;
/// The number of symbols forming a superframe slot when the superframe
/// order is 0.
pub const BASE_SLOT_DURATION: u32 = 60;
/// The number of slots contained in any superframe.
pub const NUM_SUPERFRAME_SLOTS: u32 = 16;
/// The number of symbols forming a superframe when the superframe order is
/// 0.
pub const BASE_SUPERFRAME_DURATION: u32 = BASE_SLOT_DURATION * NUM_SUPERFRAME_SLOTS;
/// Largest scan duration exponent.
pub const MAX_SCAN_DURATION: u8 = 14;
/// Maximum number of beacons collected by a single scan.
pub const MAX_PAN_DESCRIPTORS: usize = 8;
