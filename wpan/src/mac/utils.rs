use crate::frame::{Address, FrameType, Mpdu};
use crate::mac::pib::Pib;

use super::constants::*;

/// Checks if a validated frame is intended for us, for radios that do not
/// filter in hardware.
///
/// Frames without destination are only accepted when they are beacons or
/// acknowledgments, since only a PAN coordinator accepts anything else.
pub fn is_frame_for_us(pib: &Pib, frame: &Mpdu<'_>) -> bool {
    let addressing = frame.addressing();

    // Check if dst_pan (in present) is provided
    if let Some(dst_pan_id) = addressing.dst_pan_id() {
        if dst_pan_id != pib.pan_id && dst_pan_id != BROADCAST_PAN_ID {
            return false;
        }
    }

    let addr = addressing.dst_address();
    match &addr {
        Address::Absent => matches!(
            frame.frame_control().frame_type(),
            FrameType::Beacon | FrameType::Ack
        ),
        _ if addr.is_broadcast() => true,
        Address::Short(_) => {
            pib.short_address < NO_SHORT_ADDRESS && addr.as_short() == Some(pib.short_address)
        }
        Address::Extended(addr) => *addr == pib.extended_address,
    }
}
