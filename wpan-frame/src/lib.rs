//! Zero-copy read and write structures for handling IEEE 802.15.4 MAC frames.
//!
//! Each reader contains the following functions:
//! - [`new`]: Create a new reader.
//! - [`check_len`]: Check if the buffer is long enough to contain a valid
//!   frame.
//! - [`new_unchecked`]: Create a new reader without checking the buffer length.
//!
//! ## Reading a frame
//!
//! Received frames go through [`validate_frame`], which checks every
//! structural rule of the frame type (addressing modes, PAN ID compression,
//! auxiliary security header, beacon fields, MAC command table) and returns an
//! [`Mpdu`] with a typed [`Payload`].
//!
//! ```
//! # use wpan_frame::{validate_frame, Address, FrameType, Payload};
//! let frame = [
//!     0x41, 0xd8, 0x01, 0xcd, 0xab, 0xff, 0xff, 0xc7, 0xd9, 0xb5, 0x14, 0x00, 0x4b, 0x12, 0x00,
//!     0x2b, 0x00, 0x00, 0x00,
//! ];
//! let mpdu = validate_frame(&frame).unwrap();
//!
//! assert_eq!(mpdu.frame_control().frame_type(), FrameType::Data);
//! assert_eq!(mpdu.addressing().dst_address(), Address::BROADCAST);
//! let Payload::Data(data) = mpdu.payload() else {
//!     panic!("not a data frame");
//! };
//! assert_eq!(*data, &[0x2b, 0x00, 0x00, 0x00]);
//! ```
//!
//! ## Writing a frame
//!
//! Use the [`FrameBuilder`] to create a [`FrameRepr`], then emit it:
//!
//! ```
//! # use wpan_frame::{Address, FrameBuilder};
//! let frame = FrameBuilder::new_data(&[0x2b, 0x00, 0x00, 0x00])
//!     .set_sequence_number(1)
//!     .set_dst_pan_id(0xabcd)
//!     .set_dst_address(Address::BROADCAST)
//!     .set_src_pan_id(0xabcd)
//!     .set_src_address(Address::Extended([
//!         0x00, 0x12, 0x4b, 0x00, 0x14, 0xb5, 0xd9, 0xc7,
//!     ]))
//!     .finalize()
//!     .unwrap();
//!
//! let mut buffer = [0u8; 127];
//! let len = frame.emit(&mut buffer).unwrap();
//! assert_eq!(&buffer[..3], &[0x41, 0xd8, 0x01]);
//! assert_eq!(len, 19);
//! ```
//!
//! Information Elements are not supported: frames carrying them are refused.
//!
//! [`new`]: Frame::new
//! [`check_len`]: Frame::check_len
//! [`new_unchecked`]: Frame::new_unchecked
#![no_std]
#![deny(missing_docs)]
#![deny(unsafe_code)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[cfg(test)]
mod tests;

mod frame_control;
pub use frame_control::*;

mod addressing;
pub use addressing::*;

mod aux_sec_header;
pub use aux_sec_header::*;

mod beacon;
pub use beacon::*;

mod command;
pub use command::*;

mod frame;
pub use frame::*;

mod fcs;
pub use fcs::*;

mod repr;
pub use repr::*;

/// An error that can occur when reading or writing an IEEE 802.15.4 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Error;

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "malformed IEEE 802.15.4 frame")
    }
}

/// A type alias for `Result<T, frame::Error>`.
pub type Result<T> = core::result::Result<T, Error>;
