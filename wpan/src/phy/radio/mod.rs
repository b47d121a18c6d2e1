pub mod futures;

#[cfg(test)]
pub mod tests;

use core::ops::RangeInclusive;
use core::task::{Context, Poll};

use crate::frame::Address;

bitflags::bitflags! {
    /// Offloads a radio performs on behalf of the MAC layer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u8 {
        /// The radio appends the FCS on transmit and strips it on receive.
        const FCS = 1 << 0;
        /// The radio drops frames that are not addressed to us.
        const FILTER = 1 << 1;
        /// The radio acknowledges received frames by itself.
        const AUTO_ACK = 1 << 2;
        /// The radio runs CSMA-CA before each transmission.
        const CSMA = 1 << 3;
        /// The radio waits for the acknowledgment and reports it on transmit.
        const TX_ACK = 1 << 4;
    }
}

/// Address filter programmed into radios with [`Capabilities::FILTER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Filter {
    pub pan_id: u16,
    pub short_address: Address,
    pub extended_address: [u8; 8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// The channel is not supported by the radio.
    InvalidChannel,
    /// The transmit power is not supported by the radio.
    InvalidTxPower,
}

/// Outcome of a transmission the radio could not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxError {
    /// The hardware CSMA-CA found the channel busy.
    ChannelBusy,
    /// The hardware did not receive the acknowledgment.
    NoAck,
    /// Any other failure.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxConfig {
    /// Perform a single clear channel assessment before transmitting.
    pub cca: bool,
}

/// Metadata of a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxInfo {
    /// Number of octets written in the receive buffer.
    pub len: usize,
    /// Link quality indicator.
    pub lqi: u8,
}

/// An IEEE 802.15.4 transceiver.
///
/// All operations are poll based so that they can be wrapped in futures that
/// cancel the radio operation when dropped, see [`futures`].
pub trait Radio {
    /// Offloads of this radio.
    fn capabilities(&self) -> Capabilities;

    /// Channels supported by the radio.
    fn channel_range(&self) -> RangeInclusive<u8> {
        crate::phy::constants::CHANNELS_2450
    }

    fn set_channel(&mut self, channel: u8) -> Result<(), RadioError>;

    fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError>;

    /// Program the hardware address filter. Only called on radios with
    /// [`Capabilities::FILTER`].
    fn set_filter(&mut self, filter: &Filter);

    /// Power the radio up.
    fn start(&mut self, cx: &mut Context<'_>) -> Poll<()>;

    /// Request the radio to idle to a low-power sleep mode.
    fn stop(&mut self, cx: &mut Context<'_>) -> Poll<()>;

    /// Perform a clear channel assessment. Returns `true` when the channel is
    /// clear.
    fn cca(&mut self, cx: &mut Context<'_>) -> Poll<bool>;

    /// Load a frame in the radio. The FCS is appended by the caller unless
    /// the radio has [`Capabilities::FCS`].
    fn prepare_transmit(&mut self, cx: &mut Context<'_>, cfg: &TxConfig, bytes: &[u8])
        -> Poll<()>;

    /// Transmit the loaded frame.
    fn transmit(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), TxError>>;

    /// Put the radio in receive mode.
    fn prepare_receive(&mut self, cx: &mut Context<'_>) -> Poll<()>;

    /// Wait for a frame. `None` means the radio received something it could
    /// not deliver, e.g. an oversized frame.
    fn receive(&mut self, cx: &mut Context<'_>, buffer: &mut [u8; 128]) -> Poll<Option<RxInfo>>;

    /// Abort the current operation. Called when a radio future is dropped, so
    /// this can not be async.
    fn cancel_current_operation(&mut self);

    /// Returns the IEEE802.15.4 8-octet MAC address of the radio device.
    fn ieee802154_address(&self) -> [u8; 8];
}
