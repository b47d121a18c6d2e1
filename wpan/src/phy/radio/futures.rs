use core::future::Future;
use core::pin::Pin;
use core::task::{ready, Context, Poll};

use super::{Radio, RxInfo, TxConfig, TxError};

enum TransmissionTaskState {
    Preparing,
    Transmitting,
    Done,
}

/// Future around transmitting through a radio. Use the [`transmit`] function
/// to create it.
pub struct TransmitTask<'task, R: Radio> {
    data: &'task [u8],
    radio: &'task mut R,
    state: TransmissionTaskState,
    config: TxConfig,
}

/// Convenience future around transmitting through the radio. This future
/// first prepares the radio, then transmits before completing. Dropping it
/// before completion cancels the transmission.
pub fn transmit<'task, R: Radio>(
    radio: &'task mut R,
    data: &'task [u8],
    config: TxConfig,
) -> TransmitTask<'task, R> {
    TransmitTask {
        radio,
        data,
        state: TransmissionTaskState::Preparing,
        config,
    }
}

impl<R: Radio> Future for TransmitTask<'_, R> {
    type Output = Result<(), TxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match this.state {
                TransmissionTaskState::Preparing => {
                    ready!(this.radio.prepare_transmit(cx, &this.config, this.data));
                    this.state = TransmissionTaskState::Transmitting;
                }
                TransmissionTaskState::Transmitting => {
                    let result = ready!(this.radio.transmit(cx));
                    this.state = TransmissionTaskState::Done;
                    return Poll::Ready(result);
                }
                TransmissionTaskState::Done => return Poll::Pending,
            }
        }
    }
}

impl<R: Radio> Drop for TransmitTask<'_, R> {
    fn drop(&mut self) {
        if !matches!(self.state, TransmissionTaskState::Done) {
            self.radio.cancel_current_operation()
        }
    }
}

enum ReceiveTaskState {
    Preparing,
    Receiving,
    Done,
}

/// Future around receiving through a radio. Use the [`receive`] function to
/// create it.
pub struct ReceiveTask<'task, R: Radio> {
    data: &'task mut [u8; 128],
    radio: &'task mut R,
    state: ReceiveTaskState,
}

/// Convenience future around receiving through the radio. This future first
/// prepares the radio, then receives before completing. Dropping it before a
/// frame was received puts the radio back to idle.
pub fn receive<'task, R: Radio>(
    radio: &'task mut R,
    data: &'task mut [u8; 128],
) -> ReceiveTask<'task, R> {
    ReceiveTask {
        radio,
        data,
        state: ReceiveTaskState::Preparing,
    }
}

impl<R: Radio> Future for ReceiveTask<'_, R> {
    type Output = Option<RxInfo>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match this.state {
                ReceiveTaskState::Preparing => {
                    ready!(this.radio.prepare_receive(cx));
                    this.state = ReceiveTaskState::Receiving;
                }
                ReceiveTaskState::Receiving => {
                    let result = ready!(this.radio.receive(cx, this.data));
                    this.state = ReceiveTaskState::Done;
                    return Poll::Ready(result);
                }
                ReceiveTaskState::Done => return Poll::Pending,
            }
        }
    }
}

impl<R: Radio> Drop for ReceiveTask<'_, R> {
    fn drop(&mut self) {
        if !matches!(self.state, ReceiveTaskState::Done) {
            self.radio.cancel_current_operation()
        }
    }
}
