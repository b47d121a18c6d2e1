//! A single slot signalling channel.
//!
//! Sending never blocks: a new message overwrites one that was not received
//! yet. [`Sender::send_async`] waits for the slot to be free instead.
use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Poll, Waker};

struct State<T> {
    message: Option<T>,
    waker_recv: Option<Waker>,
    waker_send: Option<Waker>,
}

pub struct Channel<T> {
    state: RefCell<State<T>>,
}

impl<T> Channel<T> {
    pub const fn new() -> Self {
        Self {
            state: RefCell::new(State {
                message: None,
                waker_recv: None,
                waker_send: None,
            }),
        }
    }

    /// Split the channel in its two halves. Any pending message is dropped.
    pub fn split(&mut self) -> (Sender<'_, T>, Receiver<'_, T>) {
        *self = Self::new();
        (Sender { channel: self }, Receiver { channel: self })
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn store_waker(slot: &mut Option<Waker>, waker: &Waker) {
    match slot {
        Some(current) if current.will_wake(waker) => {}
        _ => *slot = Some(waker.clone()),
    }
}

pub struct Sender<'a, T> {
    channel: &'a Channel<T>,
}

impl<T> Sender<'_, T> {
    /// Put a message in the channel. Returns whether a message that was not
    /// received yet got overwritten.
    pub fn send(&self, message: T) -> bool {
        let mut state = self.channel.state.borrow_mut();
        let replaced = state.message.replace(message).is_some();

        if let Some(waker) = state.waker_recv.take() {
            waker.wake()
        }

        replaced
    }

    /// Check if there is a message waiting in the channel.
    pub fn has_item(&self) -> bool {
        self.channel.state.borrow().message.is_some()
    }

    /// Wait until the channel is empty, then send.
    pub async fn send_async(&self, message: T) {
        poll_fn(|cx| {
            let mut state = self.channel.state.borrow_mut();
            if state.message.is_some() {
                store_waker(&mut state.waker_send, cx.waker());
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await;

        self.send(message);
    }
}

pub struct Receiver<'a, T> {
    channel: &'a Channel<T>,
}

impl<T> Receiver<'_, T> {
    /// Wait for a message.
    pub async fn receive(&self) -> T {
        poll_fn(|cx| {
            let mut state = self.channel.state.borrow_mut();
            match state.message.take() {
                Some(message) => {
                    if let Some(waker) = state.waker_send.take() {
                        waker.wake();
                    }
                    Poll::Ready(message)
                }
                None => {
                    store_waker(&mut state.waker_recv, cx.waker());
                    Poll::Pending
                }
            }
        })
        .await
    }

    /// Take the message if there is one.
    pub fn try_receive(&self) -> Option<T> {
        let mut state = self.channel.state.borrow_mut();
        let message = state.message.take();
        if message.is_some() {
            if let Some(waker) = state.waker_send.take() {
                waker.wake();
            }
        }
        message
    }

    /// Check if there is a message waiting in the channel.
    pub fn has_item(&self) -> bool {
        self.channel.state.borrow().message.is_some()
    }
}
