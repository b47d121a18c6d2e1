use heapless::Deque;

use super::ip::{Endpoint, Protocol};
use super::{ContextHandle, Errno, TcbHandle};
use crate::config::{NET_RECV_BUFFER_SIZE, NET_TCP_BACKLOG_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Family {
    Inet6,
    Inet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketType {
    Stream,
    Datagram,
}

impl SocketType {
    /// Check that `protocol` runs over this socket type.
    pub fn check(self, protocol: Protocol) -> Result<(), Errno> {
        match (self, protocol) {
            (SocketType::Stream, Protocol::Tcp) | (SocketType::Datagram, Protocol::Udp) => Ok(()),
            _ => Err(Errno::EPROTOTYPE),
        }
    }
}

/// A network context: one socket of the application.
#[derive(Debug)]
pub struct NetContext {
    pub socket_type: SocketType,
    pub protocol: Protocol,
    pub local: Endpoint,
    pub remote: Endpoint,
    /// References held outside of the stack. The context is released when
    /// this drops to zero and no connection uses it anymore.
    pub refcount: u8,
    pub(crate) recv: Deque<u8, NET_RECV_BUFFER_SIZE>,
    /// Sender of the datagram in `recv`. A second datagram is dropped until
    /// the first one was read.
    pub(crate) datagram_from: Option<Endpoint>,
    pub(crate) tcb: Option<TcbHandle>,
    pub(crate) accept_queue: Deque<ContextHandle, NET_TCP_BACKLOG_SIZE>,
    pub(crate) peer_closed: bool,
}

impl NetContext {
    pub fn new(socket_type: SocketType, protocol: Protocol) -> Self {
        Self {
            socket_type,
            protocol,
            local: Endpoint::UNSPECIFIED,
            remote: Endpoint::UNSPECIFIED,
            refcount: 1,
            recv: Deque::new(),
            datagram_from: None,
            tcb: None,
            accept_queue: Deque::new(),
            peer_closed: false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.local.is_specified()
    }

    pub fn tcb(&self) -> Option<TcbHandle> {
        self.tcb
    }

    /// Octets waiting to be read.
    pub fn available(&self) -> usize {
        self.recv.len()
    }

    /// Free space of the receive buffer, as advertised in the TCP window.
    pub fn window(&self) -> u16 {
        (self.recv.capacity() - self.recv.len()).min(u16::MAX as usize) as u16
    }

    /// Append what fits of `data` to the receive buffer.
    pub(crate) fn push(&mut self, data: &[u8]) -> usize {
        let mut pushed = 0;
        for byte in data {
            if self.recv.push_back(*byte).is_err() {
                break;
            }
            pushed += 1;
        }
        pushed
    }

    /// Move up to `buf.len()` octets out of the receive buffer.
    pub(crate) fn pop(&mut self, buf: &mut [u8]) -> usize {
        let mut popped = 0;
        for slot in buf.iter_mut() {
            let Some(byte) = self.recv.pop_front() else {
                break;
            };
            *slot = byte;
            popped += 1;
        }
        popped
    }
}
