use heapless::Deque;

use super::seq::SeqNumber;
use super::state::{Input, State};
use super::wire::{Flags, TcpRepr};
use crate::config::{NET_TCP_MSS, NET_TCP_SEND_BUFFER_SIZE, NET_TCP_SENT_LIST_SIZE};
use crate::net::ip::Endpoint;
use crate::net::ContextHandle;

/// A segment waiting for its acknowledgment. Its data sits in the send
/// buffer of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentSegment {
    pub seq: SeqNumber,
    pub flags: Flags,
    pub data_len: u16,
    /// Handed to the IP layer at least once.
    pub queued: bool,
}

impl SentSegment {
    /// Sequence space taken by the segment.
    pub fn len(&self) -> u32 {
        self.data_len as u32
            + self.flags.contains(Flags::SYN) as u32
            + self.flags.contains(Flags::FIN) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `ack` covers the whole segment.
    pub fn is_acked_by(&self, ack: SeqNumber) -> bool {
        self.seq + self.len() <= ack
    }
}

/// Transmission control block of a connection.
pub struct Tcb {
    pub state: State,
    pub context: ContextHandle,
    pub local: Endpoint,
    pub remote: Endpoint,
    pub iss: SeqNumber,
    /// Next sequence number to send (SND.NXT).
    pub send_seq: SeqNumber,
    /// Oldest unacknowledged sequence number (SND.UNA).
    pub highest_acked: SeqNumber,
    /// Next sequence number expected from the peer (RCV.NXT).
    pub send_ack: SeqNumber,
    /// Acknowledgment number of the last segment sent.
    pub sent_ack: SeqNumber,
    pub peer_mss: u16,
    pub peer_window: u16,
    /// Retransmissions of the head segment; the timeout doubles with each.
    pub retry_timeout_shift: u8,
    pub sent_list: Deque<SentSegment, NET_TCP_SENT_LIST_SIZE>,
    /// Data of `sent_list`, starting with the head segment.
    pub send_buffer: Deque<u8, NET_TCP_SEND_BUFFER_SIZE>,
    /// The application closed, a FIN goes out once the queue drained.
    pub fin_queued: bool,
    pub fin_sent: bool,
    pub fin_rcvd: bool,
    /// Created from the backlog and not handed out by `accept` yet.
    pub accepting: bool,
}

impl Tcb {
    pub fn new(context: ContextHandle, local: Endpoint, remote: Endpoint, iss: SeqNumber) -> Self {
        Self {
            state: State::Closed,
            context,
            local,
            remote,
            iss,
            send_seq: iss,
            highest_acked: iss,
            send_ack: SeqNumber(0),
            sent_ack: SeqNumber(0),
            peer_mss: NET_TCP_MSS,
            peer_window: 0,
            retry_timeout_shift: 0,
            sent_list: Deque::new(),
            send_buffer: Deque::new(),
            fin_queued: false,
            fin_sent: false,
            fin_rcvd: false,
            accepting: false,
        }
    }

    /// Apply a transition, refusing invalid ones.
    pub fn apply(&mut self, input: Input) -> Option<State> {
        match self.state.next(input) {
            Some(next) => {
                trace!("tcp {}: {:?} -> {:?}", self.local.port, self.state, next);
                self.state = next;
                Some(next)
            }
            None => {
                debug!("tcp {}: {:?} refused in {:?}", self.local.port, input, self.state);
                None
            }
        }
    }

    /// Whether the segment belongs to this connection.
    pub fn matches(&self, local: &Endpoint, remote: &Endpoint) -> bool {
        self.state != State::Listen && self.local == *local && self.remote == *remote
    }

    /// Largest data segment to send.
    pub fn mss(&self) -> usize {
        self.peer_mss.min(NET_TCP_MSS) as usize
    }

    /// Octets sent and not acknowledged yet.
    pub fn in_flight(&self) -> u32 {
        self.send_seq - self.highest_acked
    }

    /// Octets the application may still queue.
    pub fn send_capacity(&self) -> usize {
        let buffer = self.send_buffer.capacity() - self.send_buffer.len();
        let window = (self.peer_window as u32).saturating_sub(self.in_flight()) as usize;
        let segments = self.sent_list.capacity() - self.sent_list.len();
        buffer.min(window).min(segments * self.mss())
    }

    /// Queue a segment at `send_seq` and advance it by the sequence space
    /// the segment takes.
    pub fn queue(&mut self, flags: Flags, data: &[u8]) -> Result<SentSegment, ()> {
        let free = self.send_buffer.capacity() - self.send_buffer.len();
        if self.sent_list.is_full() || data.len() > free {
            return Err(());
        }
        let segment = SentSegment {
            seq: self.send_seq,
            flags,
            data_len: data.len() as u16,
            queued: false,
        };
        for byte in data {
            self.send_buffer.push_back(*byte).map_err(|_| ())?;
        }
        self.sent_list.push_back(segment).map_err(|_| ())?;
        self.send_seq += segment.len();
        Ok(segment)
    }

    /// Copy the data of the `index`-th unacknowledged segment into `out`.
    pub fn segment_data<'b>(
        &self,
        index: usize,
        out: &'b mut [u8],
    ) -> Option<(SentSegment, &'b [u8])> {
        let segment = *self.sent_list.iter().nth(index)?;
        let offset: usize = self
            .sent_list
            .iter()
            .take(index)
            .map(|s| s.data_len as usize)
            .sum();
        let out = out.get_mut(..segment.data_len as usize)?;
        for (dst, src) in out.iter_mut().zip(self.send_buffer.iter().skip(offset)) {
            *dst = *src;
        }
        Some((segment, out))
    }

    pub fn head_data<'b>(&self, out: &'b mut [u8]) -> Option<(SentSegment, &'b [u8])> {
        self.segment_data(0, out)
    }

    /// Mark the `index`-th segment as handed to the IP layer.
    pub fn mark_queued(&mut self, index: usize) {
        if let Some(segment) = self.sent_list.iter_mut().nth(index) {
            segment.queued = true;
        }
    }

    /// ACK is set on everything but the initial SYN.
    pub fn ack_flag(&self) -> Flags {
        if self.state == State::SynSent {
            Flags::empty()
        } else {
            Flags::ACK
        }
    }

    /// Header of a segment of this connection.
    pub fn header(&self, seq: SeqNumber, flags: Flags, window: u16) -> TcpRepr {
        TcpRepr {
            src_port: self.local.port,
            dst_port: self.remote.port,
            seq,
            ack: if flags.contains(Flags::ACK) {
                self.send_ack
            } else {
                SeqNumber(0)
            },
            flags,
            window,
            mss: flags.contains(Flags::SYN).then_some(NET_TCP_MSS),
            window_scale: None,
        }
    }

    /// Process an acceptable acknowledgment: free the segments it covers.
    /// Returns the number of freed segments.
    pub fn acknowledge(&mut self, ack: SeqNumber) -> usize {
        let mut freed = 0;
        while let Some(head) = self.sent_list.front() {
            if !head.is_acked_by(ack) {
                break;
            }
            for _ in 0..head.data_len {
                self.send_buffer.pop_front();
            }
            self.sent_list.pop_front();
            freed += 1;
        }
        self.highest_acked = ack;
        self.retry_timeout_shift = 0;
        freed
    }

    /// Whether `ack` acknowledges something new and nothing unsent.
    pub fn is_acceptable_ack(&self, ack: SeqNumber) -> bool {
        ack.in_range_left_open(self.highest_acked, self.send_seq)
    }
}
