use rand_core::RngCore;

use super::seq::SeqNumber;
use super::state::{Input, State};
use super::wire::{Flags, TcpRepr};
use super::Timer;
use crate::config::{IPV6_MTU, NET_TCP_FIN_TIMEOUT, NET_TCP_INIT_RTO, NET_TCP_SENT_LIST_SIZE};
use crate::net::ip::Endpoint;
use crate::net::{ContextHandle, Effect, Errno, NetContext, NetStack, TcbHandle};
use crate::time::{Duration, Instant};

impl<Rng: RngCore> NetStack<Rng> {
    /// Receive window advertised for a context.
    pub(crate) fn window_of(&self, context: ContextHandle) -> u16 {
        self.contexts.get(context).map(NetContext::window).unwrap_or(0)
    }

    pub(crate) fn emit_segment(
        &mut self,
        local: Endpoint,
        remote: Endpoint,
        repr: &TcpRepr,
        payload: &[u8],
    ) {
        trace!(
            "tcp: {} -> {} {:?} seq={} ack={} len={}",
            local,
            remote,
            repr.flags,
            repr.seq,
            repr.ack,
            payload.len()
        );
        match repr.emit(&local, &remote, payload) {
            Some(packet) => {
                self.tcp_stats.tx_segments += 1;
                self.push(Effect::Transmit(packet));
            }
            None => warn!("tcp: segment of {} octets does not fit", payload.len()),
        }
    }

    /// Retransmission timeout after `shift` retransmissions.
    pub(crate) fn rto(shift: u8) -> Duration {
        NET_TCP_INIT_RTO.shl(shift as u32)
    }

    /// Send the `index`-th segment of the sent list. Returns `false` when
    /// there is no such segment.
    fn emit_sent_segment(&mut self, handle: TcbHandle, index: usize) -> bool {
        let mut data = [0u8; IPV6_MTU];
        let Some(tcb) = self.tcbs.get(handle) else {
            return false;
        };
        let window = self.window_of(tcb.context);
        let Some((segment, payload)) = tcb.segment_data(index, &mut data) else {
            return false;
        };
        let repr = tcb.header(segment.seq, segment.flags | tcb.ack_flag(), window);
        let (local, remote) = (tcb.local, tcb.remote);

        self.emit_segment(local, remote, &repr, payload);
        if let Some(tcb) = self.tcbs.get_mut(handle) {
            tcb.mark_queued(index);
            if repr.flags.contains(Flags::ACK) {
                tcb.sent_ack = tcb.send_ack;
            }
        }
        true
    }

    /// Send the queued segments that did not go out yet.
    pub(crate) fn tcp_output(&mut self, handle: TcbHandle, now: Instant) {
        let Some(tcb) = self.tcbs.get(handle) else {
            return;
        };
        let unsent: heapless::Vec<usize, NET_TCP_SENT_LIST_SIZE> = tcb
            .sent_list
            .iter()
            .enumerate()
            .filter(|(_, segment)| !segment.queued)
            .map(|(index, _)| index)
            .collect();

        for index in unsent.iter() {
            self.emit_sent_segment(handle, *index);
        }
        if !unsent.is_empty() && !self.timers.is_armed(Timer::Retransmit(handle)) {
            self.arm(now + Self::rto(0), Timer::Retransmit(handle));
        }
    }

    /// Resend the oldest unacknowledged segment.
    pub(crate) fn tcp_retransmit_head(&mut self, handle: TcbHandle) -> bool {
        self.emit_sent_segment(handle, 0)
    }

    /// Send the SYN of an active open.
    pub(crate) fn tcp_open(&mut self, handle: TcbHandle, now: Instant) {
        let Some(tcb) = self.tcbs.get_mut(handle) else {
            return;
        };
        if tcb.queue(Flags::SYN, &[]).is_ok() {
            self.tcp_output(handle, now);
        }
    }

    /// Acknowledge everything received so far.
    pub(crate) fn send_ack(&mut self, handle: TcbHandle) {
        let Some(tcb) = self.tcbs.get(handle) else {
            return;
        };
        let repr = tcb.header(tcb.send_seq, Flags::ACK, self.window_of(tcb.context));
        let (local, remote) = (tcb.local, tcb.remote);
        self.emit_segment(local, remote, &repr, &[]);
        if let Some(tcb) = self.tcbs.get_mut(handle) {
            tcb.sent_ack = tcb.send_ack;
        }
    }

    /// Answer a segment that belongs to no connection.
    pub(crate) fn reply_rst(
        &mut self,
        local: Endpoint,
        remote: Endpoint,
        repr: &TcpRepr,
        payload_len: usize,
    ) {
        if repr.flags.contains(Flags::RST) {
            return;
        }
        let reply = if repr.flags.contains(Flags::ACK) {
            TcpRepr {
                seq: repr.ack,
                flags: Flags::RST,
                ..Default::default()
            }
        } else {
            TcpRepr {
                seq: SeqNumber(0),
                ack: repr.seq + repr.segment_len(payload_len),
                flags: Flags::RST | Flags::ACK,
                ..Default::default()
            }
        };
        self.tcp_stats.rst_sent += 1;
        self.emit_segment(local, remote, &reply, &[]);
    }

    /// Reset the connection and drop it without telling the application.
    pub(crate) fn tcp_abort(&mut self, handle: TcbHandle) {
        let Some(tcb) = self.tcbs.get(handle) else {
            return;
        };
        let repr = tcb.header(tcb.send_seq, Flags::RST, 0);
        let (local, remote) = (tcb.local, tcb.remote);
        self.emit_segment(local, remote, &repr, &[]);
        self.tcp_stats.rst_sent += 1;
        self.tcp_stats.aborted += 1;
        self.tcp_release(handle, None);
    }

    /// Queue data of the application, split in segments of at most one MSS.
    pub(crate) fn tcp_send(
        &mut self,
        handle: TcbHandle,
        data: &[u8],
        now: Instant,
    ) -> Result<usize, Errno> {
        let tcb = self.tcbs.get_mut(handle).ok_or(Errno::ENOTCONN)?;
        if !tcb.state.can_send() || tcb.fin_queued {
            return Err(match tcb.state {
                State::SynSent | State::SynRcvd => Errno::EAGAIN,
                _ => Errno::ENOTCONN,
            });
        }

        let len = data.len().min(tcb.send_capacity());
        if len == 0 {
            return match data.is_empty() {
                true => Ok(0),
                false => Err(Errno::EAGAIN),
            };
        }
        let mss = tcb.mss();
        for chunk in data[..len].chunks(mss) {
            tcb.queue(Flags::PSH, chunk).map_err(|_| Errno::ENOBUFS)?;
        }
        self.tcp_output(handle, now);
        Ok(len)
    }

    /// Queue the FIN of the connection.
    pub(crate) fn send_fin(&mut self, handle: TcbHandle, now: Instant) {
        let Some(tcb) = self.tcbs.get_mut(handle) else {
            return;
        };
        if tcb.fin_sent || tcb.queue(Flags::FIN, &[]).is_err() {
            return;
        }
        tcb.fin_sent = true;
        self.tcp_output(handle, now);
    }

    /// Close on behalf of the application.
    pub(crate) fn tcp_close(&mut self, handle: TcbHandle, now: Instant) {
        let Some(tcb) = self.tcbs.get_mut(handle) else {
            return;
        };
        let state = tcb.state;
        match state {
            State::Listen => self.close_listener(handle),
            State::SynSent => {
                tcb.apply(Input::Close);
                self.tcp_release(handle, None);
            }
            State::SynRcvd | State::Established | State::CloseWait => {
                let next = tcb.apply(Input::Close);
                tcb.fin_queued = true;
                // A FIN waits for the data queued before it.
                if tcb.sent_list.is_empty() {
                    self.send_fin(handle, now);
                }
                if next == Some(State::LastAck) {
                    self.arm(now + NET_TCP_FIN_TIMEOUT, Timer::Close(handle));
                }
            }
            _ => debug!("tcp: close in {:?}", state),
        }
    }

    fn close_listener(&mut self, handle: TcbHandle) {
        let Some(tcb) = self.tcbs.get_mut(handle) else {
            return;
        };
        tcb.apply(Input::Close);
        let context = tcb.context;

        while let Some(entry) = self.backlog.find(|entry| entry.listener == handle) {
            self.backlog.remove(entry);
            self.timers.cancel(Timer::Backlog(entry));
        }
        while let Some(child) = self
            .contexts
            .get_mut(context)
            .and_then(|ctx| ctx.accept_queue.pop_front())
        {
            if let Some(tcb) = self.contexts.get(child).and_then(|ctx| ctx.tcb) {
                self.tcp_abort(tcb);
            }
        }
        self.tcp_release(handle, None);
    }

    /// Announce a window reopened by the application reading.
    pub(crate) fn window_update(&mut self, handle: TcbHandle, before: u16, after: u16) {
        let Some(tcb) = self.tcbs.get(handle) else {
            return;
        };
        let mss = tcb.mss() as u16;
        if tcb.state.can_receive() && before < mss && after >= mss {
            self.send_ack(handle);
        }
    }
}
