use core::net::Ipv6Addr;

use rand_core::RngCore;

use super::backlog::{BacklogEntry, BacklogHandle};
use super::seq::SeqNumber;
use super::state::{Input, State};
use super::tcb::Tcb;
use super::wire::{Flags, TcpRepr};
use super::{Timer, DEFAULT_MSS};
use crate::config::{
    NET_RECV_BUFFER_SIZE, NET_TCP_ACK_TIMEOUT, NET_TCP_FIN_TIMEOUT, NET_TCP_TIME_WAIT_DELAY,
};
use crate::net::ip::{Endpoint, Protocol};
use crate::net::{Errno, Event, NetContext, NetStack, SocketType, TcbHandle};
use crate::time::Instant;

impl<Rng: RngCore> NetStack<Rng> {
    /// Demultiplex a segment: connections first, then half-open passive
    /// connections, then listeners.
    pub(crate) fn tcp_input(&mut self, src: &Ipv6Addr, dst: &Ipv6Addr, segment: &[u8], now: Instant) {
        self.tcp_stats.rx_segments += 1;
        let (repr, payload) = match TcpRepr::parse(src, dst, segment) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!("tcp: malformed segment: {:?}", err);
                self.tcp_stats.malformed += 1;
                return;
            }
        };
        let local = Endpoint::new(*dst, repr.dst_port);
        let remote = Endpoint::new(*src, repr.src_port);

        if let Some(tcb) = self.tcbs.find(|tcb| tcb.matches(&local, &remote)) {
            self.segment_input(tcb, &repr, payload, now);
        } else if let Some(entry) = self.backlog.find(|entry| entry.matches(&local, &remote)) {
            self.backlog_input(entry, &repr, payload, now);
        } else if let Some(listener) = self
            .tcbs
            .find(|tcb| tcb.state == State::Listen && tcb.local.port == local.port)
        {
            self.listener_input(listener, local, remote, &repr, now);
        } else {
            debug!("tcp: no connection for {} from {}", local, remote);
            self.reply_rst(local, remote, &repr, payload.len());
        }
    }

    fn listener_input(
        &mut self,
        listener: TcbHandle,
        local: Endpoint,
        remote: Endpoint,
        repr: &TcpRepr,
        now: Instant,
    ) {
        if repr.flags.contains(Flags::RST) {
            return;
        }
        if repr.flags.contains(Flags::ACK) {
            self.reply_rst(local, remote, repr, 0);
            return;
        }
        if !repr.flags.contains(Flags::SYN) {
            self.tcp_stats.dropped += 1;
            return;
        }

        let entry = BacklogEntry {
            listener,
            local,
            remote,
            iss: SeqNumber(self.rng.next_u32()),
            irs: repr.seq,
            peer_mss: repr.mss.unwrap_or(DEFAULT_MSS),
            peer_window: repr.window,
        };
        let Ok(handle) = self.backlog.insert(entry) else {
            warn!("tcp {}: backlog full, dropping SYN from {}", local.port, remote);
            self.tcp_stats.dropped += 1;
            return;
        };
        debug!("tcp {}: SYN from {}", local.port, remote);
        self.emit_segment(local, remote, &entry.syn_ack(NET_RECV_BUFFER_SIZE as u16), &[]);
        self.arm(now + NET_TCP_ACK_TIMEOUT, Timer::Backlog(handle));
    }

    fn backlog_input(&mut self, handle: BacklogHandle, repr: &TcpRepr, payload: &[u8], now: Instant) {
        let Some(entry) = self.backlog.get(handle).copied() else {
            return;
        };

        if repr.flags.contains(Flags::RST) {
            if repr.seq == entry.irs + 1 {
                debug!("tcp {}: handshake reset by {}", entry.local.port, entry.remote);
                self.tcp_stats.rst_received += 1;
                self.backlog.remove(handle);
                self.timers.cancel(Timer::Backlog(handle));
            } else {
                self.tcp_stats.invalid_rst += 1;
            }
            return;
        }
        if repr.flags.contains(Flags::SYN) && !repr.flags.contains(Flags::ACK) {
            // The SYN-ACK got lost.
            if repr.seq == entry.irs {
                let syn_ack = entry.syn_ack(NET_RECV_BUFFER_SIZE as u16);
                self.emit_segment(entry.local, entry.remote, &syn_ack, &[]);
            } else {
                self.tcp_stats.dropped += 1;
            }
            return;
        }
        if !repr.flags.contains(Flags::ACK) {
            self.tcp_stats.dropped += 1;
            return;
        }
        if repr.ack != entry.iss + 1 {
            self.reply_rst(entry.local, entry.remote, repr, payload.len());
            return;
        }
        if !entry.is_final_ack(repr) {
            self.tcp_stats.dropped += 1;
            return;
        }

        self.backlog.remove(handle);
        self.timers.cancel(Timer::Backlog(handle));
        self.promote(entry, repr, payload, now);
    }

    /// Turn a completed passive open into a connection waiting in the
    /// accept queue of its listener.
    fn promote(&mut self, entry: BacklogEntry, repr: &TcpRepr, payload: &[u8], now: Instant) {
        let listener = self
            .tcbs
            .get(entry.listener)
            .filter(|tcb| tcb.state == State::Listen)
            .map(|tcb| tcb.context);
        let Some(listener) = listener else {
            self.reply_rst(entry.local, entry.remote, repr, payload.len());
            return;
        };

        let mut ctx = NetContext::new(SocketType::Stream, Protocol::Tcp);
        ctx.local = entry.local;
        ctx.remote = entry.remote;
        // Owned by the application once accepted.
        ctx.refcount = 0;
        let Ok(child) = self.contexts.insert(ctx) else {
            warn!("tcp {}: no context for {}", entry.local.port, entry.remote);
            self.reply_rst(entry.local, entry.remote, repr, payload.len());
            return;
        };

        let mut tcb = Tcb::new(child, entry.local, entry.remote, entry.iss);
        tcb.state = State::SynRcvd;
        tcb.apply(Input::AckOfSyn);
        tcb.send_seq = entry.iss + 1;
        tcb.highest_acked = entry.iss + 1;
        tcb.send_ack = entry.irs + 1;
        tcb.sent_ack = entry.irs + 1;
        tcb.peer_mss = entry.peer_mss;
        tcb.peer_window = repr.window;
        tcb.accepting = true;
        let Ok(handle) = self.tcbs.insert(tcb) else {
            warn!("tcp {}: no control block for {}", entry.local.port, entry.remote);
            self.contexts.remove(child);
            self.reply_rst(entry.local, entry.remote, repr, payload.len());
            return;
        };
        if let Some(ctx) = self.contexts.get_mut(child) {
            ctx.tcb = Some(handle);
        }

        let queued = self
            .contexts
            .get_mut(listener)
            .map(|ctx| ctx.accept_queue.push_back(child).is_ok())
            .unwrap_or(false);
        if !queued {
            warn!("tcp {}: accept queue full", entry.local.port);
            self.tcp_abort(handle);
            return;
        }

        info!("tcp {}: connection from {}", entry.local.port, entry.remote);
        self.notify(listener, Event::Accepted(child));
        if !payload.is_empty() || repr.flags.contains(Flags::FIN) {
            self.segment_input(handle, repr, payload, now);
        }
    }

    /// Process a segment of an existing connection.
    fn segment_input(&mut self, handle: TcbHandle, repr: &TcpRepr, payload: &[u8], now: Instant) {
        let Some(state) = self.tcbs.get(handle).map(|tcb| tcb.state) else {
            return;
        };
        if repr.flags.contains(Flags::RST) {
            self.reset_input(handle, repr);
            return;
        }
        if state == State::SynSent {
            self.syn_sent_input(handle, repr);
            return;
        }
        if repr.flags.contains(Flags::SYN) {
            // A retransmitted SYN-ACK: our ACK got lost.
            self.tcp_stats.dropped += 1;
            self.send_ack(handle);
            return;
        }
        if !repr.flags.contains(Flags::ACK) {
            self.tcp_stats.dropped += 1;
            return;
        }

        let Some(tcb) = self.tcbs.get_mut(handle) else {
            return;
        };
        if repr.ack > tcb.send_seq {
            debug!("tcp {}: ACK {} of unsent data", tcb.local.port, repr.ack);
            self.tcp_stats.dropped += 1;
            return;
        }
        tcb.peer_window = repr.window;
        if tcb.is_acceptable_ack(repr.ack) && self.ack_input(handle, repr.ack, now) {
            return;
        }

        let mut ack_now = false;
        if !payload.is_empty() {
            self.data_input(handle, repr.seq, payload);
            ack_now = true;
        }
        if repr.flags.contains(Flags::FIN) {
            self.fin_input(handle, repr.seq + payload.len() as u32, now);
            ack_now = true;
        }
        if ack_now {
            self.send_ack(handle);
        }
    }

    fn reset_input(&mut self, handle: TcbHandle, repr: &TcpRepr) {
        let Some(tcb) = self.tcbs.get(handle) else {
            return;
        };
        let syn_sent = tcb.state == State::SynSent;
        let valid = if syn_sent {
            repr.flags.contains(Flags::ACK) && repr.ack == tcb.send_seq
        } else {
            match self.window_of(tcb.context) {
                0 => repr.seq == tcb.send_ack,
                window => repr.seq.in_window(tcb.send_ack, window as u32),
            }
        };
        if !valid {
            debug!("tcp {}: RST {} out of window", tcb.local.port, repr.seq);
            self.tcp_stats.invalid_rst += 1;
            return;
        }

        info!("tcp {}: reset by {}", tcb.local.port, tcb.remote);
        self.tcp_stats.rst_received += 1;
        if let Some(tcb) = self.tcbs.get_mut(handle) {
            tcb.apply(Input::Reset);
        }
        let event = match syn_sent {
            true => Event::ConnectFailed(Errno::ECONNREFUSED),
            false => Event::Aborted(Errno::ECONNRESET),
        };
        self.tcp_release(handle, Some(event));
    }

    fn syn_sent_input(&mut self, handle: TcbHandle, repr: &TcpRepr) {
        let Some(tcb) = self.tcbs.get_mut(handle) else {
            return;
        };
        if repr.flags.contains(Flags::ACK) && repr.ack != tcb.send_seq {
            let (local, remote) = (tcb.local, tcb.remote);
            self.reply_rst(local, remote, repr, 0);
            return;
        }
        if !repr.flags.contains(Flags::SYN) {
            self.tcp_stats.dropped += 1;
            return;
        }

        tcb.send_ack = repr.seq + 1;
        tcb.peer_mss = repr.mss.unwrap_or(DEFAULT_MSS);
        tcb.peer_window = repr.window;
        let context = tcb.context;

        if repr.flags.contains(Flags::ACK) {
            tcb.acknowledge(repr.ack);
            tcb.apply(Input::SynAck);
            info!("tcp {}: connected to {}", tcb.local.port, tcb.remote);
            self.timers.cancel(Timer::Retransmit(handle));
            self.timers.cancel(Timer::Connect(handle));
            self.send_ack(handle);
            self.notify(context, Event::Connected);
        } else {
            // Simultaneous open: our SYN goes out again, acknowledging theirs.
            tcb.apply(Input::Syn);
            self.tcp_retransmit_head(handle);
        }
    }

    /// Process an acceptable ACK. Returns whether the connection is gone.
    fn ack_input(&mut self, handle: TcbHandle, ack: SeqNumber, now: Instant) -> bool {
        let Some(tcb) = self.tcbs.get_mut(handle) else {
            return true;
        };
        let freed = tcb.acknowledge(ack);
        trace!("tcp {}: ACK {} freed {} segments", tcb.local.port, ack, freed);

        let context = tcb.context;
        let outstanding = !tcb.sent_list.is_empty();
        let fin_acked = tcb.fin_sent && ack == tcb.send_seq;
        let send_fin = tcb.fin_queued && !tcb.fin_sent && !outstanding;

        if tcb.state == State::SynRcvd {
            tcb.apply(Input::AckOfSyn);
            self.timers.cancel(Timer::Connect(handle));
            self.notify(context, Event::Connected);
        }

        self.timers.cancel(Timer::Retransmit(handle));
        if outstanding {
            self.arm(now + Self::rto(0), Timer::Retransmit(handle));
        }

        if fin_acked {
            let next = self.tcbs.get_mut(handle).and_then(|tcb| tcb.apply(Input::AckOfFin));
            match next {
                Some(State::FinWait2) => self.arm(now + NET_TCP_FIN_TIMEOUT, Timer::Close(handle)),
                Some(State::TimeWait) => {
                    self.arm(now + NET_TCP_TIME_WAIT_DELAY, Timer::Close(handle))
                }
                Some(State::Closed) => {
                    self.tcp_release(handle, Some(Event::Closed));
                    return true;
                }
                _ => {}
            }
        } else if send_fin {
            self.send_fin(handle, now);
        }
        false
    }

    fn data_input(&mut self, handle: TcbHandle, seq: SeqNumber, payload: &[u8]) {
        let Some(tcb) = self.tcbs.get_mut(handle) else {
            return;
        };
        // Skip what was received already, drop what comes too early.
        let offset = (tcb.send_ack - seq) as usize;
        if !tcb.state.can_receive() || seq > tcb.send_ack || offset >= payload.len() {
            debug!(
                "tcp {}: dropping segment {} expecting {}",
                tcb.local.port, seq, tcb.send_ack
            );
            self.tcp_stats.dropped += 1;
            return;
        }
        let Some(ctx) = self.contexts.get_mut(tcb.context) else {
            return;
        };
        let len = ctx.push(&payload[offset..]);
        tcb.send_ack += len as u32;
        let context = tcb.context;
        if len > 0 {
            self.notify(context, Event::DataReceived(len));
        }
    }

    fn fin_input(&mut self, handle: TcbHandle, fin_seq: SeqNumber, now: Instant) {
        let Some(tcb) = self.tcbs.get_mut(handle) else {
            return;
        };
        if tcb.fin_rcvd || fin_seq != tcb.send_ack || tcb.apply(Input::Fin).is_none() {
            return;
        }
        tcb.send_ack += 1;
        tcb.fin_rcvd = true;
        let context = tcb.context;
        let state = tcb.state;

        if let Some(ctx) = self.contexts.get_mut(context) {
            ctx.peer_closed = true;
        }
        self.notify(context, Event::PeerClosed);
        if state == State::TimeWait {
            self.arm(now + NET_TCP_TIME_WAIT_DELAY, Timer::Close(handle));
        }
    }
}
