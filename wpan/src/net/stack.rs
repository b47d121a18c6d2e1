use core::net::Ipv6Addr;

use rand_core::RngCore;

use super::context::{Family, NetContext, SocketType};
use super::ip::{Endpoint, Packet, Protocol, UdpRepr};
use super::{Arena, ContextHandle, Effect, Effects, Errno, Event, TcbHandle};
use crate::config::*;
use crate::tcp::{BacklogEntry, Input, SeqNumber, State, Tcb, TcpStats, Timer};
use crate::time::{Instant, TimerQueue};

const EPHEMERAL_PORTS: core::ops::RangeInclusive<u16> = 49152..=65535;

/// Counters of the datagram path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UdpStats {
    pub rx_datagrams: u32,
    pub tx_datagrams: u32,
    pub malformed: u32,
    /// Datagrams without a context, or arriving while one is unread.
    pub dropped: u32,
}

/// The context registry and the transport engines behind it.
pub struct NetStack<Rng> {
    pub(crate) contexts: Arena<NetContext, NET_MAX_CONTEXTS>,
    pub(crate) tcbs: Arena<Tcb, NET_MAX_TCP_CONTEXT>,
    pub(crate) backlog: Arena<BacklogEntry, NET_TCP_BACKLOG_SIZE>,
    pub(crate) timers: TimerQueue<Timer, TIMER_QUEUE_SIZE>,
    pending: Effects,
    pub(crate) rng: Rng,
    local_addr: Ipv6Addr,
    next_port: u16,
    pub tcp_stats: TcpStats,
    pub udp_stats: UdpStats,
}

impl<Rng: RngCore> NetStack<Rng> {
    pub fn new(local_addr: Ipv6Addr, rng: Rng) -> Self {
        Self {
            contexts: Arena::new(),
            tcbs: Arena::new(),
            backlog: Arena::new(),
            timers: TimerQueue::new(),
            pending: Effects::new(),
            rng,
            local_addr,
            next_port: *EPHEMERAL_PORTS.start(),
            tcp_stats: TcpStats::default(),
            udp_stats: UdpStats::default(),
        }
    }

    pub fn local_addr(&self) -> Ipv6Addr {
        self.local_addr
    }

    pub fn context(&self, handle: ContextHandle) -> Option<&NetContext> {
        self.contexts.get(handle)
    }

    /// State of the connection of a TCP context.
    pub fn tcp_state(&self, handle: ContextHandle) -> Option<State> {
        let tcb = self.contexts.get(handle)?.tcb?;
        self.tcbs.get(tcb).map(|tcb| tcb.state)
    }

    /// The earliest instant at which [`NetStack::poll`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Allocate a context.
    pub fn context_get(
        &mut self,
        family: Family,
        socket_type: SocketType,
        protocol: Protocol,
    ) -> Result<ContextHandle, Errno> {
        if family != Family::Inet6 {
            return Err(Errno::EAFNOSUPPORT);
        }
        socket_type.check(protocol)?;
        self.contexts
            .insert(NetContext::new(socket_type, protocol))
            .map_err(|_| {
                warn!("net: no free context");
                Errno::ENOMEM
            })
    }

    /// Take another reference on a context.
    pub fn context_ref(&mut self, handle: ContextHandle) -> Result<(), Errno> {
        let ctx = self.context_mut(handle)?;
        ctx.refcount = ctx.refcount.checked_add(1).ok_or(Errno::EINVAL)?;
        Ok(())
    }

    /// Drop a reference. The context is released once unreferenced and
    /// without connection.
    pub fn context_unref(&mut self, handle: ContextHandle) -> Result<(), Errno> {
        let ctx = self.context_mut(handle)?;
        ctx.refcount = ctx.refcount.saturating_sub(1);
        if ctx.refcount == 0 && ctx.tcb.is_none() {
            debug!("net: releasing context {:?}", handle);
            self.contexts.remove(handle);
        }
        Ok(())
    }

    /// Close the context and drop the reference of the application. A TCP
    /// connection goes on closing in the background.
    pub fn put(&mut self, handle: ContextHandle, now: Instant) -> Result<(), Errno> {
        let tcb = self.context_mut(handle)?.tcb;
        if let Some(tcb) = tcb {
            self.tcp_close(tcb, now);
        }
        match self.contexts.get(handle) {
            Some(_) => self.context_unref(handle),
            None => Ok(()),
        }
    }

    pub fn bind(&mut self, handle: ContextHandle, local: Endpoint) -> Result<(), Errno> {
        let ctx = self.context_mut(handle)?;
        if ctx.is_bound() {
            return Err(Errno::EINVAL);
        }
        let protocol = ctx.protocol;
        if !local.addr.is_unspecified() && local.addr != self.local_addr {
            return Err(Errno::EADDRNOTAVAIL);
        }

        let port = match local.port {
            0 => self.ephemeral_port(protocol)?,
            port if self.port_in_use(protocol, port) => return Err(Errno::EADDRINUSE),
            port => port,
        };
        let local = Endpoint::new(self.local_addr, port);
        self.context_mut(handle)?.local = local;
        debug!("net: context {:?} bound to {}", handle, local);
        Ok(())
    }

    fn port_in_use(&self, protocol: Protocol, port: u16) -> bool {
        self.contexts
            .iter()
            .any(|(_, ctx)| ctx.protocol == protocol && ctx.local.port == port)
    }

    fn ephemeral_port(&mut self, protocol: Protocol) -> Result<u16, Errno> {
        for _ in EPHEMERAL_PORTS {
            let port = self.next_port;
            self.next_port = match port {
                65535 => *EPHEMERAL_PORTS.start(),
                port => port + 1,
            };
            if !self.port_in_use(protocol, port) {
                return Ok(port);
            }
        }
        Err(Errno::EADDRINUSE)
    }

    fn auto_bind(&mut self, handle: ContextHandle) -> Result<Endpoint, Errno> {
        if !self.context_mut(handle)?.is_bound() {
            self.bind(handle, Endpoint::UNSPECIFIED)?;
        }
        Ok(self.context_mut(handle)?.local)
    }

    /// Set the peer of a context. For TCP this starts the active open,
    /// completed by [`Event::Connected`] or [`Event::ConnectFailed`].
    pub fn connect(
        &mut self,
        handle: ContextHandle,
        remote: Endpoint,
        now: Instant,
    ) -> Result<(), Errno> {
        let ctx = self.context_mut(handle)?;
        if !remote.is_specified() || remote.addr.is_unspecified() {
            return Err(Errno::EINVAL);
        }

        match ctx.protocol {
            Protocol::Udp => {
                self.auto_bind(handle)?;
                self.context_mut(handle)?.remote = remote;
                Ok(())
            }
            Protocol::Tcp => {
                if let Some(tcb) = ctx.tcb {
                    return Err(match self.tcbs.get(tcb).map(|tcb| tcb.state) {
                        Some(State::SynSent | State::SynRcvd) => Errno::EALREADY,
                        Some(State::Listen) => Errno::EINVAL,
                        _ => Errno::EISCONN,
                    });
                }
                if self.tcbs.len() == self.tcbs.capacity() {
                    return Err(Errno::ENOBUFS);
                }
                let local = self.auto_bind(handle)?;

                let iss = SeqNumber(self.rng.next_u32());
                let mut tcb = Tcb::new(handle, local, remote, iss);
                tcb.apply(Input::Connect);
                let tcb = self.tcbs.insert(tcb).map_err(|_| Errno::ENOBUFS)?;
                let ctx = self.context_mut(handle)?;
                ctx.tcb = Some(tcb);
                ctx.remote = remote;

                info!("tcp: connecting {} to {}", local, remote);
                self.tcp_open(tcb, now);
                self.arm(now + NET_TCP_CONNECT_TIMEOUT, Timer::Connect(tcb));
                Ok(())
            }
        }
    }

    /// Accept connections on the bound port of a TCP context.
    pub fn listen(&mut self, handle: ContextHandle) -> Result<(), Errno> {
        let ctx = self.context_mut(handle)?;
        if ctx.protocol != Protocol::Tcp {
            return Err(Errno::EOPNOTSUPP);
        }
        if !ctx.is_bound() {
            return Err(Errno::EINVAL);
        }
        let local = ctx.local;
        if let Some(tcb) = ctx.tcb {
            return match self.tcbs.get(tcb).map(|tcb| tcb.state) {
                Some(State::Listen) => Ok(()),
                _ => Err(Errno::EISCONN),
            };
        }

        let mut tcb = Tcb::new(handle, local, Endpoint::UNSPECIFIED, SeqNumber(0));
        tcb.apply(Input::Listen);
        let tcb = self.tcbs.insert(tcb).map_err(|_| Errno::ENOBUFS)?;
        self.context_mut(handle)?.tcb = Some(tcb);
        Ok(())
    }

    /// Take the next established connection of a listener.
    pub fn accept(&mut self, handle: ContextHandle) -> Result<ContextHandle, Errno> {
        let tcb = self.context_mut(handle)?.tcb.ok_or(Errno::EINVAL)?;
        if self.tcbs.get(tcb).map(|tcb| tcb.state) != Some(State::Listen) {
            return Err(Errno::EINVAL);
        }

        loop {
            let child = self
                .context_mut(handle)?
                .accept_queue
                .pop_front()
                .ok_or(Errno::EAGAIN)?;
            // Connections reset before being accepted are gone already.
            let Some(ctx) = self.contexts.get_mut(child) else {
                continue;
            };
            ctx.refcount = 1;
            if let Some(tcb) = ctx.tcb.and_then(|tcb| self.tcbs.get_mut(tcb)) {
                tcb.accepting = false;
            }
            return Ok(child);
        }
    }

    /// Queue data on a connection, or send a datagram to the connected peer.
    /// Returns the number of octets accepted.
    pub fn send(&mut self, handle: ContextHandle, data: &[u8], now: Instant) -> Result<usize, Errno> {
        let ctx = self.context_mut(handle)?;
        match ctx.protocol {
            Protocol::Udp => {
                if !ctx.remote.is_specified() {
                    return Err(Errno::EDESTADDRREQ);
                }
                let remote = ctx.remote;
                self.send_to(handle, data, remote)
            }
            Protocol::Tcp => {
                let tcb = ctx.tcb.ok_or(Errno::ENOTCONN)?;
                self.tcp_send(tcb, data, now)
            }
        }
    }

    /// Send a datagram.
    pub fn send_to(
        &mut self,
        handle: ContextHandle,
        data: &[u8],
        remote: Endpoint,
    ) -> Result<usize, Errno> {
        if self.context_mut(handle)?.protocol != Protocol::Udp {
            return Err(Errno::EOPNOTSUPP);
        }
        if !remote.is_specified() {
            return Err(Errno::EDESTADDRREQ);
        }
        let local = self.auto_bind(handle)?;
        let packet = UdpRepr::emit(&local, &remote, data)?;
        self.udp_stats.tx_datagrams += 1;
        self.push(Effect::Transmit(packet));
        Ok(data.len())
    }

    /// Read received data. Returns 0 once the peer closed a connection. A
    /// datagram longer than `buf` is truncated.
    pub fn recv(&mut self, handle: ContextHandle, buf: &mut [u8]) -> Result<usize, Errno> {
        self.recv_from(handle, buf).map(|(len, _)| len)
    }

    pub fn recv_from(
        &mut self,
        handle: ContextHandle,
        buf: &mut [u8],
    ) -> Result<(usize, Endpoint), Errno> {
        let ctx = self.context_mut(handle)?;
        match ctx.protocol {
            Protocol::Udp => {
                let from = ctx.datagram_from.take().ok_or(Errno::EAGAIN)?;
                let len = ctx.pop(buf);
                ctx.recv.clear();
                Ok((len, from))
            }
            Protocol::Tcp => {
                let remote = ctx.remote;
                if ctx.recv.is_empty() {
                    return match (ctx.peer_closed, ctx.tcb) {
                        (true, _) => Ok((0, remote)),
                        (false, None) => Err(Errno::ENOTCONN),
                        (false, Some(_)) => Err(Errno::EAGAIN),
                    };
                }
                let before = ctx.window();
                let len = ctx.pop(buf);
                let after = ctx.window();
                if let Some(tcb) = ctx.tcb {
                    self.window_update(tcb, before, after);
                }
                Ok((len, remote))
            }
        }
    }

    /// Process an IPv6 packet for this node.
    pub fn input_packet(&mut self, packet: &[u8], now: Instant) -> Effects {
        match Packet::parse(packet) {
            Ok(packet) => match packet.protocol {
                Protocol::Tcp => self.input(&packet.src, &packet.dst, &packet.payload, now),
                Protocol::Udp => self.input_udp(&packet.src, &packet.dst, &packet.payload),
            },
            Err(err) => {
                debug!("net: dropping packet: {}", err);
                self.take_effects()
            }
        }
    }

    /// Process a TCP segment.
    pub fn input(&mut self, src: &Ipv6Addr, dst: &Ipv6Addr, segment: &[u8], now: Instant) -> Effects {
        if *dst == self.local_addr {
            self.tcp_input(src, dst, segment, now);
        } else {
            self.tcp_stats.dropped += 1;
        }
        self.take_effects()
    }

    /// Process a UDP datagram.
    pub fn input_udp(&mut self, src: &Ipv6Addr, dst: &Ipv6Addr, datagram: &[u8]) -> Effects {
        self.udp_input(src, dst, datagram);
        self.take_effects()
    }

    fn udp_input(&mut self, src: &Ipv6Addr, dst: &Ipv6Addr, datagram: &[u8]) {
        self.udp_stats.rx_datagrams += 1;
        let (repr, payload) = match UdpRepr::parse(src, dst, datagram) {
            Ok(parsed) if *dst == self.local_addr => parsed,
            Ok(_) => {
                self.udp_stats.dropped += 1;
                return;
            }
            Err(_) => {
                self.udp_stats.malformed += 1;
                return;
            }
        };
        let from = Endpoint::new(*src, repr.src_port);

        let Some(handle) = self.contexts.find(|ctx| {
            ctx.protocol == Protocol::Udp
                && ctx.local.port == repr.dst_port
                && (!ctx.remote.is_specified() || ctx.remote == from)
        }) else {
            debug!("udp: no context for port {}", repr.dst_port);
            self.udp_stats.dropped += 1;
            return;
        };

        let Some(ctx) = self.contexts.get_mut(handle) else {
            return;
        };
        if ctx.datagram_from.is_some() || payload.len() > ctx.recv.capacity() {
            self.udp_stats.dropped += 1;
            return;
        }
        let len = ctx.push(payload);
        ctx.datagram_from = Some(from);
        self.notify(handle, Event::DataReceived(len));
    }

    /// Fire the expired timers.
    pub fn poll(&mut self, now: Instant) -> Effects {
        while let Some(timer) = self.timers.pop_expired(now) {
            self.on_timer(timer, now);
        }
        self.take_effects()
    }

    /// Effects of the application calls since the last `input` or `poll`.
    pub fn take_effects(&mut self) -> Effects {
        core::mem::take(&mut self.pending)
    }

    pub(crate) fn context_mut(&mut self, handle: ContextHandle) -> Result<&mut NetContext, Errno> {
        self.contexts.get_mut(handle).ok_or(Errno::EBADF)
    }

    pub(crate) fn push(&mut self, effect: Effect) {
        if self.pending.push(effect).is_err() {
            error!("net: effect queue full");
        }
    }

    /// Contexts released by the application, or not accepted yet, get no
    /// notifications.
    pub(crate) fn notify(&mut self, context: ContextHandle, event: Event) {
        if self.contexts.get(context).is_some_and(|ctx| ctx.refcount > 0) {
            self.push(Effect::Notify(context, event));
        }
    }

    pub(crate) fn arm(&mut self, deadline: Instant, timer: Timer) {
        if self.timers.schedule(deadline, timer).is_err() {
            error!("net: timer queue full, dropping {:?}", timer);
        }
    }

    /// Drop a connection, and its context when unreferenced. `event` tells
    /// the application why.
    pub(crate) fn tcp_release(&mut self, handle: TcbHandle, event: Option<Event>) {
        let Some(tcb) = self.tcbs.remove(handle) else {
            return;
        };
        self.timers.cancel_matching(|timer| timer.tcb() == Some(handle));
        debug!("tcp {}: released in {:?}", tcb.local.port, tcb.state);

        let Some(ctx) = self.contexts.get_mut(tcb.context) else {
            return;
        };
        ctx.tcb = None;
        if ctx.refcount == 0 {
            self.contexts.remove(tcb.context);
        } else if let Some(event) = event {
            self.notify(tcb.context, event);
        }
    }
}
