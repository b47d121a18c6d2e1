use rand_core::RngCore;

use super::state::{Input, State};
use super::Timer;
use crate::config::NET_TCP_RETRY_COUNT;
use crate::net::{Errno, Event, NetStack, TcbHandle};
use crate::time::Instant;

impl<Rng: RngCore> NetStack<Rng> {
    pub(crate) fn on_timer(&mut self, timer: Timer, now: Instant) {
        match timer {
            Timer::Retransmit(tcb) => self.on_retransmit(tcb, now),
            Timer::Connect(handle) => {
                let Some(tcb) = self.tcbs.get_mut(handle) else {
                    return;
                };
                if matches!(tcb.state, State::SynSent | State::SynRcvd) {
                    warn!("tcp {}: connect to {} timed out", tcb.local.port, tcb.remote);
                    tcb.apply(Input::Timeout);
                    self.tcp_stats.aborted += 1;
                    self.tcp_release(handle, Some(Event::ConnectFailed(Errno::ETIMEDOUT)));
                }
            }
            Timer::Close(handle) => {
                let Some(tcb) = self.tcbs.get_mut(handle) else {
                    return;
                };
                debug!("tcp {}: closing after {:?}", tcb.local.port, tcb.state);
                tcb.apply(Input::Timeout);
                self.tcp_release(handle, Some(Event::Closed));
            }
            Timer::Backlog(handle) => {
                if let Some(entry) = self.backlog.remove(handle) {
                    debug!(
                        "tcp {}: handshake with {} timed out",
                        entry.local.port, entry.remote
                    );
                }
            }
        }
    }

    fn on_retransmit(&mut self, handle: TcbHandle, now: Instant) {
        let Some(tcb) = self.tcbs.get_mut(handle) else {
            return;
        };
        if tcb.sent_list.is_empty() {
            return;
        }
        if tcb.retry_timeout_shift >= NET_TCP_RETRY_COUNT {
            warn!("tcp {}: {} unreachable", tcb.local.port, tcb.remote);
            let event = match tcb.state {
                State::SynSent => Event::ConnectFailed(Errno::ETIMEDOUT),
                _ => Event::Aborted(Errno::ETIMEDOUT),
            };
            tcb.apply(Input::Timeout);
            self.tcp_stats.aborted += 1;
            self.tcp_release(handle, Some(event));
            return;
        }

        tcb.retry_timeout_shift += 1;
        let shift = tcb.retry_timeout_shift;
        debug!("tcp {}: retransmission {}", tcb.local.port, shift);
        self.tcp_stats.retransmissions += 1;
        self.tcp_retransmit_head(handle);
        self.arm(now + Self::rto(shift), Timer::Retransmit(handle));
    }
}
