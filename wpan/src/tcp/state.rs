//! The connection state machine of RFC 793.

/// State of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    #[default]
    Closed,
    Listen,
    SynSent,
    SynRcvd,
    Established,
    CloseWait,
    LastAck,
    FinWait1,
    FinWait2,
    TimeWait,
    Closing,
}

/// What moves a connection from one state to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Input {
    /// Active open by the application.
    Connect,
    /// Passive open by the application.
    Listen,
    /// A SYN without ACK.
    Syn,
    /// A SYN acknowledging ours.
    SynAck,
    /// An ACK covering our SYN.
    AckOfSyn,
    /// An ACK covering our FIN.
    AckOfFin,
    /// The peer sent a FIN.
    Fin,
    /// The application closes.
    Close,
    /// A valid RST.
    Reset,
    /// A connection timer expired.
    Timeout,
}

impl State {
    /// The state after `input`, or `None` when the input is not valid in
    /// this state.
    pub fn next(self, input: Input) -> Option<State> {
        use State::*;

        let next = match (self, input) {
            (Closed, Input::Connect) => SynSent,
            (Closed, Input::Listen) => Listen,

            (Listen, Input::Close) => Closed,

            (SynSent, Input::SynAck) => Established,
            (SynSent, Input::Syn) => SynRcvd,
            (SynSent, Input::Close) => Closed,

            (SynRcvd, Input::AckOfSyn) => Established,
            (SynRcvd, Input::Close) => FinWait1,

            (Established, Input::Fin) => CloseWait,
            (Established, Input::Close) => FinWait1,

            (CloseWait, Input::Close) => LastAck,
            (LastAck, Input::AckOfFin) => Closed,

            (FinWait1, Input::AckOfFin) => FinWait2,
            (FinWait1, Input::Fin) => Closing,
            (FinWait2, Input::Fin) => TimeWait,
            (Closing, Input::AckOfFin) => TimeWait,

            (Closed | Listen, Input::Reset | Input::Timeout) => return None,
            (_, Input::Reset | Input::Timeout) => Closed,
            _ => return None,
        };
        Some(next)
    }

    /// Whether data can still be sent.
    pub fn can_send(self) -> bool {
        matches!(self, State::Established | State::CloseWait)
    }

    /// Whether data from the peer is still expected.
    pub fn can_receive(self) -> bool {
        matches!(self, State::Established | State::FinWait1 | State::FinWait2)
    }

    /// Whether the connection went through the handshake.
    pub fn is_synchronized(self) -> bool {
        !matches!(
            self,
            State::Closed | State::Listen | State::SynSent | State::SynRcvd
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES: [State; 11] = [
        State::Closed,
        State::Listen,
        State::SynSent,
        State::SynRcvd,
        State::Established,
        State::CloseWait,
        State::LastAck,
        State::FinWait1,
        State::FinWait2,
        State::TimeWait,
        State::Closing,
    ];

    fn run(start: State, inputs: &[Input]) -> Option<State> {
        inputs
            .iter()
            .try_fold(start, |state, input| state.next(*input))
    }

    #[test]
    fn opening() {
        assert_eq!(
            run(State::Closed, &[Input::Connect, Input::SynAck]),
            Some(State::Established)
        );
        assert_eq!(
            run(State::Closed, &[Input::Connect, Input::Syn, Input::AckOfSyn]),
            Some(State::Established)
        );
        assert_eq!(State::Closed.next(Input::Listen), Some(State::Listen));
        assert_eq!(State::Listen.next(Input::Syn), None);
    }

    #[test]
    fn closing() {
        use Input::*;

        let active = [Close, AckOfFin, Fin, Timeout];
        assert_eq!(run(State::Established, &active), Some(State::Closed));
        let simultaneous = [Close, Fin, AckOfFin];
        assert_eq!(run(State::Established, &simultaneous), Some(State::TimeWait));
        let passive = [Fin, Close, AckOfFin];
        assert_eq!(run(State::Established, &passive), Some(State::Closed));
    }

    #[test]
    fn every_state_handles_every_segment() {
        for state in STATES {
            for input in [Input::Syn, Input::AckOfSyn, Input::Fin, Input::Reset, Input::Timeout] {
                // A refused input keeps the state, an accepted one never
                // leads back to LISTEN.
                if let Some(next) = state.next(input) {
                    assert_ne!(next, State::Listen, "{:?} on {:?}", state, input);
                }
            }

            let ends = matches!(state, State::Closed | State::Listen);
            assert_eq!(state.next(Input::Reset).is_none(), ends);
            assert_eq!(
                state.next(Input::Timeout),
                (!ends).then_some(State::Closed)
            );
        }
    }

    #[test]
    fn synchronized_states() {
        assert!(!State::SynRcvd.is_synchronized());
        assert!(State::Established.is_synchronized());
        assert!(State::CloseWait.can_send());
        assert!(!State::CloseWait.can_receive());
        assert!(State::FinWait2.can_receive());
    }
}
