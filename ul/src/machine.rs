//! The association state machine of PS3.8 Table 9-10,
//! restricted to the states which this implementation can inhabit.
//!
//! The transition table is data: both association sides consult
//! [`transition`] before acting on a PDU, and any event which the
//! table does not allow in the current state must be answered
//! with an A-ABORT.

use snafu::Snafu;
use std::fmt;

/// The states of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Sta1: idle, no transport connection.
    Idle,
    /// Sta4: transport connection open, nothing negotiated yet.
    TransportOpen,
    /// Sta5: A-ASSOCIATE-RQ sent, awaiting A-ASSOCIATE-AC or -RJ.
    AwaitingAssociateResponse,
    /// Sta6: association established, data transfer is legal.
    Established,
    /// Sta7: A-RELEASE-RQ sent, awaiting A-RELEASE-RP.
    AwaitingReleaseResponse,
    /// Sta8: the peer requested release, an A-RELEASE-RP is owed.
    ReleaseRequested,
    /// Sta10: release collision, this side has yet to send its A-RELEASE-RP.
    ReleaseCollision,
    /// Sta11: release collision, awaiting the peer's A-RELEASE-RP.
    ReleaseCollisionAwaitingResponse,
    /// Sta13: awaiting transport close after an abort or a final response.
    Closing,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Idle => "Sta1",
            State::TransportOpen => "Sta4",
            State::AwaitingAssociateResponse => "Sta5",
            State::Established => "Sta6",
            State::AwaitingReleaseResponse => "Sta7",
            State::ReleaseRequested => "Sta8",
            State::ReleaseCollision => "Sta10",
            State::ReleaseCollisionAwaitingResponse => "Sta11",
            State::Closing => "Sta13",
        };
        f.write_str(name)
    }
}

/// The events which drive an association between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// The transport connection was confirmed open.
    TransportConnected,
    /// This side sent an A-ASSOCIATE-RQ.
    SentAssociateRq,
    /// This side received an A-ASSOCIATE-RQ (acceptor role).
    ReceivedAssociateRq,
    /// This side sent an A-ASSOCIATE-AC (acceptor role).
    SentAssociateAc,
    /// This side sent an A-ASSOCIATE-RJ (acceptor role).
    SentAssociateRj,
    /// This side received an A-ASSOCIATE-AC.
    ReceivedAssociateAc,
    /// This side received an A-ASSOCIATE-RJ.
    ReceivedAssociateRj,
    /// This side sent a P-DATA-TF.
    SentPData,
    /// This side received a P-DATA-TF.
    ReceivedPData,
    /// This side sent an A-RELEASE-RQ.
    SentReleaseRq,
    /// This side received an A-RELEASE-RQ.
    ReceivedReleaseRq,
    /// This side sent an A-RELEASE-RP.
    SentReleaseRp,
    /// This side received an A-RELEASE-RP.
    ReceivedReleaseRp,
    /// This side sent an A-ABORT.
    SentAbort,
    /// This side received an A-ABORT.
    ReceivedAbort,
    /// The ARTIM timer expired.
    ArtimExpired,
    /// An incoming PDU could not be decoded.
    PduDecodeError,
    /// The transport connection was closed.
    TransportClosed,
}

/// The error raised when an event is not legal in the current state.
/// The association must answer it with an A-ABORT.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(display("event {:?} is not permitted in state {}", event, state))]
pub struct UnexpectedEventError {
    /// the state the association was in
    pub state: State,
    /// the offending event
    pub event: Event,
}

/// Apply one event to the given state,
/// producing the next state of the association.
pub fn transition(state: State, event: Event) -> Result<State, UnexpectedEventError> {
    use Event::*;
    use State::*;

    let next = match (state, event) {
        // abort is always legal and immediately terminates
        (_, SentAbort) => Closing,
        (_, ReceivedAbort) => Idle,
        (_, TransportClosed) => Idle,
        // ARTIM expiry while closing completes the close,
        // anywhere else it is handled by the caller as an abort
        (Closing, ArtimExpired) => Idle,

        // association establishment, requestor side
        (Idle, TransportConnected) => TransportOpen,
        (TransportOpen, SentAssociateRq) => AwaitingAssociateResponse,
        (AwaitingAssociateResponse, ReceivedAssociateAc) => Established,
        (AwaitingAssociateResponse, ReceivedAssociateRj) => Idle,

        // association establishment, acceptor side
        (Idle, ReceivedAssociateRq) => TransportOpen,
        (TransportOpen, ReceivedAssociateRq) => TransportOpen,
        (TransportOpen, SentAssociateAc) => Established,
        (TransportOpen, SentAssociateRj) => Closing,

        // data transfer
        (Established, SentPData) => Established,
        (Established, ReceivedPData) => Established,

        // orderly release
        (Established, SentReleaseRq) => AwaitingReleaseResponse,
        (Established, ReceivedReleaseRq) => ReleaseRequested,
        (ReleaseRequested, SentReleaseRp) => Closing,
        // outstanding responses may still arrive while releasing
        (AwaitingReleaseResponse, ReceivedPData) => AwaitingReleaseResponse,
        (AwaitingReleaseResponse, ReceivedReleaseRp) => Idle,
        // both sides requested release at once
        (AwaitingReleaseResponse, ReceivedReleaseRq) => ReleaseCollision,
        (ReleaseCollision, SentReleaseRp) => ReleaseCollisionAwaitingResponse,
        (ReleaseCollisionAwaitingResponse, ReceivedReleaseRp) => Idle,

        (state, event) => return Err(UnexpectedEventError { state, event }),
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requestor_happy_path() {
        let mut state = State::Idle;
        for event in [
            Event::TransportConnected,
            Event::SentAssociateRq,
            Event::ReceivedAssociateAc,
            Event::SentPData,
            Event::ReceivedPData,
            Event::SentReleaseRq,
            Event::ReceivedReleaseRp,
        ] {
            state = transition(state, event).unwrap();
        }
        assert_eq!(state, State::Idle);
    }

    #[test]
    fn acceptor_happy_path() {
        let mut state = State::Idle;
        for event in [
            Event::ReceivedAssociateRq,
            Event::SentAssociateAc,
            Event::ReceivedPData,
            Event::SentPData,
            Event::ReceivedReleaseRq,
            Event::SentReleaseRp,
        ] {
            state = transition(state, event).unwrap();
        }
        assert_eq!(state, State::Closing);
    }

    #[test]
    fn no_pdata_outside_established() {
        for state in [
            State::Idle,
            State::TransportOpen,
            State::AwaitingAssociateResponse,
            State::Closing,
        ] {
            assert!(
                transition(state, Event::SentPData).is_err(),
                "P-DATA must not be sent in {}",
                state
            );
        }
        assert!(transition(State::Idle, Event::ReceivedPData).is_err());
        assert!(transition(State::AwaitingAssociateResponse, Event::ReceivedPData).is_err());
    }

    #[test]
    fn abort_is_always_legal() {
        for state in [
            State::Idle,
            State::TransportOpen,
            State::AwaitingAssociateResponse,
            State::Established,
            State::AwaitingReleaseResponse,
            State::Closing,
        ] {
            assert_eq!(transition(state, Event::SentAbort).unwrap(), State::Closing);
            assert_eq!(transition(state, Event::ReceivedAbort).unwrap(), State::Idle);
        }
    }

    #[test]
    fn release_collision() {
        let state = transition(State::Established, Event::SentReleaseRq).unwrap();
        let state = transition(state, Event::ReceivedReleaseRq).unwrap();
        assert_eq!(state, State::ReleaseCollision);
        let state = transition(state, Event::SentReleaseRp).unwrap();
        assert_eq!(state, State::ReleaseCollisionAwaitingResponse);
        let state = transition(state, Event::ReceivedReleaseRp).unwrap();
        assert_eq!(state, State::Idle);
    }

    #[test]
    fn rejection_returns_to_idle() {
        let state = transition(State::TransportOpen, Event::SentAssociateRq).unwrap();
        let state = transition(state, Event::ReceivedAssociateRj).unwrap();
        assert_eq!(state, State::Idle);
    }
}
