//! Call core
//!
//! Everything that decides what a participant does with signaling events:
//! - Session identity and role (initiator or joiner)
//! - Pending queue for events that arrive before local media is ready
//! - Offer/answer/candidate negotiation state machine
//! - Replicated turn-taking over the counseling questions
//! - The controller that owns all of the above for one call

pub mod session;
pub mod queue;
pub mod negotiator;
pub mod turns;
pub mod controller;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{CallCommand, CallController, CallObserver, CallOutcome, CallSettings, NoopObserver};
pub use negotiator::{ConnectionState, LinkState, LocalMedia, NegotiationState, Negotiator, PeerEvent, PeerFactory, PeerLink};
pub use queue::PendingQueue;
pub use session::{generate_meeting_id, Role, Route, Session, SessionId};
pub use turns::{TurnSession, TurnState, TurnView, COUNSELING_QUESTIONS};

use std::error::Error;
use std::fmt;

/// Call-level errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Camera/microphone could not be acquired
    MediaAccess(String),
    /// Signaling channel failed to open or closed unexpectedly
    Transport(String),
    /// Remote description or candidate could not be applied
    Negotiation(String),
    /// Unknown or malformed signaling message
    Protocol(String),
    /// Operation not valid in the current state
    InvalidState(String),
    /// Turn action attempted by the participant who does not hold the turn
    NotYourTurn,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::MediaAccess(msg) => write!(f, "Media access error: {}", msg),
            CallError::Transport(msg) => write!(f, "Transport error: {}", msg),
            CallError::Negotiation(msg) => write!(f, "Negotiation error: {}", msg),
            CallError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            CallError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            CallError::NotYourTurn => write!(f, "It is the other participant's turn"),
        }
    }
}

impl Error for CallError {}
