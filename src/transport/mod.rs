//! Signaling transport
//!
//! Carries JSON signaling events between the two participants of a meeting:
//! the client side a participant uses, and the room relay the server runs.

pub mod client;
pub mod relay;

pub use client::SignalingTransport;
pub use relay::{handle_relay_connection, RoomRegistry};

use crate::rtc::signaling::SignalingEvent;

/// Outbound half of the signaling channel.
///
/// Sending is fire-and-forget: when the channel is not open the event is
/// logged and dropped.
pub trait SignalSink: Send + Sync {
    fn send(&self, event: &SignalingEvent);
}

/// Inbound signaling activity, delivered in transport order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A decoded signaling event
    Message(SignalingEvent),
    /// The relay closed the channel
    Closed,
    /// The channel failed
    Error(String),
}
