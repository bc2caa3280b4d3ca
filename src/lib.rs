//! duet-call - two-party video calls with turn-based counseling questions
//!
//! A participant negotiates a peer-to-peer media link through a meeting room
//! relay, then both sides take turns asking from a shared question list.

pub mod config;
pub mod call;
pub mod rtc;
pub mod transport;
pub mod web;

// Re-exports
pub use call::{CallController, CallError, CallOutcome, Role, Route, Session, SessionId};
pub use config::Config;
pub use rtc::SignalingEvent;
