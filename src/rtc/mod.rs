//! WebRTC peer engine
//!
//! This module provides:
//! - The JSON signaling wire protocol
//! - webrtc-rs backed peer connections
//! - Local media tracks

pub mod signaling;
pub mod peer_connection;
pub mod media;

pub use media::LocalTracks;
pub use peer_connection::{RtcPeerFactory, RtcPeerLink};
pub use signaling::{IceCandidate, SdpKind, SessionDescription, SignalingEvent};
