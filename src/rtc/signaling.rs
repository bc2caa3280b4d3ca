//! Signaling wire protocol
//!
//! Every message on the relay is one JSON object whose `type` field selects
//! the event. Negotiation events (join/offer/answer/candidate/end_call) and
//! turn-taking events (question_sync) share the same channel and are kept
//! apart only by that tag.

use crate::call::CallError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tags accepted on the wire, in declaration order of [`SignalingEvent`].
const KNOWN_TYPES: [&str; 6] = ["join", "offer", "answer", "candidate", "question_sync", "end_call"];

/// SDP kind as browsers serialize it in `RTCSessionDescription.toJSON()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Opaque media description blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Answer, sdp: sdp.into() }
    }
}

/// ICE candidate descriptor (`RTCIceCandidate.toJSON()` shape)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Signaling events exchanged between the two participants of a meeting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingEvent {
    /// Joiner announces presence; the initiator answers with an offer
    Join,

    /// SDP offer from the initiator
    Offer { offer: SessionDescription },

    /// SDP answer from the joiner
    Answer { answer: SessionDescription },

    /// Trickled ICE candidate, sent by both sides
    Candidate { candidate: IceCandidate },

    /// Full replicated turn state; `index`/`initiatorTurn` are omitted when
    /// question mode is switched off
    QuestionSync {
        active: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(rename = "initiatorTurn", default, skip_serializing_if = "Option::is_none")]
        initiator_turn: Option<bool>,
    },

    /// Participant left the call
    EndCall,
}

impl SignalingEvent {
    /// Parse a signaling event from a JSON text frame
    pub fn from_json(json: &str) -> Result<Self, CallError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| CallError::Protocol(format!("Invalid signaling message: {}", e)))?;

        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CallError::Protocol("Signaling message has no type".to_string()))?
            .to_string();

        if !KNOWN_TYPES.contains(&tag.as_str()) {
            return Err(CallError::Protocol(format!("Unknown message type: {}", tag)));
        }

        serde_json::from_value(value)
            .map_err(|e| CallError::Protocol(format!("Malformed {} message: {}", tag, e)))
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, CallError> {
        serde_json::to_string(self)
            .map_err(|e| CallError::Protocol(format!("Failed to serialize message: {}", e)))
    }

    /// Create an offer message
    pub fn offer(sdp: impl Into<String>) -> Self {
        SignalingEvent::Offer { offer: SessionDescription::offer(sdp) }
    }

    /// Create an answer message
    pub fn answer(sdp: impl Into<String>) -> Self {
        SignalingEvent::Answer { answer: SessionDescription::answer(sdp) }
    }

    /// Turn state broadcast while question mode is on
    pub fn question_active(index: usize, initiator_turn: bool) -> Self {
        SignalingEvent::QuestionSync {
            active: true,
            index: Some(index),
            initiator_turn: Some(initiator_turn),
        }
    }

    /// Turn state broadcast when question mode is switched off
    pub fn question_inactive() -> Self {
        SignalingEvent::QuestionSync { active: false, index: None, initiator_turn: None }
    }

    /// Wire tag of this event
    pub fn tag(&self) -> &'static str {
        match self {
            SignalingEvent::Join => "join",
            SignalingEvent::Offer { .. } => "offer",
            SignalingEvent::Answer { .. } => "answer",
            SignalingEvent::Candidate { .. } => "candidate",
            SignalingEvent::QuestionSync { .. } => "question_sync",
            SignalingEvent::EndCall => "end_call",
        }
    }
}
