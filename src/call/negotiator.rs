//! Offer/answer/candidate negotiation
//!
//! Initiator path: `Idle -> HasLocalOffer -> Linked`.
//! Joiner path: `Idle -> HasRemoteOffer -> Linked`.
//! Any state goes to `Closed` on local or remote end of call.
//!
//! The peer engine sits behind [`PeerFactory`]/[`PeerLink`] so the state
//! machine can be driven without a real ICE stack.

use super::session::Role;
use super::CallError;
use crate::rtc::signaling::{IceCandidate, SessionDescription, SignalingEvent};
use crate::transport::SignalSink;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::track::track_local::TrackLocal;

/// Negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// No peer connection yet
    Idle,
    /// Initiator sent its offer, waiting for the answer
    HasLocalOffer,
    /// Joiner applied the remote offer, answer in progress
    HasRemoteOffer,
    /// Both descriptions applied
    Linked,
    /// Torn down; terminal
    Closed,
}

/// Engine-level connection state, reported for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Events raised by the peer engine. They are fed back into the controller's
/// event loop, so they are handled after whatever handler was running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A new local network path candidate was discovered
    CandidateGathered(IceCandidate),
    /// An inbound media track arrived
    TrackReceived,
    /// The engine's connection state changed
    StateChanged(LinkState),
}

/// Local capture resources attached to every peer connection
pub trait LocalMedia: Send + Sync {
    /// Tracks to send to the remote participant
    fn tracks(&self) -> Vec<Arc<dyn TrackLocal + Send + Sync>>;

    /// Flip outbound audio on or off. Returns the new state, or `None` when
    /// there is no audio track.
    fn toggle_audio(&self) -> Option<bool>;

    /// Flip outbound video on or off. Returns the new state, or `None` when
    /// there is no video track.
    fn toggle_video(&self) -> Option<bool>;

    /// Release capture resources
    fn stop(&self);
}

/// One peer connection
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Generate an offer and apply it as the local description
    async fn create_offer(&self) -> Result<SessionDescription, CallError>;

    /// Generate an answer and apply it as the local description
    async fn create_answer(&self) -> Result<SessionDescription, CallError>;

    /// Apply the remote participant's description
    async fn apply_remote(&self, description: SessionDescription) -> Result<(), CallError>;

    /// Apply a remote candidate
    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), CallError>;

    /// Release the connection
    async fn close(&self) -> Result<(), CallError>;
}

/// Creates peer connections carrying the local media
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn connect(
        &self,
        media: &dyn LocalMedia,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>, CallError>;
}

/// Descriptions and candidates seen for the current connection
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub local_description: Option<SessionDescription>,
    pub remote_description: Option<SessionDescription>,
    pub local_candidates: Vec<IceCandidate>,
    pub remote_candidates: Vec<IceCandidate>,
    pub linked: bool,
    pub remote_media_live: bool,
}

/// Owns the peer connection lifecycle for one session
pub struct Negotiator {
    role: Role,
    state: NegotiationState,
    connection: ConnectionState,
    link: Option<Arc<dyn PeerLink>>,
    peers: Arc<dyn PeerFactory>,
    media: Option<Arc<dyn LocalMedia>>,
    signals: Arc<dyn SignalSink>,
    peer_events: mpsc::UnboundedSender<PeerEvent>,
    /// Remote candidates that reached an existing connection before its
    /// remote description was applied
    early_candidates: Vec<IceCandidate>,
}

impl Negotiator {
    pub fn new(
        role: Role,
        peers: Arc<dyn PeerFactory>,
        signals: Arc<dyn SignalSink>,
        peer_events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self {
            role,
            state: NegotiationState::Idle,
            connection: ConnectionState::default(),
            link: None,
            peers,
            media: None,
            signals,
            peer_events,
            early_candidates: Vec::new(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn has_connection(&self) -> bool {
        self.link.is_some()
    }

    /// Local media is ready; peer connections can be created from now on
    pub fn attach_media(&mut self, media: Arc<dyn LocalMedia>) {
        self.media = Some(media);
    }

    /// Attached media, until it is released by `close`
    pub fn media(&self) -> Option<Arc<dyn LocalMedia>> {
        self.media.clone()
    }

    /// Initiator: the joiner is present, send the offer
    pub async fn on_join_announced(&mut self) -> Result<(), CallError> {
        self.require(Role::Initiator, NegotiationState::Idle, "join")?;
        info!("Joiner is ready, creating offer");

        let link = self.open_link().await?;
        let offer = match link.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                self.discard_link().await;
                return Err(e);
            }
        };

        self.connection.local_description = Some(offer.clone());
        self.set_state(NegotiationState::HasLocalOffer);
        self.signals.send(&SignalingEvent::Offer { offer });
        Ok(())
    }

    /// Joiner: apply the initiator's offer and answer it
    pub async fn on_offer_received(&mut self, offer: SessionDescription) -> Result<(), CallError> {
        self.require(Role::Joiner, NegotiationState::Idle, "offer")?;
        info!("Received offer, creating answer");

        let link = self.open_link().await?;
        if let Err(e) = link.apply_remote(offer.clone()).await {
            self.discard_link().await;
            return Err(e);
        }
        self.connection.remote_description = Some(offer);
        self.set_state(NegotiationState::HasRemoteOffer);
        self.flush_early_candidates().await;

        let answer = match link.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                self.discard_link().await;
                return Err(e);
            }
        };

        self.connection.local_description = Some(answer.clone());
        self.connection.linked = true;
        self.set_state(NegotiationState::Linked);
        self.signals.send(&SignalingEvent::Answer { answer });
        Ok(())
    }

    /// Initiator: apply the joiner's answer
    pub async fn on_answer_received(&mut self, answer: SessionDescription) -> Result<(), CallError> {
        self.require(Role::Initiator, NegotiationState::HasLocalOffer, "answer")?;
        info!("Received answer");

        let link = self.current_link()?;
        link.apply_remote(answer.clone()).await?;

        self.connection.remote_description = Some(answer);
        self.connection.linked = true;
        self.set_state(NegotiationState::Linked);
        self.flush_early_candidates().await;
        Ok(())
    }

    /// Remote media arrived. Returns true the first time, which is when the
    /// waiting indicator should be cleared.
    pub fn on_track_received(&mut self) -> bool {
        if self.state == NegotiationState::Closed {
            return false;
        }
        let first = !self.connection.remote_media_live;
        self.connection.remote_media_live = true;
        if first {
            info!("Remote media track received, call is live");
        }
        first
    }

    /// Trickle a locally discovered candidate to the remote side
    pub fn on_candidate_gathered(&mut self, candidate: IceCandidate) {
        if self.state == NegotiationState::Closed {
            debug!("Dropping local candidate gathered after close");
            return;
        }
        self.connection.local_candidates.push(candidate.clone());
        self.signals.send(&SignalingEvent::Candidate { candidate });
    }

    /// Apply a remote candidate. Without a connection the candidate is
    /// dropped; that is not an error for the session.
    pub async fn on_candidate_received(&mut self, candidate: IceCandidate) -> Result<(), CallError> {
        let link = match (&self.link, self.state) {
            (_, NegotiationState::Closed) => {
                debug!("Dropping remote candidate received after close");
                return Ok(());
            }
            (None, _) => {
                warn!("No peer connection yet, dropping remote candidate");
                return Ok(());
            }
            (Some(link), _) => link.clone(),
        };

        if self.connection.remote_description.is_none() {
            debug!("Remote description not applied yet, holding candidate");
            self.early_candidates.push(candidate);
            return Ok(());
        }

        link.add_candidate(candidate.clone()).await?;
        self.connection.remote_candidates.push(candidate);
        Ok(())
    }

    /// Release the peer connection and local media. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if self.state == NegotiationState::Closed {
            return;
        }

        if let Some(link) = self.link.take() {
            if let Err(e) = link.close().await {
                warn!("Failed to close peer connection: {}", e);
            }
        }
        if let Some(media) = self.media.take() {
            media.stop();
        }

        self.early_candidates.clear();
        self.connection.linked = false;
        self.set_state(NegotiationState::Closed);
    }

    fn require(&self, role: Role, state: NegotiationState, event: &str) -> Result<(), CallError> {
        if self.role != role {
            return Err(CallError::InvalidState(format!(
                "{:?} does not handle {} events",
                self.role, event
            )));
        }
        if self.state != state {
            return Err(CallError::InvalidState(format!(
                "Ignoring {} in state {:?}",
                event, self.state
            )));
        }
        Ok(())
    }

    async fn open_link(&mut self) -> Result<Arc<dyn PeerLink>, CallError> {
        let media = self
            .media
            .clone()
            .ok_or_else(|| CallError::InvalidState("Local media is not ready".to_string()))?;
        let link = self.peers.connect(media.as_ref(), self.peer_events.clone()).await?;
        self.link = Some(link.clone());
        Ok(link)
    }

    /// Failed half-way through a step: back to `Idle` with no connection
    async fn discard_link(&mut self) {
        if let Some(link) = self.link.take() {
            if let Err(e) = link.close().await {
                debug!("Closing discarded peer connection failed: {}", e);
            }
        }
        self.early_candidates.clear();
        self.connection = ConnectionState::default();
        self.set_state(NegotiationState::Idle);
    }

    fn current_link(&self) -> Result<Arc<dyn PeerLink>, CallError> {
        self.link
            .clone()
            .ok_or_else(|| CallError::InvalidState("No peer connection".to_string()))
    }

    async fn flush_early_candidates(&mut self) {
        let Some(link) = self.link.clone() else {
            return;
        };
        for candidate in std::mem::take(&mut self.early_candidates) {
            match link.add_candidate(candidate.clone()).await {
                Ok(()) => self.connection.remote_candidates.push(candidate),
                Err(e) => warn!("Failed to apply held candidate: {}", e),
            }
        }
    }

    fn set_state(&mut self, state: NegotiationState) {
        if self.state != state {
            debug!("Negotiation state change: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}
