//! Session controller
//!
//! Owns every piece of mutable call state for one participant and processes
//! transport events, peer engine events and user commands one at a time.
//! Nothing else holds a reference to the state, so handlers never interleave.

use super::negotiator::{LinkState, LocalMedia, Negotiator, PeerEvent, PeerFactory};
use super::queue::PendingQueue;
use super::session::Session;
use super::turns::{TurnSession, TurnView, COUNSELING_QUESTIONS};
use super::CallError;
use crate::rtc::signaling::SignalingEvent;
use crate::transport::{SignalSink, TransportEvent};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Per-call settings
#[derive(Debug, Clone)]
pub struct CallSettings {
    /// How long the departure notice stays up after the other side hangs up
    pub remote_end_delay: Duration,
    /// Counseling question list, never empty
    pub questions: Vec<String>,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            remote_end_delay: Duration::from_millis(2000),
            questions: COUNSELING_QUESTIONS.iter().map(|q| q.to_string()).collect(),
        }
    }
}

/// User actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallCommand {
    ToggleQuestions,
    NextQuestion,
    /// Mute or unmute the outbound audio
    ToggleMic,
    /// Switch the outbound video off or back on
    ToggleCamera,
    EndCall,
}

/// How the call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// Local participant hung up
    LocalHangup,
    /// The other participant hung up
    RemoteHangup,
    /// Signaling channel closed or failed
    TransportLost,
}

/// Presentation hooks. All methods default to doing nothing.
pub trait CallObserver: Send + Sync {
    /// First inbound media arrived
    fn remote_media_live(&self) {}

    /// Turn state changed, locally or from the other side
    fn turn_changed(&self, _view: &TurnView) {}

    /// The other participant ended the call
    fn remote_ended(&self) {}

    /// Something worth telling the user
    fn notice(&self, _message: &str) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl CallObserver for NoopObserver {}

/// Explicit context for one call
pub struct CallController {
    session: Session,
    negotiator: Negotiator,
    turns: TurnSession,
    queue: PendingQueue<SignalingEvent>,
    signals: Arc<dyn SignalSink>,
    observer: Arc<dyn CallObserver>,
    settings: CallSettings,
    peer_events: Option<mpsc::UnboundedReceiver<PeerEvent>>,
    outcome: Option<CallOutcome>,
}

impl CallController {
    pub fn new(
        session: Session,
        peers: Arc<dyn PeerFactory>,
        signals: Arc<dyn SignalSink>,
        observer: Arc<dyn CallObserver>,
        settings: CallSettings,
    ) -> Result<Self, CallError> {
        let turns = TurnSession::new(session.role, settings.questions.clone())?;
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let negotiator = Negotiator::new(session.role, peers, signals.clone(), peer_tx);
        Ok(Self {
            session,
            negotiator,
            turns,
            queue: PendingQueue::new(),
            signals,
            observer,
            settings,
            peer_events: Some(peer_rx),
            outcome: None,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    pub fn turns(&self) -> &TurnSession {
        &self.turns
    }

    pub fn outcome(&self) -> Option<CallOutcome> {
        self.outcome
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Local media acquired: replay everything that arrived before, in order
    pub async fn media_ready(&mut self, media: Arc<dyn LocalMedia>) {
        if self.outcome.is_some() {
            media.stop();
            return;
        }
        self.negotiator.attach_media(media);

        let early = self.queue.drain();
        if !early.is_empty() {
            info!("Local media ready, replaying {} queued event(s)", early.len());
        }
        for event in early {
            if self.outcome.is_some() {
                debug!("Call ended during replay, dropping remaining queued events");
                break;
            }
            self.dispatch(event).await;
        }
    }

    /// Joiner announces itself once the channel is open
    pub fn announce(&self) {
        if !self.session.role.is_initiator() {
            info!("Announcing presence in meeting {}", self.session.id);
            self.signals.send(&SignalingEvent::Join);
        }
    }

    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        if self.outcome.is_some() {
            return;
        }
        match event {
            TransportEvent::Message(event) => {
                if let Some(event) = self.queue.enqueue_or_dispatch(event) {
                    self.dispatch(event).await;
                } else {
                    debug!("Local media not ready, queued event ({} pending)", self.queue.len());
                }
            }
            TransportEvent::Closed => {
                warn!("Signaling channel closed");
                self.observer.notice("Connection to the meeting was lost.");
                self.teardown(CallOutcome::TransportLost).await;
            }
            TransportEvent::Error(e) => {
                warn!("Signaling channel failed: {}", e);
                self.observer.notice("Connection to the meeting was lost.");
                self.teardown(CallOutcome::TransportLost).await;
            }
        }
    }

    pub async fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::CandidateGathered(candidate) => self.negotiator.on_candidate_gathered(candidate),
            PeerEvent::TrackReceived => {
                if self.negotiator.on_track_received() {
                    self.observer.remote_media_live();
                }
            }
            PeerEvent::StateChanged(state) => {
                info!("Peer connection state: {:?}", state);
                if state == LinkState::Failed {
                    self.observer.notice("Media connection failed.");
                }
            }
        }
    }

    pub async fn handle_command(&mut self, command: CallCommand) -> Result<(), CallError> {
        if self.outcome.is_some() {
            return Err(CallError::InvalidState("Call has ended".to_string()));
        }
        match command {
            CallCommand::ToggleQuestions => {
                self.turns.toggle(self.signals.as_ref());
                self.observer.turn_changed(&self.turns.view());
            }
            CallCommand::NextQuestion => {
                self.turns.advance(self.signals.as_ref())?;
                self.observer.turn_changed(&self.turns.view());
            }
            CallCommand::ToggleMic => {
                let enabled = self
                    .local_media()?
                    .toggle_audio()
                    .ok_or_else(|| CallError::MediaAccess("No audio track".to_string()))?;
                info!("Microphone {}", if enabled { "on" } else { "muted" });
                self.observer.notice(if enabled { "Microphone on." } else { "Microphone muted." });
            }
            CallCommand::ToggleCamera => {
                let enabled = self
                    .local_media()?
                    .toggle_video()
                    .ok_or_else(|| CallError::MediaAccess("No video track".to_string()))?;
                info!("Camera {}", if enabled { "on" } else { "off" });
                self.observer.notice(if enabled { "Camera on." } else { "Camera off." });
            }
            CallCommand::EndCall => self.end_call().await,
        }
        Ok(())
    }

    fn local_media(&self) -> Result<Arc<dyn LocalMedia>, CallError> {
        self.negotiator
            .media()
            .ok_or_else(|| CallError::InvalidState("Local media is not ready".to_string()))
    }

    /// Hang up: tell the other side, then tear down
    pub async fn end_call(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        info!("Ending call");
        self.signals.send(&SignalingEvent::EndCall);
        self.teardown(CallOutcome::LocalHangup).await;
    }

    /// Process events until the call ends
    pub async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
        mut commands: mpsc::UnboundedReceiver<CallCommand>,
    ) -> CallOutcome {
        let Some(mut peer_events) = self.peer_events.take() else {
            return CallOutcome::TransportLost;
        };
        let mut commands_open = true;

        loop {
            if let Some(outcome) = self.outcome {
                return outcome;
            }

            tokio::select! {
                event = inbound.recv() => {
                    let event = event.unwrap_or(TransportEvent::Closed);
                    self.handle_transport_event(event).await;
                }
                Some(event) = peer_events.recv() => {
                    self.handle_peer_event(event).await;
                }
                command = commands.recv(), if commands_open => match command {
                    Some(command) => {
                        if let Err(e) = self.handle_command(command).await {
                            warn!("{:?} rejected: {}", command, e);
                            self.observer.notice(&e.to_string());
                        }
                    }
                    None => {
                        debug!("Command input closed");
                        commands_open = false;
                    }
                },
            }
        }
    }

    async fn dispatch(&mut self, event: SignalingEvent) {
        let tag = event.tag();
        if self.outcome.is_some() {
            debug!("Call has ended, ignoring {} event", tag);
            return;
        }
        let result = match event {
            SignalingEvent::Join => self.negotiator.on_join_announced().await,
            SignalingEvent::Offer { offer } => self.negotiator.on_offer_received(offer).await,
            SignalingEvent::Answer { answer } => self.negotiator.on_answer_received(answer).await,
            SignalingEvent::Candidate { candidate } => self.negotiator.on_candidate_received(candidate).await,
            SignalingEvent::QuestionSync { active, index, initiator_turn } => self
                .turns
                .apply_remote(active, index, initiator_turn)
                .map(|()| self.observer.turn_changed(&self.turns.view())),
            SignalingEvent::EndCall => {
                self.on_remote_end_call().await;
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("Failed to handle {} event: {}", tag, e);
        }
    }

    /// Tear down without broadcasting, keep the notice up for a moment
    async fn on_remote_end_call(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        info!("Remote participant ended the call");
        self.teardown(CallOutcome::RemoteHangup).await;
        self.observer.remote_ended();
        tokio::time::sleep(self.settings.remote_end_delay).await;
    }

    async fn teardown(&mut self, outcome: CallOutcome) {
        if self.outcome.is_some() {
            return;
        }
        self.negotiator.close().await;
        self.turns.reset();
        self.outcome = Some(outcome);
        debug!("Call torn down: {:?}", outcome);
    }
}
