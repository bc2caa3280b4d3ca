//! Fakes for driving the call core without a network or a media engine

use super::controller::CallObserver;
use super::negotiator::{LocalMedia, PeerEvent, PeerFactory, PeerLink};
use super::turns::TurnView;
use super::CallError;
use crate::rtc::signaling::{IceCandidate, SessionDescription, SignalingEvent};
use crate::transport::{SignalSink, TransportEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::track::track_local::TrackLocal;

pub fn candidate(name: &str) -> IceCandidate {
    IceCandidate {
        candidate: name.to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

/// Keeps everything sent, in order
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SignalingEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SignalingEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<SignalingEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl SignalSink for RecordingSink {
    fn send(&self, event: &SignalingEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Delivers everything sent to the other participant's inbound channel,
/// like a two-person relay room
pub struct ChannelSink {
    peer: mpsc::UnboundedSender<TransportEvent>,
    sent: RecordingSink,
}

impl ChannelSink {
    pub fn new(peer: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { peer, sent: RecordingSink::default() }
    }

    pub fn sent(&self) -> Vec<SignalingEvent> {
        self.sent.events()
    }
}

impl SignalSink for ChannelSink {
    fn send(&self, event: &SignalingEvent) {
        self.sent.send(event);
        let _ = self.peer.send(TransportEvent::Message(event.clone()));
    }
}

#[derive(Default)]
pub struct FakeMedia {
    stops: AtomicUsize,
    muted: AtomicBool,
    camera_off: AtomicBool,
}

impl FakeMedia {
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn audio_enabled(&self) -> bool {
        !self.muted.load(Ordering::SeqCst)
    }

    pub fn video_enabled(&self) -> bool {
        !self.camera_off.load(Ordering::SeqCst)
    }
}

impl LocalMedia for FakeMedia {
    fn tracks(&self) -> Vec<Arc<dyn TrackLocal + Send + Sync>> {
        Vec::new()
    }

    fn toggle_audio(&self) -> Option<bool> {
        Some(self.muted.fetch_xor(true, Ordering::SeqCst))
    }

    fn toggle_video(&self) -> Option<bool> {
        Some(self.camera_off.fetch_xor(true, Ordering::SeqCst))
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeLink {
    reject_remote: AtomicBool,
    candidates: Mutex<Vec<IceCandidate>>,
    remote: Mutex<Option<SessionDescription>>,
    closes: AtomicUsize,
}

impl FakeLink {
    pub fn reject_remote(&self, reject: bool) {
        self.reject_remote.store(reject, Ordering::SeqCst);
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }

    pub fn remote(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerLink for FakeLink {
    async fn create_offer(&self) -> Result<SessionDescription, CallError> {
        Ok(SessionDescription::offer("v=0 fake-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, CallError> {
        Ok(SessionDescription::answer("v=0 fake-answer"))
    }

    async fn apply_remote(&self, description: SessionDescription) -> Result<(), CallError> {
        if self.reject_remote.load(Ordering::SeqCst) {
            return Err(CallError::Negotiation("rejected".to_string()));
        }
        *self.remote.lock() = Some(description);
        Ok(())
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), CallError> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<(), CallError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out [`FakeLink`]s and keeps hold of the engine event channel so
/// tests can raise engine events
#[derive(Default)]
pub struct FakePeers {
    links: Mutex<Vec<Arc<FakeLink>>>,
    events: Mutex<Option<mpsc::UnboundedSender<PeerEvent>>>,
}

impl FakePeers {
    pub fn created(&self) -> usize {
        self.links.lock().len()
    }

    pub fn last_link(&self) -> Option<Arc<FakeLink>> {
        self.links.lock().last().cloned()
    }

    pub fn emit(&self, event: PeerEvent) {
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.send(event);
        }
    }
}

#[async_trait]
impl PeerFactory for FakePeers {
    async fn connect(
        &self,
        media: &dyn LocalMedia,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>, CallError> {
        assert!(media.tracks().is_empty());
        let link = Arc::new(FakeLink::default());
        self.links.lock().push(link.clone());
        *self.events.lock() = Some(events);
        Ok(link)
    }
}

/// Counts what the controller reported
#[derive(Default)]
pub struct RecordingObserver {
    live: AtomicUsize,
    ended: AtomicUsize,
    turns: Mutex<Vec<TurnView>>,
    notices: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn ended(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }

    pub fn turns(&self) -> Vec<TurnView> {
        self.turns.lock().clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().clone()
    }
}

impl CallObserver for RecordingObserver {
    fn remote_media_live(&self) {
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    fn turn_changed(&self, view: &TurnView) {
        self.turns.lock().push(view.clone());
    }

    fn remote_ended(&self) {
        self.ended.fetch_add(1, Ordering::SeqCst);
    }

    fn notice(&self, message: &str) {
        self.notices.lock().push(message.to_string());
    }
}
