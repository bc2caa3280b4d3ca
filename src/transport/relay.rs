//! Meeting room relay
//!
//! Each text frame from a participant is forwarded verbatim to every other
//! participant of the same meeting, and to no one else. The relay does not
//! interpret messages except to announce departures.

use crate::call::SessionId;
use crate::rtc::signaling::SignalingEvent;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Frames queued for one connected participant
#[derive(Debug)]
pub enum RelayFrame {
    Text(String),
    Close { code: u16, reason: String },
}

struct Participant {
    id: Uuid,
    sender: mpsc::UnboundedSender<RelayFrame>,
}

/// Rooms keyed by meeting id. Created on first join, removed when empty.
pub struct RoomRegistry {
    capacity: usize,
    rooms: Mutex<HashMap<String, Vec<Participant>>>,
}

impl RoomRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Add a participant. Returns `None` when the room is full.
    pub fn join(&self, room: &str, sender: mpsc::UnboundedSender<RelayFrame>) -> Option<Uuid> {
        let mut rooms = self.rooms.lock();
        let participants = rooms.entry(room.to_string()).or_default();
        if participants.len() >= self.capacity {
            return None;
        }
        let id = Uuid::new_v4();
        participants.push(Participant { id, sender });
        info!("Participant {} joined room {} ({} present)", id, room, participants.len());
        Some(id)
    }

    /// Remove a participant and tell the others the call is over
    pub fn leave(&self, room: &str, id: Uuid) {
        let mut rooms = self.rooms.lock();
        let Some(participants) = rooms.get_mut(room) else {
            return;
        };
        participants.retain(|p| p.id != id);
        info!("Participant {} left room {} ({} remaining)", id, room, participants.len());

        if participants.is_empty() {
            rooms.remove(room);
            return;
        }

        match SignalingEvent::EndCall.to_json() {
            Ok(end_call) => {
                for participant in participants.iter() {
                    let _ = participant.sender.send(RelayFrame::Text(end_call.clone()));
                }
            }
            Err(e) => error!("{}", e),
        }
    }

    /// Forward a frame to everyone in the room except its sender.
    /// Returns how many participants it was queued for.
    pub fn forward(&self, room: &str, from: Uuid, text: &str) -> usize {
        let rooms = self.rooms.lock();
        let Some(participants) = rooms.get(room) else {
            return 0;
        };
        participants
            .iter()
            .filter(|p| p.id != from)
            .filter(|p| p.sender.send(RelayFrame::Text(text.to_string())).is_ok())
            .count()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }

    pub fn participant_count(&self) -> usize {
        self.rooms.lock().values().map(Vec::len).sum()
    }
}

/// Serve one participant's WebSocket for the lifetime of the connection
pub async fn handle_relay_connection(socket: WebSocket, meeting_id: SessionId, rooms: Arc<RoomRegistry>) {
    let room = meeting_id.as_str();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<RelayFrame>();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame {
                RelayFrame::Text(text) => Message::Text(text.into()),
                RelayFrame::Close { code, reason } => Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })),
            };
            let closing = matches!(message, Message::Close(_));
            if ws_sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let Some(participant) = rooms.join(room, tx.clone()) else {
        warn!("Room {} is full, refusing connection", room);
        let _ = tx.send(RelayFrame::Close {
            code: close_code::POLICY,
            reason: "meeting is full".to_string(),
        });
        drop(tx);
        let _ = send_task.await;
        return;
    };

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let delivered = rooms.forward(room, participant, text.as_str());
                debug!("Relayed frame in room {} to {} participant(s)", room, delivered);
            }
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame in room {}", room);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Relay connection error in room {}: {}", room, e);
                break;
            }
        }
    }

    rooms.leave(room, participant);
    send_task.abort();
}
