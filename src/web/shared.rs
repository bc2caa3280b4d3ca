//! Shared state for the relay server

use crate::config::Config;
use crate::transport::RoomRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared state for the application
#[derive(Clone)]
pub struct SharedState {
    /// Configuration
    pub config: Arc<Config>,

    /// Open meeting rooms
    pub rooms: Arc<RoomRegistry>,

    /// Server start time
    pub start_time: Instant,
}

impl SharedState {
    pub fn new(config: Config) -> Self {
        let rooms = Arc::new(RoomRegistry::new(config.server.room_capacity));
        Self {
            config: Arc::new(config),
            rooms,
            start_time: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.room_count()
    }

    pub fn participant_count(&self) -> usize {
        self.rooms.participant_count()
    }
}
