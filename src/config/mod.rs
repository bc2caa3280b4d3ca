//! Configuration management for duet-call

use crate::call::{CallSettings, COUNSELING_QUESTIONS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Relay server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Where participants find the relay
    #[serde(default)]
    pub signaling: SignalingConfig,

    /// Peer connection configuration
    #[serde(default)]
    pub webrtc: WebRtcConfig,

    /// Call behavior
    #[serde(default)]
    pub call: CallConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port for pages and the relay
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding index.html and page assets
    #[serde(default = "default_web_root")]
    pub web_root: PathBuf,

    /// Participants allowed per meeting
    #[serde(default = "default_room_capacity")]
    pub room_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            web_root: default_web_root(),
            room_capacity: default_room_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Base URL of the relay; meeting links are built on it
    #[serde(default = "default_signaling_url")]
    pub url: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self { url: default_signaling_url() }
    }
}

/// ICE server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRtcConfig {
    /// STUN/TURN servers offered to the ICE agent
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServerConfig>,

    /// Send a microphone track
    #[serde(default = "default_true")]
    pub audio: bool,

    /// Send a camera track
    #[serde(default = "default_true")]
    pub video: bool,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            audio: true,
            video: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Milliseconds the departure notice stays up after the other side hangs up
    #[serde(default = "default_remote_end_delay_ms")]
    pub remote_end_delay_ms: u64,

    /// Counseling questions, in order
    #[serde(default = "default_questions")]
    pub questions: Vec<String>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            remote_end_delay_ms: default_remote_end_delay_ms(),
            questions: default_questions(),
        }
    }
}

impl CallConfig {
    pub fn settings(&self) -> CallSettings {
        CallSettings {
            remote_end_delay: Duration::from_millis(self.remote_end_delay_ms),
            questions: self.questions.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            signaling: SignalingConfig::default(),
            webrtc: WebRtcConfig::default(),
            call: CallConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.server.port == 0 {
            return Err("Server port must be non-zero".into());
        }

        if self.server.room_capacity < 2 {
            return Err("Room capacity must allow at least two participants".into());
        }

        let url = Url::parse(&self.signaling.url)
            .map_err(|e| format!("Invalid signaling url {:?}: {}", self.signaling.url, e))?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err("Signaling url must use http, https, ws or wss".into());
        }

        if !self.webrtc.audio && !self.webrtc.video {
            return Err("At least one of audio or video must be enabled".into());
        }

        for server in &self.webrtc.ice_servers {
            if server.urls.is_empty() {
                return Err("ICE server entries need at least one url".into());
            }
            if server.urls.iter().any(|u| u.starts_with("turn")) && server.username.is_none() {
                return Err("TURN servers require a username and credential".into());
            }
        }

        if self.call.questions.is_empty() {
            return Err("Question list must not be empty".into());
        }

        Ok(())
    }

    /// Parsed relay base URL
    pub fn signaling_url(&self) -> Result<Url, Box<dyn std::error::Error>> {
        Ok(Url::parse(&self.signaling.url)?)
    }
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_web_root() -> PathBuf {
    PathBuf::from("static")
}

fn default_room_capacity() -> usize {
    2
}

fn default_signaling_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![
        IceServerConfig {
            urls: vec!["stun:stun.l.google.com:19302".to_string()],
            username: None,
            credential: None,
        },
        IceServerConfig {
            urls: vec!["turn:openrelay.metered.ca:80".to_string()],
            username: Some("openrelayproject".to_string()),
            credential: Some("openrelayproject".to_string()),
        },
        IceServerConfig {
            urls: vec!["turn:openrelay.metered.ca:443".to_string()],
            username: Some("openrelayproject".to_string()),
            credential: Some("openrelayproject".to_string()),
        },
    ]
}

fn default_remote_end_delay_ms() -> u64 {
    2000
}

fn default_questions() -> Vec<String> {
    COUNSELING_QUESTIONS.iter().map(|q| q.to_string()).collect()
}

fn default_log_level() -> String {
    "info".to_string()
}
