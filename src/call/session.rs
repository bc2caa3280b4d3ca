//! Session identity, role assignment and entry routes

use super::CallError;
use rand::Rng;
use std::fmt;
use url::Url;

const MEETING_PATH: &str = "meeting";
const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Opaque, URL-safe meeting token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Accepts non-empty ids made of `[A-Za-z0-9_-]`
    pub fn new(id: impl Into<String>) -> Result<Self, CallError> {
        let id = id.into();
        let url_safe = id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if id.is_empty() || !url_safe {
            return Err(CallError::InvalidState(format!("Invalid meeting id: {:?}", id)));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of the call this participant is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Created the meeting; sends the offer
    Initiator,
    /// Opened a meeting link; announces itself and answers
    Joiner,
}

impl Role {
    pub fn is_initiator(self) -> bool {
        self == Role::Initiator
    }
}

/// One call, fixed for the lifetime of the participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub role: Role,
}

impl Session {
    /// Start a fresh meeting as initiator
    pub fn create() -> Self {
        Self { id: generate_meeting_id(), role: Role::Initiator }
    }

    /// Join an existing meeting
    pub fn join(id: SessionId) -> Self {
        Self { id, role: Role::Joiner }
    }

    /// Shareable path for this meeting
    pub fn meeting_path(&self) -> String {
        format!("/{}/{}", MEETING_PATH, self.id)
    }

    /// Relay endpoint for this meeting: `http`/`https` become `ws`/`wss`,
    /// the path becomes `/ws/<id>`
    pub fn signaling_endpoint(&self, base: &Url) -> Result<Url, CallError> {
        let mut endpoint = base.clone();
        let scheme = match base.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(CallError::Transport(format!(
                    "Unsupported signaling URL scheme: {}",
                    other
                )))
            }
        };
        endpoint
            .set_scheme(scheme)
            .map_err(|_| CallError::Transport(format!("Cannot use scheme {} for {}", scheme, base)))?;
        endpoint.set_path(&format!("/ws/{}", self.id));
        endpoint.set_query(None);
        endpoint.set_fragment(None);
        Ok(endpoint)
    }
}

/// Where the participant landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Home page; a meeting can be created from here
    Home,
    /// `/meeting/<id>`: join that meeting immediately
    Meeting(SessionId),
}

impl Route {
    /// Role determination from the URL path alone
    pub fn parse(path: &str) -> Self {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() == 3 && parts[0].is_empty() && parts[1] == MEETING_PATH {
            if let Ok(id) = SessionId::new(parts[2]) {
                return Route::Meeting(id);
            }
        }
        Route::Home
    }

    /// Accepts a full meeting link or a bare path
    pub fn from_link(link: &str) -> Self {
        match Url::parse(link) {
            Ok(url) => Route::parse(url.path()),
            Err(_) => Route::parse(link),
        }
    }

    /// Session implied by the route, if it is a meeting
    pub fn session(&self) -> Option<Session> {
        match self {
            Route::Home => None,
            Route::Meeting(id) => Some(Session::join(id.clone())),
        }
    }
}

/// Two groups of three lowercase letters, e.g. `abc-xyz`.
/// No uniqueness check against the relay.
pub fn generate_meeting_id() -> SessionId {
    let mut rng = rand::thread_rng();
    let mut group = || -> String {
        (0..3)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect()
    };
    let first = group();
    let second = group();
    SessionId(format!("{}-{}", first, second))
}
