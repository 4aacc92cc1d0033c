//! # Interview Sessions
//!
//! One `Session` per live WebSocket connection, keyed by the connection's
//! identity. Sessions only live in process memory: a restart forgets every
//! interview in progress.
//!
//! ## Lifecycle:
//! 1. **NotStarted**: connection open, no `session_start` received yet
//! 2. **Active**: `session_start` received, turns are counted
//! 3. Gone: the connection closed and the registry entry was removed

pub mod registry;

pub use registry::SessionRegistry;

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Display name used when the client does not send one.
pub const DEFAULT_CANDIDATE_NAME: &str = "Candidate";

/// Identity of one WebSocket connection, normally the peer's `ip:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Identity derived from the peer address, or a fresh unique one when the
    /// transport does not expose it (unix sockets, some proxies).
    pub fn from_peer(peer: Option<std::net::SocketAddr>) -> Self {
        match peer {
            Some(addr) => Self(addr.to_string()),
            None => Self::generated(),
        }
    }

    pub fn generated() -> Self {
        Self(format!("anon-{}", Uuid::new_v4()))
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One candidate's interview attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Identifier supplied by the client; kept as given, possibly absent
    pub session_id: Option<String>,
    pub candidate_name: String,
    pub created_at: DateTime<Utc>,
    /// Number of audio turns processed so far
    pub turns: u64,
}

impl Session {
    pub fn new(session_id: Option<String>, candidate_name: Option<String>) -> Self {
        // Only an absent name is defaulted; an empty one is kept as sent
        let candidate_name = candidate_name.unwrap_or_else(|| DEFAULT_CANDIDATE_NAME.to_string());

        Self {
            session_id,
            candidate_name,
            created_at: Utc::now(),
            turns: 0,
        }
    }

    /// Context for the turn after the last counted one.
    pub fn next_turn(&self) -> TurnContext {
        TurnContext {
            session_id: self.session_id.clone(),
            candidate_name: self.candidate_name.clone(),
            turn: self.turns + 1,
        }
    }

    /// Seconds since `session_start`.
    pub fn age_seconds(&self) -> f64 {
        let age = Utc::now().signed_duration_since(self.created_at);
        age.num_milliseconds() as f64 / 1000.0
    }
}

/// Where a connection stands in the dialogue.
///
/// Derived from the registry rather than stored separately, so it can never
/// disagree with it.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    NotStarted,
    Active(Session),
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::NotStarted => "not_started",
            ConnectionState::Active(_) => "active",
        }
    }
}

/// What the speech and language services get to see about a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnContext {
    pub session_id: Option<String>,
    pub candidate_name: String,
    /// The turn being processed, starting at 1
    pub turn: u64,
}
