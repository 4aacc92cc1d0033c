//! # Wire Protocol
//!
//! JSON text frames exchanged with the interview client. Every frame carries a
//! `type` discriminator; field names are camelCase on the wire.
//!
//! ## Client → Server:
//! - `session_start` `{sessionId?, candidateName?}`
//! - `audio` `{sessionId?, data?}` where `data` is base64-encoded audio
//!
//! ## Server → Client:
//! - `audio` `{text, data}` where `data` is base64 audio or `null`
//! - `transcription` `{text}`
//! - `error` `{message}`
//!
//! Parsing is two-step on purpose. A frame that is not a JSON object is
//! malformed and earns an `error` reply; an object with a `type` nobody knows
//! is merely logged.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Text of the `error` frame sent for malformed input.
pub const MALFORMED_MESSAGE: &str = "Invalid JSON format";

/// Text of the `error` frame sent for audio before `session_start`, when
/// rejection is enabled.
pub const NO_SESSION_MESSAGE: &str = "No active session. Send session_start first.";

/// Text of the `error` frame sent when a connection has too many frames
/// waiting to be processed.
pub const QUEUE_FULL_MESSAGE: &str = "Too many pending messages. Wait for the current turn to finish.";

/// Encoded audio carried inside a JSON frame.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioPayload(String);

impl AudioPayload {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Length of the encoded text.
    pub fn encoded_len(&self) -> usize {
        self.0.len()
    }

    /// Size of the audio once decoded, `None` if the text is not valid base64.
    pub fn decoded_len(&self) -> Option<usize> {
        base64::engine::general_purpose::STANDARD
            .decode(self.0.as_bytes())
            .ok()
            .map(|bytes| bytes.len())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStart {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub candidate_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTurn {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub data: Option<AudioPayload>,
}

/// A frame received from the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    SessionStart(SessionStart),
    Audio(AudioTurn),
    /// A JSON object whose `type` is missing or unrecognised
    Unknown(Option<String>),
}

/// A frame sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Something the interviewer says; `data` holds synthesized speech when available
    Audio { text: String, data: Option<AudioPayload> },
    /// What the candidate said in their last turn
    Transcription { text: String },
    Error { message: String },
}

impl ServerMessage {
    pub fn spoken(text: impl Into<String>, data: Option<AudioPayload>) -> Self {
        ServerMessage::Audio { text: text.into(), data }
    }

    pub fn transcription(text: impl Into<String>) -> Self {
        ServerMessage::Transcription { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: message.into() }
    }

    pub fn malformed() -> Self {
        Self::error(MALFORMED_MESSAGE)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Audio { .. } => "audio",
            ServerMessage::Transcription { .. } => "transcription",
            ServerMessage::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("message is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("invalid fields for '{kind}' message: {source}")]
    InvalidFields {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
        if !value.is_object() {
            return Err(ProtocolError::NotAnObject);
        }

        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("session_start") => serde_json::from_value(value)
                .map(ClientMessage::SessionStart)
                .map_err(|source| ProtocolError::InvalidFields { kind: "session_start", source }),
            Some("audio") => serde_json::from_value(value)
                .map(ClientMessage::Audio)
                .map_err(|source| ProtocolError::InvalidFields { kind: "audio", source }),
            _ => Ok(ClientMessage::Unknown(kind)),
        }
    }
}
