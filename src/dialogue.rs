//! # Dialogue Driver
//!
//! Turns inbound frames into outbound frames for one connection at a time.
//! The driver knows nothing about WebSockets: replies go to an [`Outbox`],
//! which the connection actor implements by writing text frames and the tests
//! implement by collecting messages.
//!
//! ## Per-connection flow:
//! ```text
//! NotStarted --session_start--> Active --audio--> Active (turns + 1)
//!     |                            |
//!     +--audio: dropped, warn      +--session_start: restart, turns = 0
//! ```
//!
//! ## One audio turn:
//! 1. Snapshot the session from the registry (`turns + 1`), lock released
//! 2. Speech-to-text, then send `transcription`
//! 3. Response generation (+ optional speech synthesis)
//! 4. Count the turn, then send the interviewer's `audio` reply
//!
//! A service failure abandons the rest of the turn without counting it.

use crate::protocol::{AudioPayload, AudioTurn, ClientMessage, ServerMessage, SessionStart, NO_SESSION_MESSAGE};
use crate::services::scripted::greeting;
use crate::services::InterviewServices;
use crate::session::{ConnectionId, ConnectionState, Session};
use crate::state::AppState;
use tracing::{debug, info, warn};

/// Where the driver sends replies for a connection.
pub trait Outbox {
    fn deliver(&self, message: ServerMessage);
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueOutcome {
    SessionStarted,
    /// Audio turn fully processed; carries the new turn total
    TurnCompleted(u64),
    /// Audio arrived before `session_start`
    TurnDropped,
    /// A service failed part-way through the turn
    TurnFailed,
    /// The session vanished (connection closing) while the turn was in flight
    TurnAbandoned,
    Malformed,
    /// Unknown or missing `type`
    Ignored,
}

#[derive(Debug, Clone)]
pub struct DialogueDriver {
    state: AppState,
    services: InterviewServices,
}

impl DialogueDriver {
    pub fn new(state: AppState, services: InterviewServices) -> Self {
        Self { state, services }
    }

    /// Handle one text frame from `connection`, delivering every reply before
    /// returning. Callers must not run two of these concurrently for the same
    /// connection; the actor's inbox queue guarantees that.
    pub async fn handle_text<O: Outbox + ?Sized>(
        &self,
        connection: &ConnectionId,
        text: &str,
        outbox: &O,
    ) -> DialogueOutcome {
        let outcome = match ClientMessage::parse(text) {
            Ok(ClientMessage::SessionStart(start)) => self.start_session(connection, start, outbox).await,
            Ok(ClientMessage::Audio(turn)) => self.process_turn(connection, turn, outbox).await,
            Ok(ClientMessage::Unknown(kind)) => {
                warn!(connection = %connection, kind = ?kind, "Unknown message type");
                DialogueOutcome::Ignored
            }
            Err(err) => {
                warn!(connection = %connection, error = %err, "Malformed message");
                outbox.deliver(ServerMessage::malformed());
                DialogueOutcome::Malformed
            }
        };

        self.state.record_outcome(&outcome);
        outcome
    }

    async fn start_session<O: Outbox + ?Sized>(
        &self,
        connection: &ConnectionId,
        start: SessionStart,
        outbox: &O,
    ) -> DialogueOutcome {
        let session = Session::new(start.session_id, start.candidate_name);
        let candidate_name = session.candidate_name.clone();

        info!(
            connection = %connection,
            session_id = ?session.session_id,
            candidate = %candidate_name,
            "Session started"
        );

        if let Some(previous) = self.state.sessions.put(connection.clone(), session) {
            info!(
                connection = %connection,
                previous_session_id = ?previous.session_id,
                previous_turns = previous.turns,
                "Session restarted, turn count reset"
            );
        }

        let text = greeting(&candidate_name);
        let data = self.synthesize(&text).await;
        outbox.deliver(ServerMessage::spoken(text, data));

        DialogueOutcome::SessionStarted
    }

    async fn process_turn<O: Outbox + ?Sized>(
        &self,
        connection: &ConnectionId,
        audio: AudioTurn,
        outbox: &O,
    ) -> DialogueOutcome {
        let turn = match self.state.sessions.state(connection) {
            ConnectionState::NotStarted => {
                warn!(connection = %connection, "No session found for audio, dropping it");
                if self.state.get_config().dialogue.reject_audio_without_session {
                    outbox.deliver(ServerMessage::error(NO_SESSION_MESSAGE));
                }
                return DialogueOutcome::TurnDropped;
            }
            ConnectionState::Active(session) => {
                if audio.session_id.is_some() && audio.session_id != session.session_id {
                    debug!(
                        connection = %connection,
                        frame_session_id = ?audio.session_id,
                        active_session_id = ?session.session_id,
                        "Audio frame names a different session id, using the connection's session"
                    );
                }
                session.next_turn()
            }
        };

        info!(
            connection = %connection,
            candidate = %turn.candidate_name,
            turn = turn.turn,
            audio_chars = audio.data.as_ref().map_or(0, AudioPayload::encoded_len),
            "Received audio"
        );

        let transcript = match self
            .services
            .speech_to_text
            .transcribe(&turn, audio.data.as_ref())
            .await
        {
            Ok(transcript) => transcript,
            Err(err) => {
                warn!(connection = %connection, turn = turn.turn, error = %err, "Turn abandoned");
                return DialogueOutcome::TurnFailed;
            }
        };
        outbox.deliver(ServerMessage::transcription(transcript.clone()));

        let reply = match self.services.responder.respond(&turn, &transcript).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(connection = %connection, turn = turn.turn, error = %err, "Turn abandoned");
                return DialogueOutcome::TurnFailed;
            }
        };
        let data = self.synthesize(&reply).await;

        match self.state.sessions.complete_turn(connection) {
            Some(total) => {
                outbox.deliver(ServerMessage::spoken(reply, data));
                info!(connection = %connection, candidate = %turn.candidate_name, turn = total, "Sent interviewer response");
                DialogueOutcome::TurnCompleted(total)
            }
            None => {
                debug!(connection = %connection, turn = turn.turn, "Session ended mid-turn");
                DialogueOutcome::TurnAbandoned
            }
        }
    }

    /// Speech for an interviewer line, or `None` for a text-only reply.
    async fn synthesize(&self, text: &str) -> Option<AudioPayload> {
        let tts = self.services.text_to_speech.as_ref()?;
        match tts.synthesize(text).await {
            Ok(audio) => Some(audio),
            Err(err) => {
                warn!(error = %err, "Speech synthesis failed, sending text only");
                None
            }
        }
    }
}
