//! # Interview Services
//!
//! The three collaborators a real interviewer needs, each behind its own trait:
//! - **SpeechToText**: candidate audio → transcript
//! - **ResponseGenerator**: conversation so far → interviewer's next line
//! - **TextToSpeech**: interviewer's line → spoken audio (optional)
//!
//! The dialogue driver only ever sees these traits. The scripted
//! implementations in `scripted.rs` fake the first two with canned text and a
//! configurable delay; swapping in network clients does not touch the driver.
//!
//! A failing service costs one turn, never the connection.

pub mod scripted;

pub use scripted::{ScriptedInterviewer, ScriptedTranscriber};

use crate::protocol::AudioPayload;
use crate::session::TurnContext;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("response generation failed: {0}")]
    Generation(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe one turn of candidate audio. `audio` is `None` when the
    /// client sent an audio frame without a payload.
    async fn transcribe(&self, turn: &TurnContext, audio: Option<&AudioPayload>) -> ServiceResult<String>;
}

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Produce the interviewer's reply to the transcribed turn.
    async fn respond(&self, turn: &TurnContext, transcript: &str) -> ServiceResult<String>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str) -> ServiceResult<AudioPayload>;
}

/// The set of collaborators one relay instance works with.
#[derive(Clone)]
pub struct InterviewServices {
    pub speech_to_text: Arc<dyn SpeechToText>,
    pub responder: Arc<dyn ResponseGenerator>,
    /// Without a synthesizer every reply goes out as text only
    pub text_to_speech: Option<Arc<dyn TextToSpeech>>,
}

impl InterviewServices {
    pub fn new(speech_to_text: Arc<dyn SpeechToText>, responder: Arc<dyn ResponseGenerator>) -> Self {
        Self {
            speech_to_text,
            responder,
            text_to_speech: None,
        }
    }

    pub fn with_text_to_speech(mut self, text_to_speech: Arc<dyn TextToSpeech>) -> Self {
        self.text_to_speech = Some(text_to_speech);
        self
    }

    /// Scripted interviewer with the delays and prompts from the dialogue
    /// configuration.
    pub fn scripted(config: &crate::config::DialogueConfig) -> Self {
        Self::new(
            Arc::new(ScriptedTranscriber::new(config.transcription_delay())),
            Arc::new(ScriptedInterviewer::with_prompts(
                config.response_delay(),
                config.prompts.clone(),
            )),
        )
    }
}

impl std::fmt::Debug for InterviewServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterviewServices")
            .field("text_to_speech", &self.text_to_speech.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DialogueConfig};

    fn turn(n: u64) -> TurnContext {
        TurnContext {
            session_id: None,
            candidate_name: "Alex".to_string(),
            turn: n,
        }
    }

    #[tokio::test]
    async fn test_scripted_services_use_configured_prompts() {
        let config = DialogueConfig {
            transcription_delay_ms: 0,
            response_delay_ms: 0,
            prompts: vec!["First question?".to_string(), "Last question?".to_string()],
            ..AppConfig::default().dialogue
        };
        let services = InterviewServices::scripted(&config);

        assert_eq!(services.responder.respond(&turn(1), "").await.unwrap(), "First question?");
        assert_eq!(services.responder.respond(&turn(2), "").await.unwrap(), "Last question?");
        assert_eq!(services.responder.respond(&turn(9), "").await.unwrap(), "Last question?");
        assert!(services.text_to_speech.is_none());
    }
}
