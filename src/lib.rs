//! # Interview Relay
//!
//! A WebSocket relay for voice interviews: a client opens a session, streams
//! audio turns, and gets back a transcription and the interviewer's next
//! question for each turn.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, `config.toml`, environment)
//! - **state**: shared state, metrics and the session registry
//! - **session**: per-connection interview sessions and their registry
//! - **protocol**: the JSON messages exchanged over the WebSocket
//! - **services**: speech-to-text, response and speech synthesis seams
//! - **dialogue**: the per-connection conversation flow
//! - **websocket**: one actor per client connection
//! - **health**, **handlers**: operational HTTP endpoints
//! - **middleware**: request logging and metrics
//! - **server**: routes and middleware assembled into an `HttpServer`
//!
//! ## Plugging in real speech services:
//! Implement `SpeechToText`, `ResponseGenerator` and optionally `TextToSpeech`
//! from `services`, bundle them with `InterviewServices::new(..)
//! .with_text_to_speech(..)` and hand the bundle to `server::build_server`.

pub mod config;
pub mod dialogue;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod protocol;
pub mod server;
pub mod services;
pub mod session;
pub mod state;
pub mod websocket;
