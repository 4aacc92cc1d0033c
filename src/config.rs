//! # Configuration Management
//!
//! Loads the relay's settings from several layered sources:
//! - Built-in defaults (the `Default` impl below)
//! - An optional `config.toml` next to the binary
//! - Environment variables with the `INTERVIEW__` prefix
//! - The bare `HOST` / `PORT` variables most deployment platforms set
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT`
//! 2. Environment variables (`INTERVIEW__SERVER__PORT`, `INTERVIEW__DIALOGUE__RESPONSE_DELAY_MS`, ...)
//! 3. Configuration file (`config.toml`)
//! 4. Default values
//!
//! A double underscore separates sections from keys because several keys
//! themselves contain underscores.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use crate::services::scripted::INTERVIEW_PROMPTS;
use std::env;
use std::time::Duration;

/// Hard ceiling for `server.max_frame_bytes`: 16 MiB.
pub const MAX_FRAME_BYTES_LIMIT: usize = 16 * 1024 * 1024;

/// Top-level relay configuration, one struct per concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub dialogue: DialogueConfig,
    pub heartbeat: HeartbeatConfig,
    pub performance: PerformanceConfig,
}

/// Where the relay listens.
///
/// ## Fields:
/// - `host`: interface to bind (`127.0.0.1` for local development, `0.0.0.0` in containers)
/// - `port`: TCP port, the interview client expects 8000 by default
/// - `ws_path`: path the WebSocket upgrade is served under
/// - `max_frame_bytes`: largest WebSocket frame accepted. A whole recorded
///   answer arrives as one base64 text frame, so this is well above actix's
///   64 KiB default
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub ws_path: String,
    pub max_frame_bytes: usize,
}

/// Behaviour of the scripted interviewer.
///
/// The two delays stand in for speech recognition and response generation
/// latency. Setting both to zero gives an instant, deterministic interviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Pause before the transcription of a turn is sent back
    pub transcription_delay_ms: u64,
    /// Pause before the interviewer's reply is sent back
    pub response_delay_ms: u64,
    /// Answer audio that arrives before `session_start` with an error frame
    /// instead of dropping it silently
    pub reject_audio_without_session: bool,
    /// Interviewer questions, asked in order; the last one repeats once the
    /// list runs out. Set as an array in `config.toml`
    pub prompts: Vec<String>,
}

/// WebSocket keep-alive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// How often the server pings each client
    pub interval_secs: u64,
    /// How long a client may stay silent before it is disconnected
    pub client_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Upper bound on simultaneously open interview connections
    pub max_connections: usize,
    /// Frames a connection may have waiting behind the turn in progress.
    /// Anything beyond is answered with an `error` frame and discarded
    pub max_queued_frames: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                ws_path: "/ws".to_string(),
                max_frame_bytes: 1024 * 1024,
            },
            dialogue: DialogueConfig {
                transcription_delay_ms: 500,
                response_delay_ms: 1500,
                reject_audio_without_session: false,
                prompts: INTERVIEW_PROMPTS.iter().map(|prompt| prompt.to_string()).collect(),
            },
            heartbeat: HeartbeatConfig {
                interval_secs: 5,
                client_timeout_secs: 30,
            },
            performance: PerformanceConfig {
                max_connections: 100,
                max_queued_frames: 8,
            },
        }
    }
}

impl DialogueConfig {
    pub fn transcription_delay(&self) -> Duration {
        Duration::from_millis(self.transcription_delay_ms)
    }

    pub fn response_delay(&self) -> Duration {
        Duration::from_millis(self.response_delay_ms)
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from every source in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `INTERVIEW__SERVER__HOST=0.0.0.0`
    /// - `INTERVIEW__DIALOGUE__TRANSCRIPTION_DELAY_MS=0`
    /// - `INTERVIEW__DIALOGUE__REJECT_AUDIO_WITHOUT_SESSION=true`
    /// - `PORT=3000`
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("INTERVIEW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if !self.server.ws_path.starts_with('/') {
            return Err(anyhow::anyhow!(
                "WebSocket path must start with '/', got {:?}",
                self.server.ws_path
            ));
        }

        if self.server.max_frame_bytes == 0 || self.server.max_frame_bytes > MAX_FRAME_BYTES_LIMIT {
            return Err(anyhow::anyhow!(
                "Max frame size must be between 1 and {} bytes, got {}",
                MAX_FRAME_BYTES_LIMIT,
                self.server.max_frame_bytes
            ));
        }

        if self.dialogue.prompts.is_empty() {
            return Err(anyhow::anyhow!("The interviewer needs at least one prompt"));
        }

        if self.heartbeat.interval_secs == 0 || self.heartbeat.client_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Heartbeat interval and client timeout must be greater than 0"));
        }

        if self.heartbeat.client_timeout_secs <= self.heartbeat.interval_secs {
            return Err(anyhow::anyhow!(
                "Client timeout ({}s) must be longer than the heartbeat interval ({}s)",
                self.heartbeat.client_timeout_secs,
                self.heartbeat.interval_secs
            ));
        }

        if self.performance.max_connections == 0 {
            return Err(anyhow::anyhow!("Max connections must be greater than 0"));
        }

        if self.performance.max_queued_frames == 0 {
            return Err(anyhow::anyhow!("Max queued frames must be greater than 0"));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
