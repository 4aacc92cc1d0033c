//! # Interview Relay - Application Entry Point
//!
//! Thin binary around the `interview_relay` library: it reads configuration,
//! sets up logging, binds the listener and runs the server until a shutdown
//! signal arrives.
//!
//! ## Key Rust Concepts Used:
//! - **`#[actix_web::main]`**: starts the actix system (a Tokio runtime) and runs `main` on it
//! - **`anyhow::Result`**: any startup failure bubbles up with `?` and ends the process with context
//! - **`tokio::select!`**: races the server future against the shutdown signal
//!
//! ## Startup order:
//! 1. `.env` file (optional), then tracing
//! 2. Configuration: load, then validate, refusing to start on bad settings
//! 3. Bind the TCP listener, so a busy port fails before anything else runs
//! 4. Build the server with the scripted interviewer and run it

use anyhow::{Context, Result};
use interview_relay::config::AppConfig;
use interview_relay::server;
use interview_relay::services::InterviewServices;
use interview_relay::state::AppState;
use std::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing();

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting interview-relay v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        ws_path = %config.server.ws_path,
        transcription_delay_ms = config.dialogue.transcription_delay_ms,
        response_delay_ms = config.dialogue.response_delay_ms,
        max_connections = config.performance.max_connections,
        "Configuration loaded"
    );

    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr).with_context(|| format!("Failed to bind {}", bind_addr))?;

    let services = InterviewServices::scripted(&config.dialogue);
    let app_state = AppState::new(config);

    info!("Listening on ws://{}", bind_addr);

    let server = server::build_server(app_state, services, listener)?;
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// `RUST_LOG` wins when set; otherwise debug output for this crate and info
/// for actix.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interview_relay=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on the first SIGINT (Ctrl+C) or SIGTERM.
///
/// If a handler cannot be installed, that signal is simply not waited for.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT"),
            Err(e) => {
                warn!("Failed to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
