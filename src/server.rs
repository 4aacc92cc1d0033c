//! HTTP server assembly: shared data, middleware stack and routes.
//!
//! ## Routes:
//! - `GET {ws_path}`: WebSocket upgrade into an interview connection
//! - `GET /health`, `GET /api/v1/health`: liveness and summary counters
//! - `GET /api/v1/metrics`: request, connection and dialogue metrics
//! - `GET /api/v1/config`: effective configuration

use crate::dialogue::DialogueDriver;
use crate::services::InterviewServices;
use crate::state::AppState;
use crate::{handlers, health, middleware, websocket};

use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use tracing::info;

/// Build the server on an already bound listener. The returned `Server` does
/// nothing until it is awaited or spawned.
pub fn build_server(state: AppState, services: InterviewServices, listener: TcpListener) -> std::io::Result<Server> {
    let ws_path = state.get_config().server.ws_path;
    let driver = DialogueDriver::new(state.clone(), services);

    info!(address = ?listener.local_addr().ok(), ws_path = %ws_path, "Building HTTP server");

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::Data::new(driver.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware::new(&ws_path))
            .wrap(middleware::RequestLogging)
            .route(&ws_path, web::get().to(websocket::interview_websocket))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .listen(listener)?
    .run();

    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::services::scripted::INTERVIEW_PROMPTS;
    use actix_web::dev::ServerHandle;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::{self, Message};
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    struct TestServer {
        url: String,
        state: AppState,
        handle: ServerHandle,
    }

    fn instant_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.dialogue.transcription_delay_ms = 0;
        config.dialogue.response_delay_ms = 0;
        config
    }

    fn spawn_server(config: AppConfig) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let ws_path = config.server.ws_path.clone();

        let services = InterviewServices::scripted(&config.dialogue);
        let state = AppState::new(config);
        let server = build_server(state.clone(), services, listener).unwrap();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        TestServer {
            url: format!("ws://127.0.0.1:{}{}", port, ws_path),
            state,
            handle,
        }
    }

    async fn connect(server: &TestServer) -> Client {
        let (client, _) = connect_async(server.url.as_str()).await.unwrap();
        client
    }

    async fn send(client: &mut Client, message: Value) {
        client.send(Message::Text(message.to_string())).await.unwrap();
    }

    /// Next JSON frame from the server, skipping keep-alive pings.
    async fn next_json(client: &mut Client) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("connection closed")
                .unwrap();
            match frame {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    }

    /// Next JSON frame, or `None` once the server has been quiet for `idle`.
    async fn next_json_within(client: &mut Client, idle: Duration) -> Option<Value> {
        loop {
            let frame = tokio::time::timeout(idle, client.next()).await.ok()??.ok()?;
            match frame {
                Message::Text(text) => return serde_json::from_str(&text).ok(),
                Message::Ping(_) | Message::Pong(_) => continue,
                _ => return None,
            }
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[actix_web::test]
    async fn test_session_start_greets_candidate() {
        let server = spawn_server(instant_config());
        let mut client = connect(&server).await;

        send(&mut client, json!({"type": "session_start", "sessionId": "s-1", "candidateName": "Alex"})).await;
        let greeting = next_json(&mut client).await;

        assert_eq!(greeting["type"], "audio");
        assert!(greeting["text"].as_str().unwrap().starts_with("Hello Alex!"));
        assert!(greeting["data"].is_null());
        assert_eq!(server.state.sessions.len(), 1);

        server.handle.stop(false).await;
    }

    #[actix_web::test]
    async fn test_audio_turns_follow_the_script() {
        let server = spawn_server(instant_config());
        let mut client = connect(&server).await;

        send(&mut client, json!({"type": "session_start", "sessionId": "s-1", "candidateName": "Alex"})).await;
        next_json(&mut client).await;

        for turn in 1..=3u64 {
            send(&mut client, json!({"type": "audio", "sessionId": "s-1", "data": "AAAA"})).await;

            let transcription = next_json(&mut client).await;
            assert_eq!(transcription["type"], "transcription");
            assert!(transcription["text"]
                .as_str()
                .unwrap()
                .starts_with(&format!("[Transcription {}]", turn)));

            let reply = next_json(&mut client).await;
            assert_eq!(reply["type"], "audio");
            assert_eq!(reply["text"], INTERVIEW_PROMPTS[(turn - 1) as usize]);
            assert!(reply["data"].is_null());
        }

        assert_eq!(server.state.sessions.total_turns(), 3);
        server.handle.stop(false).await;
    }

    #[actix_web::test]
    async fn test_malformed_and_premature_frames() {
        let server = spawn_server(instant_config());
        let mut client = connect(&server).await;

        client.send(Message::Text("{not json".to_string())).await.unwrap();
        let error = next_json(&mut client).await;
        assert_eq!(error, json!({"type": "error", "message": "Invalid JSON format"}));

        // Dropped silently: the greeting is the very next frame
        send(&mut client, json!({"type": "audio", "data": "AAAA"})).await;
        send(&mut client, json!({"type": "heartbeat"})).await;
        send(&mut client, json!({"type": "session_start", "candidateName": "Sam"})).await;

        let greeting = next_json(&mut client).await;
        assert_eq!(greeting["type"], "audio");
        assert!(greeting["text"].as_str().unwrap().starts_with("Hello Sam!"));

        let dialogue = server.state.get_metrics_snapshot().dialogue;
        assert_eq!(dialogue.malformed_messages, 1);
        assert_eq!(dialogue.turns_dropped, 1);
        assert_eq!(dialogue.unknown_messages, 1);

        server.handle.stop(false).await;
    }

    #[actix_web::test]
    async fn test_large_audio_frame_is_processed() {
        let server = spawn_server(instant_config());
        let mut client = connect(&server).await;

        send(&mut client, json!({"type": "session_start", "candidateName": "Alex"})).await;
        next_json(&mut client).await;

        // Roughly 40 seconds of compressed speech, well above 64 KiB
        let recording = "A".repeat(200_000);
        send(&mut client, json!({"type": "audio", "data": recording})).await;

        let transcription = next_json(&mut client).await;
        assert_eq!(transcription["type"], "transcription");
        let reply = next_json(&mut client).await;
        assert_eq!(reply["text"], INTERVIEW_PROMPTS[0]);
        assert_eq!(server.state.sessions.total_turns(), 1);

        server.handle.stop(false).await;
    }

    #[actix_web::test]
    async fn test_frame_over_limit_closes_connection() {
        let mut config = instant_config();
        config.server.max_frame_bytes = 1024;
        let server = spawn_server(config);
        let mut client = connect(&server).await;

        send(&mut client, json!({"type": "session_start", "candidateName": "Alex"})).await;
        next_json(&mut client).await;

        send(&mut client, json!({"type": "audio", "data": "A".repeat(4096)})).await;

        let state = server.state.clone();
        wait_until(|| state.sessions.is_empty() && state.get_metrics_snapshot().open_connections == 0).await;
        assert_eq!(server.state.sessions.total_turns(), 0);

        server.handle.stop(false).await;
    }

    #[actix_web::test]
    async fn test_full_inbox_rejects_frames_and_keeps_connection() {
        let mut config = instant_config();
        config.dialogue.transcription_delay_ms = 200;
        config.dialogue.response_delay_ms = 200;
        config.performance.max_queued_frames = 1;
        let server = spawn_server(config);
        let mut client = connect(&server).await;

        send(&mut client, json!({"type": "session_start", "candidateName": "Alex"})).await;
        next_json(&mut client).await;

        for _ in 0..5 {
            send(&mut client, json!({"type": "audio", "data": "AAAA"})).await;
        }

        let mut rejected = 0;
        let mut transcriptions = 0;
        while let Some(frame) = next_json_within(&mut client, Duration::from_secs(2)).await {
            match frame["type"].as_str() {
                Some("error") => {
                    assert_eq!(frame["message"], crate::protocol::QUEUE_FULL_MESSAGE);
                    rejected += 1;
                }
                Some("transcription") => transcriptions += 1,
                _ => {}
            }
        }

        // One turn in progress plus one queued; everything else bounced
        assert!(rejected >= 3, "rejected {}", rejected);
        assert_eq!(rejected + transcriptions, 5);
        assert_eq!(server.state.get_metrics_snapshot().dialogue.frames_rejected, rejected as u64);

        // Still usable afterwards
        send(&mut client, json!({"type": "audio", "data": "AAAA"})).await;
        assert_eq!(next_json(&mut client).await["type"], "transcription");
        assert_eq!(server.state.sessions.len(), 1);

        server.handle.stop(false).await;
    }

    #[actix_web::test]
    async fn test_closing_removes_session() {
        let server = spawn_server(instant_config());
        let mut client = connect(&server).await;

        send(&mut client, json!({"type": "session_start", "candidateName": "Alex"})).await;
        next_json(&mut client).await;
        assert_eq!(server.state.sessions.len(), 1);

        client.close(None).await.unwrap();

        let state = server.state.clone();
        wait_until(|| state.sessions.is_empty() && state.get_metrics_snapshot().open_connections == 0).await;

        server.handle.stop(false).await;
    }

    #[actix_web::test]
    async fn test_rejects_connections_over_capacity() {
        let mut config = instant_config();
        config.performance.max_connections = 1;
        let server = spawn_server(config);

        let _first = connect(&server).await;
        match connect_async(server.url.as_str()).await {
            Err(tungstenite::Error::Http(response)) => assert_eq!(response.status().as_u16(), 503),
            other => panic!("expected an HTTP 503, got {:?}", other.map(|_| ())),
        }

        server.handle.stop(false).await;
    }
}
