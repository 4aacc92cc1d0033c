//! # Interview WebSocket Handler
//!
//! One actor per client connection. Clients connect to the configured path
//! (`/ws` by default) and exchange JSON text frames, see `protocol.rs`.
//!
//! ## Connection lifecycle:
//! 1. **Upgrade**: a connection slot is claimed and handed to the actor
//! 2. **Dialogue**: text frames are queued and handed one by one to the
//!    `DialogueDriver`; its replies come back to the actor as `Outbound` messages
//! 3. **Keep-alive**: the server pings periodically and drops silent clients
//! 4. **Teardown**: the session is removed from the registry, the slot is
//!    released with the actor; any turn still in flight is dropped with it
//!
//! ## Key Rust Concepts Used:
//! - **Actors**: each connection is an `actix::Actor`; its state is only ever
//!   touched from its own context, so it needs no locks
//! - **`StreamHandler`**: incoming frames arrive as a stream of
//!   `Result<ws::Message, ws::ProtocolError>`
//! - **`into_actor`**: turns the dialogue worker into a future owned by the
//!   actor's context, so it is dropped together with the actor
//!
//! ## Ordering and backpressure:
//! A single worker future drains the inbox, so frames are processed and
//! answered strictly in the order they arrived. The inbox is bounded by
//! `performance.max_queued_frames`: a frame that finds it full is answered
//! with an `error` frame and discarded, the connection stays open.
//!
//! ## Frame size:
//! Recorded answers arrive as one base64 text frame, so the upgrade raises
//! actix's 64 KiB frame limit to `server.max_frame_bytes`. Frames above that
//! are a protocol error and end the connection.

use crate::config::HeartbeatConfig;
use crate::dialogue::{DialogueDriver, Outbox};
use crate::error::{AppError, AppResult};
use crate::protocol::{ServerMessage, QUEUE_FULL_MESSAGE};
use crate::session::{ConnectionId, ConnectionState};
use crate::state::{AppState, ConnectionSlot};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

/// A reply from the dialogue driver, to be written as a text frame.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Outbound(pub ServerMessage);

impl Outbox for Recipient<Outbound> {
    fn deliver(&self, message: ServerMessage) {
        // A stopped actor silently discards the reply
        self.do_send(Outbound(message));
    }
}

pub struct InterviewWebSocket {
    connection: ConnectionId,
    state: AppState,
    driver: DialogueDriver,
    heartbeat: HeartbeatConfig,
    max_queued_frames: usize,
    /// Frames waiting for the dialogue worker; `None` until the actor starts
    inbox: Option<mpsc::Sender<String>>,
    last_heartbeat: Instant,
    /// Released when the actor is dropped, whether or not it ever started
    _slot: ConnectionSlot,
}

impl InterviewWebSocket {
    pub fn new(connection: ConnectionId, state: AppState, driver: DialogueDriver, slot: ConnectionSlot) -> Self {
        let config = state.get_config();
        Self {
            connection,
            state,
            driver,
            heartbeat: config.heartbeat,
            max_queued_frames: config.performance.max_queued_frames,
            inbox: None,
            last_heartbeat: Instant::now(),
            _slot: slot,
        }
    }

    /// Ping the client every interval; stop the actor once it has been quiet
    /// for longer than the client timeout.
    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.heartbeat.client_timeout();
        ctx.run_interval(self.heartbeat.interval(), move |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > timeout {
                warn!(connection = %act.connection, "Heartbeat timed out, disconnecting client");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Spawn the worker that feeds queued frames to the dialogue driver.
    ///
    /// The worker lives in the actor's context, so it is dropped (mid-turn if
    /// need be) as soon as the actor stops.
    fn start_dialogue(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let (tx, mut rx) = mpsc::channel::<String>(self.max_queued_frames);
        self.inbox = Some(tx);

        let driver = self.driver.clone();
        let connection = self.connection.clone();
        let outbox: Recipient<Outbound> = ctx.address().recipient();

        ctx.spawn(
            async move {
                while let Some(text) = rx.recv().await {
                    let outcome = driver.handle_text(&connection, &text, &outbox).await;
                    debug!(connection = %connection, outcome = ?outcome, "Frame handled");
                }
            }
            .into_actor(self),
        );
    }

    fn enqueue(&mut self, text: String, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(inbox) = &self.inbox else {
            error!(connection = %self.connection, "Dialogue worker is not running, closing connection");
            ctx.stop();
            return;
        };

        match inbox.try_send(text) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!(
                    connection = %self.connection,
                    max_queued_frames = self.max_queued_frames,
                    bytes = dropped.len(),
                    "Inbox full, rejecting frame"
                );
                self.state.record_rejected_frame();
                self.send(ServerMessage::error(QUEUE_FULL_MESSAGE), ctx);
            }
            Err(TrySendError::Closed(_)) => {
                error!(connection = %self.connection, "Dialogue worker is gone, closing connection");
                ctx.stop();
            }
        }
    }

    fn send(&self, message: ServerMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let kind = message.kind();
        match message.to_json() {
            Ok(json) => {
                debug!(connection = %self.connection, kind, "Sending message");
                ctx.text(json);
            }
            Err(err) => {
                error!(connection = %self.connection, kind, error = %err, "Failed to serialize outbound message");
            }
        }
    }
}

impl Actor for InterviewWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(connection = %self.connection, "Client connected");
        self.start_heartbeat(ctx);
        self.start_dialogue(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.inbox = None;

        let dialogue = self.state.sessions.state(&self.connection);
        if let ConnectionState::Active(session) = &dialogue {
            info!(
                connection = %self.connection,
                candidate = %session.candidate_name,
                turns = session.turns,
                duration_secs = session.age_seconds(),
                "Interview session ended"
            );
        }
        self.state.sessions.remove(&self.connection);

        info!(connection = %self.connection, state = dialogue.as_str(), "Client disconnected");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for InterviewWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.enqueue(text.to_string(), ctx);
            }
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                warn!(connection = %self.connection, bytes = data.len(), "Binary frames are not supported, ignoring");
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(connection = %self.connection, reason = ?reason, "Client closed the connection");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(connection = %self.connection, "Unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(connection = %self.connection, error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

impl Handler<Outbound> for InterviewWebSocket {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        self.send(msg.0, ctx);
    }
}

/// WebSocket endpoint: claims a connection slot and upgrades the request.
pub async fn interview_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    driver: web::Data<DialogueDriver>,
) -> AppResult<HttpResponse> {
    let connection = ConnectionId::from_peer(req.peer_addr());
    let config = state.get_config();
    let max_connections = config.performance.max_connections;

    let Some(slot) = state.try_claim_connection(max_connections) else {
        warn!(connection = %connection, max_connections, "Rejecting connection, server is full");
        return Err(AppError::CapacityExceeded(format!(
            "Maximum concurrent connections ({}) reached",
            max_connections
        )));
    };

    debug!(connection = %connection, "Upgrading to WebSocket");
    let actor = InterviewWebSocket::new(
        connection,
        state.get_ref().clone(),
        driver.get_ref().clone(),
        slot,
    );

    Ok(ws::WsResponseBuilder::new(actor, &req, stream)
        .frame_size(config.server.max_frame_bytes)
        .start()?)
}
