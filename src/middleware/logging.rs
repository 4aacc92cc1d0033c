//! # Request Logging
//!
//! Every HTTP request gets an `http_request` span carrying the method, path
//! and client address, so whatever a handler logs while serving it is tagged
//! with the same fields. The span closes with one summary event.
//!
//! ## Key Rust Concepts Used:
//! - **`Transform` / `Service`**: actix's two-step middleware: the transform
//!   wraps the next service once per worker, the service runs per request
//! - **`Instrument`**: attaches the span to the response future so it is
//!   entered every time that future is polled, across `.await` points
//!
//! WebSocket upgrades are logged differently: the request "completes" as soon
//! as the handshake is answered, while the connection itself lives on in its
//! actor (see `websocket.rs`).

use super::is_websocket_upgrade;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};
use tracing::{error, info, info_span, warn, Instrument};

pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware { service }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let upgrade = is_websocket_upgrade(&req);
        let span = info_span!(
            "http_request",
            method = %req.method(),
            path = %req.path(),
            remote_addr = %req.connection_info().realip_remote_addr().unwrap_or("unknown"),
            websocket = upgrade,
        );

        let start_time = Instant::now();
        let fut = span.in_scope(|| self.service.call(req));

        Box::pin(
            async move {
                let result = fut.await;
                let duration_ms = start_time.elapsed().as_millis() as u64;

                match &result {
                    Ok(response) => log_response(response.status(), upgrade, duration_ms),
                    Err(err) => error!(duration_ms, error = %err, "Request failed"),
                }

                result
            }
            .instrument(span),
        )
    }
}

fn log_response(status: StatusCode, upgrade: bool, duration_ms: u64) {
    let status_code = status.as_u16();
    if upgrade && status == StatusCode::SWITCHING_PROTOCOLS {
        info!(duration_ms, "WebSocket handshake accepted");
    } else if upgrade {
        warn!(status = status_code, duration_ms, "WebSocket handshake refused");
    } else if status.is_server_error() {
        error!(status = status_code, duration_ms, "Request completed with server error");
    } else {
        info!(status = status_code, duration_ms, "Request completed");
    }
}
