//! # Error Handling
//!
//! HTTP-facing error type for the relay. WebSocket traffic never produces an
//! `AppError`: protocol problems are answered in-band (see `protocol.rs`) and
//! collaborator failures stay inside the turn that caused them (see
//! `services/mod.rs`). What is left are failures of the upgrade request itself
//! and of the small JSON endpoints.
//!
//! ## JSON Response Format:
//! ```json
//! {
//!   "error": {
//!     "type": "capacity_exceeded",
//!     "message": "Maximum concurrent connections (100) reached",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The upgrade request was not a valid WebSocket handshake
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Every connection slot is taken
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),
}

impl AppError {
    /// Machine-readable tag used in the JSON body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::CapacityExceeded(_) => "capacity_exceeded",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::BadRequest(msg) | AppError::CapacityExceeded(msg) => msg,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::CapacityExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.kind(),
                "message": self.message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// A failed WebSocket handshake is the client's fault: wrong method, missing
/// upgrade headers, unsupported protocol version.
impl From<actix_web::Error> for AppError {
    fn from(err: actix_web::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
