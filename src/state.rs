//! # Application State
//!
//! Everything the HTTP handlers and the per-connection actors share:
//! configuration, request metrics, dialogue counters and the session registry.
//!
//! ## Thread Safety Pattern:
//! - `Arc<RwLock<T>>` for data that changes while the server runs
//! - `SessionRegistry` carries its own lock (see `session/registry.rs`)
//! - `start_time` never changes, so it is stored directly
//!
//! `AppState` is cheap to clone: every clone points at the same data.
//!
//! ## Key Rust Concepts Used:
//! - **Arc**: shared ownership; each actix worker and each connection actor
//!   holds a clone, and the data is freed when the last one goes away
//! - **RwLock**: many readers or one writer. Counters are bumped through
//!   `with_metrics`, so no caller ever holds a guard across an `.await`
//! - **Drop**: `ConnectionSlot` gives a connection slot back when the guard
//!   goes out of scope, whichever path the connection took to end

use crate::config::AppConfig;
use crate::dialogue::DialogueOutcome;
use crate::session::SessionRegistry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    /// Interview sessions keyed by connection identity
    pub sessions: SessionRegistry,
    pub start_time: Instant,
}

/// Counters collected since the server started.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed, WebSocket upgrades included
    pub request_count: u64,

    /// HTTP requests that ended in a 4xx/5xx
    pub error_count: u64,

    /// WebSocket connections currently open
    pub open_connections: u32,

    /// What the dialogue driver did with inbound frames
    pub dialogue: DialogueMetrics,

    /// Per-endpoint timings; key is e.g. "GET /health"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DialogueMetrics {
    pub sessions_started: u64,
    pub turns_completed: u64,
    /// Audio frames that arrived before `session_start`
    pub turns_dropped: u64,
    /// Turns abandoned because a service failed
    pub turns_failed: u64,
    pub malformed_messages: u64,
    pub unknown_messages: u64,
    /// Frames discarded because the connection's inbox was full
    pub frames_rejected: u64,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            sessions: SessionRegistry::new(),
            start_time: Instant::now(),
        }
    }

    /// Copy of the current configuration; the lock is released on return.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn with_metrics<R>(&self, update: impl FnOnce(&mut AppMetrics) -> R) -> R {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut metrics)
    }

    pub fn increment_request_count(&self) {
        self.with_metrics(|metrics| metrics.request_count += 1);
    }

    pub fn increment_error_count(&self) {
        self.with_metrics(|metrics| metrics.error_count += 1);
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        self.with_metrics(|metrics| {
            let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
            endpoint_metric.request_count += 1;
            endpoint_metric.total_duration_ms += duration_ms;
            if is_error {
                endpoint_metric.error_count += 1;
            }
        });
    }

    /// Claim one of `limit` connection slots. The slot is released when the
    /// returned guard is dropped; `None` means every slot is taken.
    pub fn try_claim_connection(&self, limit: usize) -> Option<ConnectionSlot> {
        let claimed = self.with_metrics(|metrics| {
            if metrics.open_connections as usize >= limit {
                return false;
            }
            metrics.open_connections += 1;
            true
        });
        claimed.then(|| ConnectionSlot { state: self.clone() })
    }

    fn release_connection(&self) {
        self.with_metrics(|metrics| {
            metrics.open_connections = metrics.open_connections.saturating_sub(1);
        });
    }

    pub fn record_outcome(&self, outcome: &DialogueOutcome) {
        self.with_metrics(|metrics| {
            let dialogue = &mut metrics.dialogue;
            match outcome {
                DialogueOutcome::SessionStarted => dialogue.sessions_started += 1,
                DialogueOutcome::TurnCompleted(_) => dialogue.turns_completed += 1,
                DialogueOutcome::TurnDropped => dialogue.turns_dropped += 1,
                DialogueOutcome::TurnFailed | DialogueOutcome::TurnAbandoned => dialogue.turns_failed += 1,
                DialogueOutcome::Malformed => dialogue.malformed_messages += 1,
                DialogueOutcome::Ignored => dialogue.unknown_messages += 1,
            }
        });
    }

    pub fn record_rejected_frame(&self) {
        self.with_metrics(|metrics| metrics.dialogue.frames_rejected += 1);
    }

    /// Consistent copy of all counters, taken under a single read lock.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// An open WebSocket connection, counted in `open_connections` for as long as
/// the guard lives.
#[derive(Debug)]
pub struct ConnectionSlot {
    state: AppState,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.state.release_connection();
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of failed requests, between 0.0 and 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_slots() {
        let state = AppState::new(AppConfig::default());
        let first = state.try_claim_connection(2).unwrap();
        let second = state.try_claim_connection(2).unwrap();
        assert!(state.try_claim_connection(2).is_none());
        assert_eq!(state.get_metrics_snapshot().open_connections, 2);

        drop(first);
        assert_eq!(state.get_metrics_snapshot().open_connections, 1);
        let third = state.try_claim_connection(2).unwrap();

        drop(second);
        drop(third);
        assert_eq!(state.get_metrics_snapshot().open_connections, 0);
    }

    #[test]
    fn test_record_outcome() {
        let state = AppState::new(AppConfig::default());
        state.record_outcome(&DialogueOutcome::SessionStarted);
        state.record_outcome(&DialogueOutcome::TurnCompleted(1));
        state.record_outcome(&DialogueOutcome::TurnCompleted(2));
        state.record_outcome(&DialogueOutcome::TurnDropped);
        state.record_outcome(&DialogueOutcome::Malformed);
        state.record_outcome(&DialogueOutcome::Ignored);

        let dialogue = state.get_metrics_snapshot().dialogue;
        assert_eq!(
            dialogue,
            DialogueMetrics {
                sessions_started: 1,
                turns_completed: 2,
                turns_dropped: 1,
                turns_failed: 0,
                malformed_messages: 1,
                unknown_messages: 1,
                frames_rejected: 0,
            }
        );
    }

    #[test]
    fn test_rejected_frames_are_counted() {
        let state = AppState::new(AppConfig::default());
        state.record_rejected_frame();
        state.record_rejected_frame();
        assert_eq!(state.get_metrics_snapshot().dialogue.frames_rejected, 2);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let metrics = state.get_metrics_snapshot();
        let health = &metrics.endpoint_metrics["GET /health"];
        assert_eq!(health.request_count, 2);
        assert_eq!(health.average_duration_ms(), 20.0);
        assert_eq!(health.error_rate(), 0.5);
    }

    #[test]
    fn test_clones_share_registry() {
        let state = AppState::new(AppConfig::default());
        let clone = state.clone();
        clone.sessions.put("1.2.3.4:5".into(), crate::session::Session::new(None, None));
        assert_eq!(state.sessions.len(), 1);
    }
}
