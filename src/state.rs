//! # Application State Management
//!
//! This module manages shared state that needs to be accessed by multiple
//! connections simultaneously. This is one of the most concurrency-sensitive
//! parts of the application.
//!
//! ## Key Rust Concepts (IMPORTANT for beginners):
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Allows multiple parts of the program to safely share ownership of data
//! - **Why needed**: Every HTTP request, control connection, and tunnel needs the same state
//! - **Memory safety**: Automatically cleans up data when the last reference is dropped
//!
//! ### RwLock (Reader-Writer Lock)
//! - **Purpose**: Allows multiple readers OR one writer at a time (but not both)
//! - **Why needed**: Connections read config constantly; only runtime updates write it
//!
//! ### Arc<RwLock<T>> Pattern
//! - **Arc**: Multiple ownership (many handlers can hold a reference)
//! - **RwLock**: Thread-safe read/write access
//! - **T**: The actual data type being protected
//!
//! ## What is NOT here:
//! Conversation state lives in the [`SessionRegistry`](crate::relay::registry),
//! behind its own per-session locks, so chat traffic never contends with
//! metrics updates or config reads.

use crate::config::AppConfig;            // Our configuration types
use crate::engine::EngineClient;         // AI engine text-endpoint client
use crate::relay::registry::SessionRegistry;  // Session id -> conversation state
use std::collections::HashMap;           // For storing per-endpoint metrics
use std::sync::{Arc, RwLock};            // Thread-safe shared ownership and locking
use std::time::Instant;                  // For tracking server uptime

/// The main application state shared across all request handlers and actors.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Relay metrics (constantly being updated by connections)
    pub metrics: Arc<RwLock<RelayMetrics>>,

    /// All live interview sessions
    pub registry: Arc<SessionRegistry>,

    /// Shared AI engine client (connection pool spans all sessions)
    pub engine: Arc<EngineClient>,

    /// When the server started (never changes, so no Arc<RwLock> needed)
    pub start_time: Instant,
}

/// Operational counters for the relay.
///
/// ## Why these metrics matter:
/// - **request_count / error_count**: HTTP surface load and reliability
/// - **active_control_connections**: candidates currently on the chat channel
/// - **active_tunnels**: live audio tunnels (each holds an upstream connection)
/// - **engine_requests / engine_failures**: whether fallback replies are
///   isolated incidents or an engine outage
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Current number of open control-channel connections
    pub active_control_connections: u32,

    /// Current number of open audio tunnels
    pub active_tunnels: u32,

    /// Text-endpoint calls issued to the AI engine
    pub engine_requests: u64,

    /// Text-endpoint calls that ended in a fallback reply
    pub engine_failures: u64,

    /// Detailed metrics for each API endpoint (URL path)
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    /// Number of requests to this specific endpoint
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    /// Number of errors that occurred for this endpoint
    pub error_count: u64,
}

impl AppState {
    /// Create a new AppState with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(
            config.performance.max_concurrent_sessions,
        ));
        let engine = Arc::new(EngineClient::new(&config.engine));

        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(RelayMetrics::default())),
            registry,
            engine,
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// ## Why clone:
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    /// AppConfig is designed to be cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Update the configuration with validation.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                // Validation passed, update the config
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => {
                // Validation failed, return the error
                Err(e.to_string())
            }
        }
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (called when any request fails).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        // Get or create metrics for this specific endpoint
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        // Update the metrics for this endpoint
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// A control-channel connection opened.
    pub fn control_connection_opened(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_control_connections += 1;
    }

    /// A control-channel connection closed.
    ///
    /// ## Safety check:
    /// Underflow protection mirrors the open/close pairing; u32 would panic
    /// on a stray extra decrement.
    pub fn control_connection_closed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_control_connections > 0 {
            metrics.active_control_connections -= 1;
        }
    }

    /// An audio tunnel was established (both legs up).
    pub fn tunnel_opened(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_tunnels += 1;
    }

    /// An audio tunnel was torn down.
    pub fn tunnel_closed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_tunnels > 0 {
            metrics.active_tunnels -= 1;
        }
    }

    /// A text-endpoint call was issued; `failed` marks a fallback outcome.
    pub fn record_engine_request(&self, failed: bool) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.engine_requests += 1;
        if failed {
            metrics.engine_failures += 1;
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// ## Why a snapshot:
    /// Clones the data so we don't hold the lock while serializing the HTTP
    /// response; metrics can't change mid-serialization.
    pub fn get_metrics_snapshot(&self) -> RelayMetrics {
        let metrics = self.metrics.read().unwrap();
        RelayMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_control_connections: metrics.active_control_connections,
            active_tunnels: metrics.active_tunnels,
            engine_requests: metrics.engine_requests,
            engine_failures: metrics.engine_failures,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Calculate the average response time for this endpoint.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0  // No requests yet, so no average to calculate
        }
    }

    /// Calculate the error rate for this endpoint (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0  // No requests yet, so no errors possible
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "test-secret".to_string();
        AppState::new(config)
    }

    #[test]
    fn test_connection_counters_pair_up() {
        let state = test_state();

        state.control_connection_opened();
        state.control_connection_opened();
        state.tunnel_opened();
        state.control_connection_closed();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.active_control_connections, 1);
        assert_eq!(snapshot.active_tunnels, 1);

        // Stray extra close must not underflow
        state.tunnel_closed();
        state.tunnel_closed();
        assert_eq!(state.get_metrics_snapshot().active_tunnels, 0);
    }

    #[test]
    fn test_engine_counters() {
        let state = test_state();
        state.record_engine_request(false);
        state.record_engine_request(true);
        state.record_engine_request(false);

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.engine_requests, 3);
        assert_eq!(snapshot.engine_failures, 1);
    }

    #[test]
    fn test_endpoint_metric_rates() {
        let state = test_state();
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }
}
