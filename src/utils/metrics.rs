//! Observability and Metrics
//!
//! Every request/reply exchange is reported to an [`ExchangeObserver`] with
//! its operation name, start and end timestamps and outcome. Sidecars hook
//! in here; the bridge itself never exports anything.
//!
//! [`Metrics`] is the built-in observer: atomic counters per outcome,
//! per-operation counts and cumulative latency, plus connection and handshake
//! counters the server updates directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};
use tracing::info;

use crate::error::BridgeError;

/// Which side of the exchange produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// How an exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeOutcome {
    Success,
    /// Token expired or invalid
    Unauthorized,
    UnknownOperation,
    HandlerFailed,
    BreakerOpen,
    /// Request could not be decoded
    Malformed,
    /// Transport failure or retries exhausted
    TransportFailed,
    /// Error reply that fits no other bucket
    Failed,
}

impl ExchangeOutcome {
    pub fn from_error(error: &BridgeError) -> Self {
        match error {
            BridgeError::Expired | BridgeError::InvalidToken => Self::Unauthorized,
            BridgeError::UnknownOperation(_) => Self::UnknownOperation,
            BridgeError::Handler(_) => Self::HandlerFailed,
            BridgeError::BreakerOpen => Self::BreakerOpen,
            BridgeError::UnsupportedFormat(_)
            | BridgeError::Decode(_)
            | BridgeError::Deserialize(_) => Self::Malformed,
            e if e.is_retryable() => Self::TransportFailed,
            BridgeError::MaxRetriesExceeded => Self::TransportFailed,
            _ => Self::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Unauthorized => "unauthorized",
            Self::UnknownOperation => "unknown_operation",
            Self::HandlerFailed => "handler_failed",
            Self::BreakerOpen => "breaker_open",
            Self::Malformed => "malformed",
            Self::TransportFailed => "transport_failed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExchangeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed exchange.
#[derive(Debug, Clone)]
pub struct ExchangeRecord {
    pub role: Role,
    /// Empty when the request could not be decoded far enough to name it.
    pub operation: String,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub duration: Duration,
    pub outcome: ExchangeOutcome,
    /// Client attempts spent; always 1 on the server.
    pub attempts: u32,
}

impl ExchangeRecord {
    /// Measures from `started` (monotonic) to now.
    pub fn finish(
        role: Role,
        operation: impl Into<String>,
        started_at: SystemTime,
        started: Instant,
        outcome: ExchangeOutcome,
        attempts: u32,
    ) -> Self {
        let duration = started.elapsed();
        Self {
            role,
            operation: operation.into(),
            started_at,
            finished_at: started_at + duration,
            duration,
            outcome,
            attempts,
        }
    }
}

/// Hook notified after every exchange. Must not block.
pub trait ExchangeObserver: Send + Sync {
    fn on_exchange(&self, record: &ExchangeRecord);
}

/// Exchange and connection counters.
#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Successful handshakes
    pub handshakes_success: AtomicU64,
    /// Failed or rejected handshakes
    pub handshakes_failed: AtomicU64,
    pub exchanges_total: AtomicU64,
    pub exchanges_success: AtomicU64,
    pub exchanges_unauthorized: AtomicU64,
    pub exchanges_unknown_operation: AtomicU64,
    pub exchanges_handler_failed: AtomicU64,
    pub exchanges_breaker_open: AtomicU64,
    pub exchanges_malformed: AtomicU64,
    pub exchanges_transport_failed: AtomicU64,
    pub exchanges_failed: AtomicU64,
    /// Sum of exchange durations in microseconds
    pub latency_micros_total: AtomicU64,
    per_operation: Mutex<HashMap<String, u64>>,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            handshakes_success: AtomicU64::new(0),
            handshakes_failed: AtomicU64::new(0),
            exchanges_total: AtomicU64::new(0),
            exchanges_success: AtomicU64::new(0),
            exchanges_unauthorized: AtomicU64::new(0),
            exchanges_unknown_operation: AtomicU64::new(0),
            exchanges_handler_failed: AtomicU64::new(0),
            exchanges_breaker_open: AtomicU64::new(0),
            exchanges_malformed: AtomicU64::new(0),
            exchanges_transport_failed: AtomicU64::new(0),
            exchanges_failed: AtomicU64::new(0),
            latency_micros_total: AtomicU64::new(0),
            per_operation: Mutex::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a new connection
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn handshake_success(&self) {
        self.handshakes_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.handshakes_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn outcome_counter(&self, outcome: ExchangeOutcome) -> &AtomicU64 {
        match outcome {
            ExchangeOutcome::Success => &self.exchanges_success,
            ExchangeOutcome::Unauthorized => &self.exchanges_unauthorized,
            ExchangeOutcome::UnknownOperation => &self.exchanges_unknown_operation,
            ExchangeOutcome::HandlerFailed => &self.exchanges_handler_failed,
            ExchangeOutcome::BreakerOpen => &self.exchanges_breaker_open,
            ExchangeOutcome::Malformed => &self.exchanges_malformed,
            ExchangeOutcome::TransportFailed => &self.exchanges_transport_failed,
            ExchangeOutcome::Failed => &self.exchanges_failed,
        }
    }

    /// Exchanges seen for `operation`. Server records only count once the
    /// operation was found in the registry, so peers cannot mint new keys.
    pub fn operation_count(&self, operation: &str) -> u64 {
        self.per_operation
            .lock()
            .map(|ops| ops.get(operation).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.exchanges_total.load(Ordering::Relaxed);
        let latency = self.latency_micros_total.load(Ordering::Relaxed);
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            handshakes_success: self.handshakes_success.load(Ordering::Relaxed),
            handshakes_failed: self.handshakes_failed.load(Ordering::Relaxed),
            exchanges_total: total,
            exchanges_success: self.exchanges_success.load(Ordering::Relaxed),
            exchanges_unauthorized: self.exchanges_unauthorized.load(Ordering::Relaxed),
            exchanges_unknown_operation: self.exchanges_unknown_operation.load(Ordering::Relaxed),
            exchanges_handler_failed: self.exchanges_handler_failed.load(Ordering::Relaxed),
            exchanges_breaker_open: self.exchanges_breaker_open.load(Ordering::Relaxed),
            exchanges_malformed: self.exchanges_malformed.load(Ordering::Relaxed),
            exchanges_transport_failed: self.exchanges_transport_failed.load(Ordering::Relaxed),
            exchanges_failed: self.exchanges_failed.load(Ordering::Relaxed),
            mean_latency_micros: latency.checked_div(total).unwrap_or(0),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            handshakes_success = snapshot.handshakes_success,
            handshakes_failed = snapshot.handshakes_failed,
            exchanges_total = snapshot.exchanges_total,
            exchanges_success = snapshot.exchanges_success,
            exchanges_unauthorized = snapshot.exchanges_unauthorized,
            exchanges_unknown_operation = snapshot.exchanges_unknown_operation,
            exchanges_handler_failed = snapshot.exchanges_handler_failed,
            exchanges_breaker_open = snapshot.exchanges_breaker_open,
            exchanges_malformed = snapshot.exchanges_malformed,
            exchanges_transport_failed = snapshot.exchanges_transport_failed,
            exchanges_failed = snapshot.exchanges_failed,
            mean_latency_micros = snapshot.mean_latency_micros,
            uptime_seconds = snapshot.uptime_seconds,
            "Bridge metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Client operation names come from local code; server ones from the peer.
fn counts_per_operation(record: &ExchangeRecord) -> bool {
    if record.operation.is_empty() {
        return false;
    }
    match record.role {
        Role::Client => true,
        Role::Server => matches!(
            record.outcome,
            ExchangeOutcome::Success | ExchangeOutcome::HandlerFailed | ExchangeOutcome::BreakerOpen
        ),
    }
}

impl ExchangeObserver for Metrics {
    fn on_exchange(&self, record: &ExchangeRecord) {
        self.exchanges_total.fetch_add(1, Ordering::Relaxed);
        self.outcome_counter(record.outcome)
            .fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(record.duration.as_micros()).unwrap_or(u64::MAX);
        self.latency_micros_total.fetch_add(micros, Ordering::Relaxed);

        if counts_per_operation(record) {
            if let Ok(mut ops) = self.per_operation.lock() {
                *ops.entry(record.operation.clone()).or_insert(0) += 1;
            }
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub handshakes_success: u64,
    pub handshakes_failed: u64,
    pub exchanges_total: u64,
    pub exchanges_success: u64,
    pub exchanges_unauthorized: u64,
    pub exchanges_unknown_operation: u64,
    pub exchanges_handler_failed: u64,
    pub exchanges_breaker_open: u64,
    pub exchanges_malformed: u64,
    pub exchanges_transport_failed: u64,
    pub exchanges_failed: u64,
    pub mean_latency_micros: u64,
    pub uptime_seconds: u64,
}
