//! Circuit breaker around request execution.
//!
//! ```text
//!   CLOSED ──(threshold consecutive failures)──► OPEN
//!     ▲                                           │
//!     │ probe succeeds          recovery timeout  │
//!     │                                           ▼
//!     └──────────────────────────────────────  HALF-OPEN
//!                 probe fails ──► OPEN
//! ```
//!
//! While half-open exactly one probe runs at a time; every other caller fails
//! fast with [`BridgeError::BreakerOpen`] until the probe settles the state.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::BreakerConfig;
use crate::error::{BridgeError, Result};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Circuit is open - requests are rejected immediately
    Open,
    /// One probe request decides whether to close again
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Consecutive-failure circuit breaker shared by all callers of one endpoint.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

/// Releases the half-open probe slot if the guarded action never reports back.
struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.breaker.lock();
            inner.probe_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
        }
    }

    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(config.failure_threshold, config.recovery_timeout)
    }

    // A poisoned lock only means another caller panicked mid-update; the
    // counters are still coherent enough to keep going.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Decide whether a call may run. Returns whether it is the half-open probe.
    fn admit(&self) -> Result<bool> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => {
                let recovered = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.recovery_timeout);
                if recovered {
                    info!("Circuit breaker transitioning to half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(true)
                } else {
                    debug!("Circuit breaker is open, rejecting call");
                    Err(BridgeError::BreakerOpen)
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(BridgeError::BreakerOpen)
                } else {
                    inner.probe_in_flight = true;
                    Ok(true)
                }
            }
        }
    }

    fn record_success(&self, probe: bool) {
        let mut inner = self.lock();
        if probe {
            info!("Circuit breaker closed after successful probe");
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            inner.probe_in_flight = false;
            inner.consecutive_failures = 0;
        } else if inner.state == CircuitState::Closed {
            inner.consecutive_failures = 0;
        }
    }

    fn record_failure(&self, probe: bool) {
        let mut inner = self.lock();
        if probe {
            warn!("Probe failed, circuit breaker re-opened");
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.probe_in_flight = false;
            inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
            return;
        }
        if inner.state != CircuitState::Closed {
            return;
        }
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        if inner.consecutive_failures >= self.failure_threshold {
            warn!(
                failures = inner.consecutive_failures,
                "Circuit breaker opened"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Run `action` if the circuit admits it and record the outcome.
    ///
    /// Returns `BridgeError::BreakerOpen` without running `action` when the
    /// circuit is open and not yet recovered, or when another probe is running.
    pub async fn guard<F, Fut, T>(&self, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let probe = self.admit()?;
        let mut slot = ProbeSlot {
            breaker: self,
            armed: probe,
        };

        let result = action().await;
        slot.armed = false;
        match &result {
            Ok(_) => self.record_success(probe),
            Err(_) => self.record_failure(probe),
        }
        result
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_config(&BreakerConfig::default())
    }
}
