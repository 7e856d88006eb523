//! # Client Role
//!
//! Sends one request per call over a fresh authenticated connection and
//! returns the peer's reply. Transport, timeout and decode failures are
//! retried with exponential backoff; replies the peer sent deliberately,
//! including error replies, are returned as they are.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, instrument, warn};

use crate::config::TransportConfig;
use crate::core::serialization::{MultiFormat, WireFormat};
use crate::error::{constants, BridgeError, Result};
use crate::protocol::message::{Request, Response};
use crate::transport::tcp;
use crate::utils::backoff::{retry_async, RetryOutcome, RetryPolicy};
use crate::utils::circuit_breaker::CircuitBreaker;
use crate::utils::keys::KeyPair;
use crate::utils::metrics::{ExchangeObserver, ExchangeOutcome, ExchangeRecord, Role};

/// Client endpoint pinned to one server identity.
#[derive(Clone)]
pub struct BridgeClient {
    address: String,
    identity: Arc<KeyPair>,
    server_key: [u8; 32],
    policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    connect_timeout: Duration,
    response_timeout: Duration,
    handshake_timeout: Duration,
    max_payload_size: usize,
    observer: Option<Arc<dyn ExchangeObserver>>,
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("address", &self.address)
            .field("policy", &self.policy)
            .field("breaker", &self.breaker.state())
            .finish_non_exhaustive()
    }
}

impl BridgeClient {
    pub fn new(
        address: impl Into<String>,
        identity: Arc<KeyPair>,
        server_key: [u8; 32],
        policy: RetryPolicy,
        breaker: Arc<CircuitBreaker>,
        transport: &TransportConfig,
    ) -> Self {
        Self {
            address: address.into(),
            identity,
            server_key,
            policy,
            breaker,
            connect_timeout: transport.connect_timeout,
            response_timeout: transport.response_timeout,
            handshake_timeout: transport.handshake_timeout,
            max_payload_size: transport.max_payload_size,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExchangeObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// One attempt: connect, authenticate, send, await the reply, close.
    #[instrument(skip(self, payload), fields(address = %self.address, len = payload.len()))]
    pub async fn send_once(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let conn = tcp::connect(
            &self.address,
            &self.identity,
            &self.server_key,
            self.connect_timeout,
            self.handshake_timeout,
            self.max_payload_size,
        )
        .await?;
        let mut conn = conn.with_timeouts(self.connect_timeout, Some(self.response_timeout));
        let reply = conn.exchange(payload).await?;
        if let Err(e) = conn.close().await {
            debug!(error = %e, "Error closing connection after reply");
        }
        Ok(reply)
    }

    async fn attempt(&self, payload: &[u8]) -> Result<Response> {
        self.breaker
            .guard(|| async {
                let reply = self.send_once(payload).await?;
                let (response, _) = Response::deserialize_with_header(&reply)?;
                Ok(response)
            })
            .await
    }

    /// Send `request` encoded as `format` and return the peer's reply.
    ///
    /// Never fails: local problems become `{status: "error"}` responses, and
    /// running out of attempts yields "Max retries exceeded".
    pub async fn call(&self, request: &Request, format: WireFormat) -> Response {
        let started_at = SystemTime::now();
        let started = Instant::now();

        let (response, outcome, attempts) = match request.serialize_with_header(format) {
            Ok(payload) => {
                let outcome = retry_async(&self.policy, |attempt| {
                    let payload = &payload;
                    async move {
                        if attempt > 0 {
                            debug!(attempt = attempt + 1, operation = %request.operation, "Retrying call");
                        }
                        self.attempt(payload).await
                    }
                })
                .await;
                let attempts = outcome.attempts();
                match outcome {
                    RetryOutcome::Success { result, .. } => {
                        let outcome = match &result {
                            Response::Success { .. } => ExchangeOutcome::Success,
                            Response::Error { .. } => ExchangeOutcome::Failed,
                        };
                        (result, outcome, attempts)
                    }
                    RetryOutcome::Exhausted { last_error, .. } => {
                        warn!(operation = %request.operation, error = %last_error, "Giving up on call");
                        (
                            Response::error(constants::ERR_MAX_RETRIES),
                            ExchangeOutcome::TransportFailed,
                            attempts,
                        )
                    }
                    RetryOutcome::Aborted { error, .. } => (
                        Response::error(error.to_string()),
                        ExchangeOutcome::from_error(&error),
                        attempts,
                    ),
                }
            }
            Err(e) => (
                Response::error(e.to_string()),
                ExchangeOutcome::from_error(&e),
                0,
            ),
        };

        if let Some(observer) = &self.observer {
            let record = ExchangeRecord::finish(
                Role::Client,
                request.operation.clone(),
                started_at,
                started,
                outcome,
                attempts,
            );
            observer.on_exchange(&record);
        }
        response
    }

    /// Like [`call`](Self::call) but surfaces exhaustion as an error.
    pub async fn try_call(&self, request: &Request, format: WireFormat) -> Result<Response> {
        let payload = request.serialize_with_header(format)?;
        match retry_async(&self.policy, |_| self.attempt(&payload)).await {
            RetryOutcome::Success { result, .. } => Ok(result),
            RetryOutcome::Exhausted { .. } => Err(BridgeError::MaxRetriesExceeded),
            RetryOutcome::Aborted { error, .. } => Err(error),
        }
    }
}
