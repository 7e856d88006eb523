//! # Server Role
//!
//! Accepts connections, authenticates them, and answers each request with
//! exactly one reply.
//!
//! Per request: decode → authorize token → look up operation → run handler
//! under the circuit breaker → encode reply in the requester's format. No
//! failure inside that cycle ends the loop; it becomes an error reply. Only a
//! failed handshake, a broken connection or shutdown ends a connection task,
//! and only shutdown ends the accept loop.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::core::serialization::{MultiFormat, WireFormat};
use crate::error::{constants, BridgeError, Result};
use crate::protocol::dispatcher::OperationRegistry;
use crate::protocol::message::{Request, Response};
use crate::protocol::token::TokenAuthority;
use crate::service::secure::SecureConnection;
use crate::transport::tcp::{self, Admission};
use crate::utils::circuit_breaker::CircuitBreaker;
use crate::utils::keys::KeyPair;
use crate::utils::metrics::{ExchangeObserver, ExchangeOutcome, ExchangeRecord, Metrics, Role};
use crate::utils::replay_cache::ReplayCache;

/// Everything the connection tasks of one server share.
pub struct ServerContext {
    pub identity: Arc<KeyPair>,
    pub admission: Admission,
    pub registry: OperationRegistry,
    pub breaker: Arc<CircuitBreaker>,
    pub tokens: Arc<TokenAuthority>,
    pub observer: Option<Arc<dyn ExchangeObserver>>,
    pub metrics: Arc<Metrics>,
    pub replay_cache: Mutex<ReplayCache>,
    pub handshake_timeout: Duration,
    pub send_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// Largest frame accepted or sent on a connection
    pub max_payload_size: usize,
}

struct Handled {
    reply: Vec<u8>,
    operation: String,
    outcome: ExchangeOutcome,
}

fn encode_reply(response: &Response, format: WireFormat) -> Vec<u8> {
    match response.serialize_with_header(format) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, %format, "Failed to encode reply; falling back to JSON");
            json_error_reply(constants::ERR_INTERNAL)
        }
    }
}

/// Reply for requests whose format cannot be trusted. Always decodable.
fn json_error_reply(message: &str) -> Vec<u8> {
    let body = serde_json::json!({"status": "error", "message": message}).to_string();
    let mut reply = Vec::with_capacity(1 + body.len());
    reply.push(WireFormat::Json.format_byte());
    reply.extend_from_slice(body.as_bytes());
    reply
}

fn error_outcome(error: BridgeError, operation: String, format: WireFormat) -> Handled {
    let outcome = ExchangeOutcome::from_error(&error);
    let message = match &error {
        BridgeError::Internal(detail) => {
            error!(%detail, %operation, "Internal error while serving request");
            constants::ERR_INTERNAL.to_string()
        }
        other => other.to_string(),
    };
    Handled {
        reply: encode_reply(&Response::error(message), format),
        operation,
        outcome,
    }
}

fn run_handler(registry: &OperationRegistry, operation: &str, data: Value) -> Result<Value> {
    let handler = registry.lookup(operation)?;
    match std::panic::catch_unwind(AssertUnwindSafe(|| handler(data))) {
        Ok(result) => result.map_err(|e| BridgeError::Handler(e.0)),
        Err(_) => Err(BridgeError::Internal(format!("handler for '{operation}' panicked"))),
    }
}

impl ServerContext {
    /// Run one request through the cycle and produce its reply.
    pub async fn handle_request(&self, bytes: &[u8]) -> Vec<u8> {
        let started_at = SystemTime::now();
        let started = Instant::now();

        let handled = self.process(bytes).await;

        if let Some(observer) = &self.observer {
            let record = ExchangeRecord::finish(
                Role::Server,
                handled.operation.clone(),
                started_at,
                started,
                handled.outcome,
                1,
            );
            observer.on_exchange(&record);
        }
        handled.reply
    }

    async fn process(&self, bytes: &[u8]) -> Handled {
        let format = match bytes.first().map(|b| WireFormat::from_byte(*b)) {
            Some(Ok(format)) => format,
            _ => {
                warn!("Request with missing or unknown format byte");
                return Handled {
                    reply: json_error_reply(constants::ERR_MALFORMED_REQUEST),
                    operation: String::new(),
                    outcome: ExchangeOutcome::Malformed,
                };
            }
        };

        let request = match Request::deserialize_format(&bytes[1..], format) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, %format, "Failed to decode request");
                return Handled {
                    reply: encode_reply(&Response::error(constants::ERR_MALFORMED_REQUEST), format),
                    operation: String::new(),
                    outcome: ExchangeOutcome::Malformed,
                };
            }
        };

        if let Err(e) = self.tokens.validate(&request.token) {
            debug!(operation = %request.operation, error = %e, "Token rejected");
            return error_outcome(e, request.operation, format);
        }

        if !self.registry.contains(&request.operation) {
            debug!(operation = %request.operation, "Unknown operation");
            return error_outcome(
                BridgeError::UnknownOperation(request.operation.clone()),
                request.operation,
                format,
            );
        }

        let Request {
            operation, data, ..
        } = request;
        let registry = &self.registry;
        let op = operation.as_str();
        let result = self
            .breaker
            .guard(|| async move { run_handler(registry, op, data) })
            .await;

        match result {
            Ok(data) => Handled {
                reply: encode_reply(&Response::success(data), format),
                operation,
                outcome: ExchangeOutcome::Success,
            },
            Err(e) => error_outcome(e, operation, format),
        }
    }

    /// Answer requests on one authenticated connection until it closes.
    pub async fn serve_connection(&self, mut conn: SecureConnection) {
        let peer = conn.peer_addr();
        loop {
            let bytes = match conn.recv_bytes().await {
                Ok(bytes) => bytes,
                Err(BridgeError::ConnectionClosed) => {
                    debug!(?peer, "Peer closed connection");
                    break;
                }
                Err(e) => {
                    warn!(?peer, error = %e, "Dropping connection after receive failure");
                    break;
                }
            };

            let reply = self.handle_request(&bytes).await;
            if let Err(e) = conn.send_bytes(&reply).await {
                warn!(?peer, error = %e, "Failed to send reply");
                break;
            }
        }
    }
}

/// Accept connections on `listener` until `shutdown_rx` fires or its sender drops.
#[instrument(skip(listener, ctx, shutdown_rx))]
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let local = listener.local_addr()?;
    info!(address = %local, "Bridge server listening");

    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutting down server. Waiting for connections to close...");
                break;
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        let ctx = Arc::clone(&ctx);
                        connections.spawn(async move {
                            ctx.metrics.connection_established();
                            let accepted = tcp::accept(
                                stream,
                                peer_addr,
                                &ctx.identity,
                                &ctx.admission,
                                &ctx.replay_cache,
                                ctx.handshake_timeout,
                                ctx.max_payload_size,
                            )
                            .await;
                            match accepted {
                                Ok(conn) => {
                                    ctx.metrics.handshake_success();
                                    let conn = conn.with_timeouts(ctx.send_timeout, None);
                                    ctx.serve_connection(conn).await;
                                }
                                Err(e) => {
                                    ctx.metrics.handshake_failed();
                                    warn!(%peer_addr, error = %e, "Handshake failed");
                                }
                            }
                            ctx.metrics.connection_closed();
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    }

    drop(listener);
    drain(&mut connections, ctx.shutdown_timeout).await;
    Ok(())
}

async fn drain(connections: &mut JoinSet<()>, limit: Duration) {
    let waited = tokio::time::timeout(limit, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if waited.is_err() {
        warn!(
            remaining = connections.len(),
            "Shutdown timeout reached, aborting open connections"
        );
        connections.abort_all();
        while connections.join_next().await.is_some() {}
    } else {
        info!("All connections closed, shutting down");
    }
}
