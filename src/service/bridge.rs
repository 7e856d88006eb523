//! # Secure Bridge
//!
//! One bridge instance plays both roles: it serves its own operations and
//! calls the operations of its pinned peer. Both roles share the key pair
//! and the token authority.
//!
//! ```rust,no_run
//! use secure_bridge::{BridgeConfig, SecureBridge, WireFormat};
//! use serde_json::json;
//!
//! # async fn run() -> secure_bridge::Result<()> {
//! let bridge = SecureBridge::new(BridgeConfig::from_file("bridge.toml")?)?;
//! bridge.register_handler("sum", |data| {
//!     let a = data["a"].as_i64().unwrap_or(0);
//!     let b = data["b"].as_i64().unwrap_or(0);
//!     Ok(json!({"result": a + b}))
//! })?;
//!
//! bridge.start_rotation()?;
//! let server = bridge.spawn_server().await?;
//!
//! let reply = bridge.send_request("sum", json!({"a": 5, "b": 3}), WireFormat::Json).await;
//! println!("{reply:?}");
//!
//! bridge.shutdown(server).await
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::BridgeConfig;
use crate::core::serialization::WireFormat;
use crate::error::{constants, BridgeError, Result};
use crate::protocol::dispatcher::{HandlerError, OperationRegistry};
use crate::protocol::handshake::PeerTrust;
use crate::protocol::message::{Request, Response};
use crate::protocol::token::{Claims, TokenAuthority};
use crate::service::client::BridgeClient;
use crate::service::server::{self, ServerContext};
use crate::transport::tcp::Admission;
use crate::utils::backoff::RetryPolicy;
use crate::utils::circuit_breaker::CircuitBreaker;
use crate::utils::keys::KeyPair;
use crate::utils::metrics::{ExchangeObserver, Metrics};
use crate::utils::replay_cache::ReplayCache;
use crate::utils::z85;

struct Rotation {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// A running server task.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<Result<()>>,
}

impl ServerHandle {
    /// Address the server actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, let open connections drain, and wait for the task.
    pub async fn shutdown(self) -> Result<()> {
        // A closed channel means the loop already ended
        let _ = self.shutdown_tx.send(()).await;
        self.join
            .await
            .map_err(|e| BridgeError::Internal(format!("server task failed: {e}")))?
    }
}

/// Both endpoint roles of one bridge instance.
pub struct SecureBridge {
    config: BridgeConfig,
    identity: Arc<KeyPair>,
    peer_key: Option<[u8; 32]>,
    tokens: Arc<TokenAuthority>,
    registry: OperationRegistry,
    server_breaker: Arc<CircuitBreaker>,
    client_breaker: Arc<CircuitBreaker>,
    metrics: Arc<Metrics>,
    observer: Option<Arc<dyn ExchangeObserver>>,
    rotation: Mutex<Option<Rotation>>,
}

impl std::fmt::Debug for SecureBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureBridge")
            .field("identity", &self.identity)
            .field("registry", &self.registry)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl SecureBridge {
    /// Build a bridge from a validated configuration.
    ///
    /// Generates a fresh key pair when none is configured; its public key is
    /// logged so it can be handed to the peer.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate_strict()?;

        let identity = match &config.endpoint.private_key {
            Some(private) => KeyPair::from_z85(private, config.endpoint.public_key.as_deref())?,
            None => {
                let generated = KeyPair::generate();
                info!(public_key = %generated.public_text(), "Generated bridge key pair");
                generated
            }
        };

        let peer_key = config
            .endpoint
            .peer_public_key
            .as_deref()
            .map(z85::decode_key)
            .transpose()?;

        let tokens = match &config.endpoint.shared_secret {
            Some(seed) => TokenAuthority::with_seed(seed.as_bytes(), &config.token)?,
            None => TokenAuthority::new(&config.token)?,
        };

        info!(keys = %identity.describe(peer_key.as_ref()), "Bridge keys loaded");

        Ok(Self {
            server_breaker: Arc::new(CircuitBreaker::from_config(&config.breaker)),
            client_breaker: Arc::new(CircuitBreaker::from_config(&config.breaker)),
            identity: Arc::new(identity),
            peer_key,
            tokens: Arc::new(tokens),
            registry: OperationRegistry::new(),
            metrics: Arc::new(Metrics::new()),
            observer: None,
            rotation: Mutex::new(None),
            config,
        })
    }

    /// Report every exchange, on both roles, to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn ExchangeObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replace the token authority, e.g. to share one between bridges in a process.
    pub fn with_token_authority(mut self, tokens: Arc<TokenAuthority>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Z85 public key for the peer to pin (and for a discovery endpoint).
    pub fn public_key(&self) -> String {
        self.identity.public_text()
    }

    /// Own and peer keys for logs, private key masked.
    pub fn describe_keys(&self) -> String {
        self.identity.describe(self.peer_key.as_ref())
    }

    pub fn tokens(&self) -> &Arc<TokenAuthority> {
        &self.tokens
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Connection and handshake counters maintained by the server role.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn server_breaker(&self) -> &CircuitBreaker {
        &self.server_breaker
    }

    pub fn client_breaker(&self) -> &CircuitBreaker {
        &self.client_breaker
    }

    /// Register `handler` for `name`; a later registration replaces it.
    pub fn register_handler<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(Value) -> std::result::Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.registry.register(name, handler)
    }

    /// Token with only `iat`/`exp` claims.
    pub fn issue_token(&self) -> Result<String> {
        self.tokens.issue_default()
    }

    pub fn issue_token_with(&self, claims: Claims) -> Result<String> {
        self.tokens.issue(claims)
    }

    /// Start the secret rotation task. Does nothing if it is already running.
    pub fn start_rotation(&self) -> Result<()> {
        let mut rotation = self
            .rotation
            .lock()
            .map_err(|_| BridgeError::Internal(constants::ERR_LOCK_POISONED.into()))?;
        if rotation.is_some() {
            return Ok(());
        }
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = self
            .tokens
            .spawn_rotation(self.config.token.rotation_interval, shutdown_rx);
        *rotation = Some(Rotation {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Stop the rotation task and wait for it to finish.
    pub async fn stop_rotation(&self) -> Result<()> {
        let rotation = self
            .rotation
            .lock()
            .map_err(|_| BridgeError::Internal(constants::ERR_LOCK_POISONED.into()))?
            .take();
        if let Some(Rotation {
            shutdown_tx,
            handle,
        }) = rotation
        {
            let _ = shutdown_tx.send(()).await;
            if let Err(e) = handle.await {
                warn!(error = %e, "Rotation task ended abnormally");
            }
        }
        Ok(())
    }

    pub fn rotation_running(&self) -> bool {
        self.rotation
            .lock()
            .map(|rotation| rotation.is_some())
            .unwrap_or(false)
    }

    fn admission(&self) -> Admission {
        let trust = match (self.config.endpoint.allow_any_peer, self.peer_key) {
            (false, Some(key)) => PeerTrust::Pinned(key),
            _ => PeerTrust::AllowAny,
        };
        Admission {
            trust,
            allowed_addresses: self.config.endpoint.allowed_addresses.clone(),
        }
    }

    /// Bind the configured server address and serve in a background task.
    ///
    /// Bind failures are returned here; nothing after binding ends the task
    /// except [`ServerHandle::shutdown`].
    pub async fn spawn_server(&self) -> Result<ServerHandle> {
        let address = self.config.endpoint.server_address();
        let listener = TcpListener::bind(&address).await?;
        let local_addr = listener.local_addr()?;

        let ctx = Arc::new(ServerContext {
            identity: Arc::clone(&self.identity),
            admission: self.admission(),
            registry: self.registry.clone(),
            breaker: Arc::clone(&self.server_breaker),
            tokens: Arc::clone(&self.tokens),
            observer: self.observer.clone(),
            metrics: Arc::clone(&self.metrics),
            replay_cache: std::sync::Mutex::new(ReplayCache::new()),
            handshake_timeout: self.config.transport.handshake_timeout,
            send_timeout: self.config.transport.connect_timeout,
            shutdown_timeout: self.config.transport.shutdown_timeout,
            max_payload_size: self.config.transport.max_payload_size,
        });

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let join = tokio::spawn(server::serve(listener, ctx, shutdown_rx));

        Ok(ServerHandle {
            local_addr,
            shutdown_tx,
            join,
        })
    }

    /// Client for the configured peer.
    pub fn client(&self) -> Result<BridgeClient> {
        let server_key = self.peer_key.ok_or_else(|| {
            BridgeError::Config("peer_public_key is required for the client role".into())
        })?;
        let client = BridgeClient::new(
            self.config.endpoint.client_address(),
            Arc::clone(&self.identity),
            server_key,
            RetryPolicy::from_config(&self.config.retry),
            Arc::clone(&self.client_breaker),
            &self.config.transport,
        );
        Ok(match &self.observer {
            Some(observer) => client.with_observer(Arc::clone(observer)),
            None => client,
        })
    }

    /// Send a prepared request to the peer.
    pub async fn call(&self, request: &Request, format: WireFormat) -> Response {
        match self.client() {
            Ok(client) => client.call(request, format).await,
            Err(e) => Response::error(e.to_string()),
        }
    }

    /// Issue a fresh token and call `operation` on the peer.
    pub async fn send_request(&self, operation: &str, data: Value, format: WireFormat) -> Response {
        match self.issue_token() {
            Ok(token) => self.call(&Request::new(operation, token, data), format).await,
            Err(e) => Response::error(e.to_string()),
        }
    }

    /// Stop rotation first, then the server.
    pub async fn shutdown(&self, server: ServerHandle) -> Result<()> {
        self.stop_rotation().await?;
        server.shutdown().await
    }

    /// Rotate, serve, and block until ctrl-c, then shut both down.
    pub async fn serve_until_ctrl_c(&self) -> Result<()> {
        self.start_rotation()?;
        let server = self.spawn_server().await?;
        info!(address = %server.local_addr(), public_key = %self.public_key(), "Bridge running");

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c; shutting down");
        } else {
            info!("Received CTRL+C signal, shutting down");
        }
        self.shutdown(server).await
    }
}

impl Drop for SecureBridge {
    fn drop(&mut self) {
        if let Ok(mut rotation) = self.rotation.lock() {
            if let Some(rotation) = rotation.take() {
                rotation.handle.abort();
            }
        }
    }
}
