//! # Secure Bridge
//!
//! Authenticated, encrypted request/reply between two pinned endpoints.
//!
//! Each bridge instance is both a server, dispatching named operations to
//! registered handlers, and a client, calling its peer's operations with
//! retry and backoff. Every connection is mutually authenticated with X25519
//! static keys exchanged as Z85 text, every request carries a short-lived
//! HS256 token, and both roles sit behind a circuit breaker.
//!
//! ## Layers
//! - [`core`]: packet framing and the JSON, MessagePack and schema-binary encodings
//! - [`protocol`]: handshake, messages, tokens and the operation registry
//! - [`transport`]: TCP connect/accept ending in an encrypted connection
//! - [`service`]: the server loop, the retrying client and [`SecureBridge`]
//! - [`utils`]: keys, crypto, breaker, backoff, logging and metrics
//!
//! ## Wire Format
//! ```text
//! [Magic "SBRG"(4)] [Version(1)] [Length(4)] [Nonce(24) | Ciphertext(N)]
//! plaintext: [Format(1)] [Encoded message]
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::BridgeConfig;
pub use core::serialization::{MultiFormat, WireFormat};
pub use error::{BridgeError, Result};
pub use protocol::dispatcher::{HandlerError, OperationRegistry};
pub use protocol::message::{Request, Response};
pub use protocol::token::{Claims, TokenAuthority};
pub use service::bridge::{SecureBridge, ServerHandle};
pub use service::client::BridgeClient;
pub use utils::circuit_breaker::{CircuitBreaker, CircuitState};
pub use utils::keys::{generate_keypair, KeyPair};
pub use utils::logging::init_logging;
pub use utils::metrics::{ExchangeObserver, ExchangeOutcome, ExchangeRecord, Metrics};
