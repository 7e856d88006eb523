//! # Utility Modules
//!
//! Supporting utilities for keys, cryptography, resilience, logging, and timing.
//!
//! ## Components
//! - **Z85**: Key text codec (5 characters per 4 bytes)
//! - **Keys**: X25519 key pairs and their textual form
//! - **Crypto**: XChaCha20-Poly1305 AEAD encryption
//! - **Circuit Breaker**: Consecutive-failure breaker with a single half-open probe
//! - **Backoff**: Exponential backoff with jitter and a retry driver
//! - **Logging**: Structured logging configuration
//! - **Time**: Timestamp utilities for token and handshake expiry
//! - **Timeout**: Async timeout wrappers
//! - **Replay Cache**: TTL-based nonce deduplication for replay attack prevention
//! - **Metrics**: Exchange observer hook and atomic counters
//!
//! ## Security
//! - Cryptographically secure RNG (getrandom)
//! - Memory zeroing for sensitive data (zeroize crate)

pub mod backoff;
pub mod circuit_breaker;
pub mod crypto;
pub mod keys;
pub mod logging;
pub mod metrics;
pub mod replay_cache;
pub mod time;
pub mod timeout;
pub mod z85;

// Re-export public types for advanced users
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use keys::KeyPair;
pub use metrics::{ExchangeObserver, ExchangeOutcome, ExchangeRecord, Metrics};
pub use replay_cache::ReplayCache;
