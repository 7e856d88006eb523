//! # Error Types
//!
//! Error handling for the secure bridge.
//!
//! Every failure the bridge can produce is a variant of [`BridgeError`], from
//! socket-level I/O up to request-level authorization and dispatch problems.
//!
//! ## Error Categories
//! - **Encoding Errors**: bad key text (`Format`), unknown wire format
//!   (`UnsupportedFormat`), malformed schema payloads (`Decode`)
//! - **Authorization Errors**: `Expired` and `InvalidToken`
//! - **Dispatch Errors**: `UnknownOperation`, `Handler`, `BreakerOpen`
//! - **Transport Errors**: I/O, framing, handshake, encryption, timeouts
//! - **Client Outcome**: `MaxRetriesExceeded`
//!
//! The server turns every variant into an error reply; the client only
//! retries the variants for which [`BridgeError::is_retryable`] is true.
//!
//! ## Example Usage
//! ```rust
//! use secure_bridge::error::{BridgeError, Result};
//! use secure_bridge::utils::z85;
//!
//! fn key_len(text: &str) -> Result<usize> {
//!     Ok(z85::decode(text)?.len())
//! }
//!
//! assert!(matches!(key_len("bad"), Err(BridgeError::Format(_))));
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Registry errors
    pub const ERR_REGISTRY_WRITE_LOCK: &str = "Failed to acquire write lock on operation registry";
    pub const ERR_REGISTRY_READ_LOCK: &str = "Failed to acquire read lock on operation registry";

    /// Token errors, worded like the peer implementations expect them
    pub const ERR_TOKEN_EXPIRED: &str = "JWT expired";
    pub const ERR_TOKEN_INVALID: &str = "Invalid JWT";

    /// Dispatch errors
    pub const ERR_UNKNOWN_OPERATION: &str = "Unknown operation";
    pub const ERR_BREAKER_OPEN: &str = "Circuit breaker is open";
    pub const ERR_MALFORMED_REQUEST: &str = "Malformed request";
    pub const ERR_INTERNAL: &str = "Internal server error";

    /// Client outcome
    pub const ERR_MAX_RETRIES: &str = "Max retries exceeded";

    /// Protocol validation errors
    pub const ERR_INVALID_HEADER: &str = "Invalid protocol header";
    pub const ERR_OVERSIZED_PACKET: &str = "Packet exceeds maximum size";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_TIMEOUT: &str = "Operation timed out";

    /// Cryptographic errors
    pub const ERR_ENCRYPTION_FAILED: &str = "Encryption failed";
    pub const ERR_DECRYPTION_FAILED: &str = "Decryption failed";
    pub const ERR_RANDOM_SOURCE: &str = "Operating system random source unavailable";

    /// Synchronization errors
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";

    /// Handshake-specific errors
    pub const ERR_SYSTEM_TIME: &str = "System time error: time went backwards";
    pub const ERR_INVALID_TIMESTAMP: &str = "Invalid or stale timestamp";
    pub const ERR_REPLAY_ATTACK: &str = "Replay attack detected - nonce/timestamp already seen";
    pub const ERR_UNTRUSTED_PEER: &str = "Peer public key is not trusted";
    pub const ERR_ADDRESS_NOT_ALLOWED: &str = "Peer address is not allowed";
    pub const ERR_SERVER_PROOF_FAILED: &str = "Client failed to verify server key proof";
    pub const ERR_CLIENT_PROOF_FAILED: &str = "Server failed to verify client key proof";
    pub const ERR_UNEXPECTED_HANDSHAKE: &str = "Unexpected handshake message";
}

/// BridgeError is the primary error type for all bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bad key or text encoding
    #[error("Format error: {0}")]
    Format(String),

    /// Serialization format that the bridge does not speak
    #[error("Unsupported serialization format: {0}")]
    UnsupportedFormat(String),

    /// Malformed schema-binary payload
    #[error("Schema decode error: {0}")]
    Decode(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    /// Malformed JSON or MessagePack payload
    #[error("Deserialize error: {0}")]
    Deserialize(String),

    #[error("{}", constants::ERR_TOKEN_EXPIRED)]
    Expired,

    #[error("{}", constants::ERR_TOKEN_INVALID)]
    InvalidToken,

    #[error("{}", constants::ERR_UNKNOWN_OPERATION)]
    UnknownOperation(String),

    /// Business logic failure reported by a handler
    #[error("{0}")]
    Handler(String),

    #[error("{}", constants::ERR_BREAKER_OPEN)]
    BreakerOpen,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid protocol header")]
    InvalidHeader,

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Decryption failed")]
    DecryptionFailure,

    /// Frame number differs from the next one expected in that direction
    #[error("Frame out of sequence: expected {expected}, got {got}")]
    OutOfSequence { expected: u64, got: u64 },

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{}", constants::ERR_MAX_RETRIES)]
    MaxRetriesExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Whether a client should try the exchange again.
    ///
    /// Only connection-level and decoding problems are transient; anything the
    /// peer answered deliberately is a request-level outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Io(_)
                | BridgeError::Transport(_)
                | BridgeError::ConnectionClosed
                | BridgeError::InvalidHeader
                | BridgeError::UnsupportedVersion(_)
                | BridgeError::OversizedPacket(_)
                | BridgeError::DecryptionFailure
                | BridgeError::OutOfSequence { .. }
                | BridgeError::EncryptionFailure
                | BridgeError::Handshake(_)
                | BridgeError::Timeout
                | BridgeError::Decode(_)
                | BridgeError::Deserialize(_)
        )
    }
}

/// Type alias for Results using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_messages_match_peer_wording() {
        assert_eq!(BridgeError::Expired.to_string(), "JWT expired");
        assert_eq!(BridgeError::InvalidToken.to_string(), "Invalid JWT");
        assert_eq!(
            BridgeError::UnknownOperation("x".into()).to_string(),
            "Unknown operation"
        );
        assert_eq!(
            BridgeError::MaxRetriesExceeded.to_string(),
            "Max retries exceeded"
        );
    }

    #[test]
    fn test_retry_classification() {
        assert!(BridgeError::Timeout.is_retryable());
        assert!(BridgeError::ConnectionClosed.is_retryable());
        assert!(BridgeError::Decode("short".into()).is_retryable());
        assert!(BridgeError::Io(io::Error::other("reset")).is_retryable());

        assert!(!BridgeError::Expired.is_retryable());
        assert!(!BridgeError::InvalidToken.is_retryable());
        assert!(!BridgeError::BreakerOpen.is_retryable());
        assert!(!BridgeError::Handler("boom".into()).is_retryable());
        assert!(!BridgeError::UnknownOperation("x".into()).is_retryable());
    }
}
