//! Messages exchanged by bridge endpoints.
//!
//! [`Request`] and [`Response`] are the application messages; they travel
//! encrypted, in whichever [`WireFormat`](crate::core::serialization::WireFormat)
//! the client picked. [`HandshakeMessage`] is the cleartext key agreement that
//! precedes them on every connection.

use crate::core::serialization::MultiFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request for a named operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub operation: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, alias = "payload")]
    pub data: Value,
}

impl Request {
    pub fn new(operation: impl Into<String>, token: impl Into<String>, data: Value) -> Self {
        Self {
            operation: operation.into(),
            token: token.into(),
            data,
        }
    }
}

impl MultiFormat for Request {}

/// Outcome of a request, tagged by `status` on the wire:
/// `{"status":"success","data":…}` or `{"status":"error","message":…}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Success {
        #[serde(default)]
        data: Value,
    },
    Error {
        message: String,
    },
}

impl Response {
    pub fn success(data: Value) -> Self {
        Response::Success { data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    /// Result data, if the request succeeded.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Response::Success { data } => Some(data),
            Response::Error { .. } => None,
        }
    }

    /// Error message, if the request failed.
    pub fn message(&self) -> Option<&str> {
        match self {
            Response::Success { .. } => None,
            Response::Error { message } => Some(message),
        }
    }
}

impl MultiFormat for Response {}

/// Cleartext key agreement messages, bincode encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeMessage {
    /// Client announces its static identity and a fresh ephemeral key.
    ClientHello {
        static_key: [u8; 32],
        ephemeral_key: [u8; 32],
        timestamp: u64,
        nonce: [u8; 16],
    },
    /// Server answers with its ephemeral key and proves it holds the session key.
    ServerHello {
        ephemeral_key: [u8; 32],
        nonce: [u8; 16],
        proof: [u8; 32],
    },
    /// Client proves it holds the session key.
    ClientFinish { proof: [u8; 32] },
    /// Server refuses the connection.
    Reject { reason: String },
}
