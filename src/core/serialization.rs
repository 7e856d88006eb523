//! # Serialization Formats
//!
//! Abstraction over the wire formats a bridge peer may speak.
//! Supports JSON (structured text, default), MessagePack (compact binary) and a
//! schema-typed bincode encoding (schema binary).
//!
//! ## Features
//! - **Multiple formats**: selected per call, announced by a format byte
//! - **Distinct failures**: malformed schema payloads surface as
//!   `BridgeError::Decode`, malformed JSON/MessagePack as
//!   `BridgeError::Deserialize`, unknown formats as
//!   `BridgeError::UnsupportedFormat`
//! - **Round-trip law**: `decode(encode(v, f), f) == v` for every format
//!
//! ## Usage
//! ```rust
//! use secure_bridge::core::serialization::{decode, encode, WireFormat};
//! use serde_json::json;
//!
//! let value = json!({"a": 5, "b": [1, 2, 3]});
//! for format in WireFormat::ALL {
//!     let bytes = encode(&value, format).unwrap();
//!     assert_eq!(decode(&bytes, format).unwrap(), value);
//! }
//! ```

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::schema::{exceeds_max_depth, SchemaValue, MAX_DEPTH, SCHEMA_REVISION};
use crate::error::{BridgeError, Result};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Supported serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WireFormat {
    /// Human-readable JSON (default, interop with every peer)
    #[default]
    Json,
    /// Compact binary MessagePack
    MessagePack,
    /// Schema-typed binary encoding
    Schema,
}

impl WireFormat {
    pub const ALL: [WireFormat; 3] = [WireFormat::Json, WireFormat::MessagePack, WireFormat::Schema];

    /// Get the format identifier byte for the wire protocol
    pub fn format_byte(self) -> u8 {
        match self {
            WireFormat::Json => 0x01,
            WireFormat::MessagePack => 0x02,
            WireFormat::Schema => 0x03,
        }
    }

    /// Detect format from identifier byte
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(WireFormat::Json),
            0x02 => Ok(WireFormat::MessagePack),
            0x03 => Ok(WireFormat::Schema),
            other => Err(BridgeError::UnsupportedFormat(format!(
                "format byte 0x{other:02x}"
            ))),
        }
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            WireFormat::Json => "json",
            WireFormat::MessagePack => "msgpack",
            WireFormat::Schema => "schema",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WireFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "structured-text" => Ok(WireFormat::Json),
            "msgpack" | "messagepack" | "compact-binary" => Ok(WireFormat::MessagePack),
            "schema" | "protobuf" | "schema-binary" => Ok(WireFormat::Schema),
            _ => Err(BridgeError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Decoding is bounded by the input itself; encoding by the frame ceiling.
/// Configured frame limits below that are enforced by the codec on send.
fn schema_options(limit: usize) -> impl Options {
    bincode::DefaultOptions::new().with_limit(limit as u64)
}

fn encode_schema(value: &Value) -> Result<Vec<u8>> {
    if exceeds_max_depth(value) {
        return Err(BridgeError::Serialize(format!(
            "value nested deeper than {MAX_DEPTH} levels"
        )));
    }
    let lowered = SchemaValue::from(value);
    let body = schema_options(MAX_PAYLOAD_SIZE)
        .serialize(&lowered)
        .map_err(|e| BridgeError::Serialize(e.to_string()))?;
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(SCHEMA_REVISION);
    out.extend_from_slice(&body);
    Ok(out)
}

fn decode_schema(data: &[u8]) -> Result<Value> {
    let (&revision, body) = data
        .split_first()
        .ok_or_else(|| BridgeError::Decode("empty schema payload".to_string()))?;
    if revision != SCHEMA_REVISION {
        return Err(BridgeError::Decode(format!(
            "unknown schema revision {revision}"
        )));
    }
    let lowered: SchemaValue = schema_options(body.len())
        .deserialize(body)
        .map_err(|e| BridgeError::Decode(e.to_string()))?;
    Ok(lowered.into())
}

/// Encode a structured value in the given format.
pub fn encode(value: &Value, format: WireFormat) -> Result<Vec<u8>> {
    match format {
        WireFormat::Json => {
            serde_json::to_vec(value).map_err(|e| BridgeError::Serialize(e.to_string()))
        }
        WireFormat::MessagePack => {
            rmp_serde::to_vec_named(value).map_err(|e| BridgeError::Serialize(e.to_string()))
        }
        WireFormat::Schema => encode_schema(value),
    }
}

/// Decode a structured value from the given format.
pub fn decode(data: &[u8], format: WireFormat) -> Result<Value> {
    match format {
        WireFormat::Json => {
            serde_json::from_slice(data).map_err(|e| BridgeError::Deserialize(e.to_string()))
        }
        WireFormat::MessagePack => {
            rmp_serde::from_slice(data).map_err(|e| BridgeError::Deserialize(e.to_string()))
        }
        WireFormat::Schema => decode_schema(data),
    }
}

/// Encode with a format named at runtime, e.g. from a caller's configuration.
pub fn encode_named(value: &Value, format: &str) -> Result<Vec<u8>> {
    encode(value, format.parse()?)
}

/// Decode with a format named at runtime.
pub fn decode_named(data: &[u8], format: &str) -> Result<Value> {
    decode(data, format.parse()?)
}

/// Trait for message types that travel in any [`WireFormat`]
pub trait MultiFormat: Serialize + DeserializeOwned + Sized {
    /// Serialize to bytes using the specified format
    fn serialize_format(&self, format: WireFormat) -> Result<Vec<u8>> {
        match format {
            WireFormat::Json => {
                serde_json::to_vec(self).map_err(|e| BridgeError::Serialize(e.to_string()))
            }
            WireFormat::MessagePack => {
                rmp_serde::to_vec_named(self).map_err(|e| BridgeError::Serialize(e.to_string()))
            }
            WireFormat::Schema => {
                let value =
                    serde_json::to_value(self).map_err(|e| BridgeError::Serialize(e.to_string()))?;
                encode_schema(&value)
            }
        }
    }

    /// Serialize to bytes with format header
    fn serialize_with_header(&self, format: WireFormat) -> Result<Vec<u8>> {
        let mut data = vec![format.format_byte()];
        let mut payload = self.serialize_format(format)?;
        data.append(&mut payload);
        Ok(data)
    }

    /// Deserialize from bytes using the specified format
    fn deserialize_format(data: &[u8], format: WireFormat) -> Result<Self> {
        match format {
            WireFormat::Json => {
                serde_json::from_slice(data).map_err(|e| BridgeError::Deserialize(e.to_string()))
            }
            WireFormat::MessagePack => {
                rmp_serde::from_slice(data).map_err(|e| BridgeError::Deserialize(e.to_string()))
            }
            WireFormat::Schema => {
                let value = decode_schema(data)?;
                serde_json::from_value(value).map_err(|e| BridgeError::Decode(e.to_string()))
            }
        }
    }

    /// Deserialize from bytes with format header
    fn deserialize_with_header(data: &[u8]) -> Result<(Self, WireFormat)> {
        let (&byte, body) = data
            .split_first()
            .ok_or_else(|| BridgeError::Deserialize("Empty data".to_string()))?;
        let format = WireFormat::from_byte(byte)?;
        let value = Self::deserialize_format(body, format)?;
        Ok((value, format))
    }
}
