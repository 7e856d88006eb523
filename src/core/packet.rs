//! Wire frame carried over the TCP stream.
//!
//! ```text
//! [Magic(4)] [Version(1)] [Length(4, big-endian)] [Payload(N)]
//! ```

use crate::config::{MAGIC_BYTES, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use crate::error::{BridgeError, Result};

/// Size of the fixed frame header.
pub const HEADER_SIZE: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub version: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload,
        }
    }

    /// Serialize header and payload into one buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&MAGIC_BYTES);
        out.push(self.version);
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Validate a header and return the announced payload length, which may
    /// not exceed `max_payload`.
    pub fn parse_header(header: &[u8], max_payload: usize) -> Result<usize> {
        if header.len() < HEADER_SIZE || header[0..4] != MAGIC_BYTES {
            return Err(BridgeError::InvalidHeader);
        }
        if header[4] != PROTOCOL_VERSION {
            return Err(BridgeError::UnsupportedVersion(header[4]));
        }
        let len = u32::from_be_bytes([header[5], header[6], header[7], header[8]]) as usize;
        if len > max_payload {
            return Err(BridgeError::OversizedPacket(len));
        }
        Ok(len)
    }

    /// Parse one complete frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let len = Self::parse_header(bytes, MAX_PAYLOAD_SIZE)?;
        let body = bytes
            .get(HEADER_SIZE..HEADER_SIZE + len)
            .ok_or(BridgeError::InvalidHeader)?;
        Ok(Self {
            version: bytes[4],
            payload: body.to_vec(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let packet = Packet::new(vec![1, 2, 3]);
        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE + 3);
        assert_eq!(Packet::from_bytes(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_truncated_body_rejected() {
        let mut bytes = Packet::new(vec![0u8; 10]).to_bytes();
        bytes.truncate(HEADER_SIZE + 4);
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(BridgeError::InvalidHeader)
        ));
    }
}
