//! Tokio codec framing [`Packet`]s over a byte stream.

use crate::config::{MAGIC_BYTES, MAX_PAYLOAD_SIZE};
use crate::core::packet::{Packet, HEADER_SIZE};
use crate::error::BridgeError;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frames packets, refusing payloads above a configured size in both
/// directions. The limit never exceeds the wire format's 16 MB ceiling.
#[derive(Debug, Clone, Copy)]
pub struct PacketCodec {
    max_payload: usize,
}

impl PacketCodec {
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.min(MAX_PAYLOAD_SIZE),
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, BridgeError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let len = Packet::parse_header(&src[..HEADER_SIZE], self.max_payload)?;
        if src.len() < HEADER_SIZE + len {
            src.reserve(HEADER_SIZE + len - src.len());
            return Ok(None);
        }

        let version = src[4];
        src.advance(HEADER_SIZE);
        let payload = src.split_to(len).to_vec();
        Ok(Some(Packet { version, payload }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = BridgeError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), BridgeError> {
        if item.payload.len() > self.max_payload {
            return Err(BridgeError::OversizedPacket(item.payload.len()));
        }
        dst.reserve(HEADER_SIZE + item.payload.len());
        dst.put_slice(&MAGIC_BYTES);
        dst.put_u8(item.version);
        dst.put_u32(item.payload.len() as u32);
        dst.put_slice(&item.payload);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_frames_wait_for_more() {
        let mut codec = PacketCodec::default();
        let bytes = Packet::new(vec![5u8; 32]).to_bytes();

        let mut buf = BytesMut::from(&bytes[..4]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[4..20]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[20..]);
        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.payload, vec![5u8; 32]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Packet::new(vec![1]), &mut buf).unwrap();
        codec.encode(Packet::new(vec![2, 2]), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().payload, vec![1]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().payload, vec![2, 2]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_bad_magic_is_error() {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::from(&[0xFFu8; 16][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(BridgeError::InvalidHeader)
        ));
    }

    #[test]
    fn test_configured_limit_applies_both_ways() {
        let mut codec = PacketCodec::new(1024);
        let mut buf = BytesMut::new();
        assert!(matches!(
            codec.encode(Packet::new(vec![0u8; 1025]), &mut buf),
            Err(BridgeError::OversizedPacket(1025))
        ));
        codec.encode(Packet::new(vec![0u8; 1024]), &mut buf).unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().payload.len(), 1024);

        // A frame a default codec accepts is refused before its body arrives
        let bytes = Packet::new(vec![0u8; 2048]).to_bytes();
        let mut buf = BytesMut::from(&bytes[..HEADER_SIZE]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(BridgeError::OversizedPacket(2048))
        ));
    }

    #[test]
    fn test_limit_is_capped_at_frame_ceiling() {
        assert_eq!(PacketCodec::new(usize::MAX).max_payload(), MAX_PAYLOAD_SIZE);
    }
}
