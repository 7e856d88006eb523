use crate::core::codec::PacketCodec;
use crate::core::packet::Packet;
use crate::error::{BridgeError, Result};
use crate::protocol::handshake::SessionKeys;
use crate::utils::crypto::{Crypto, SEQUENCE_LEN};
use crate::utils::timeout::{with_timeout_error, DEFAULT_TIMEOUT};

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, instrument, warn};

/// An authenticated, encrypted connection to one peer.
///
/// Frames carry `[sequence(8, big-endian)][ciphertext]`. Each direction has
/// its own key and counts frames from zero; a frame is only accepted at the
/// exact position it was sealed for. A replayed, dropped, reordered or
/// reflected frame ends the connection, and the transport never yields bytes
/// that failed authentication.
pub struct SecureConnection {
    framed: Framed<TcpStream, PacketCodec>,
    sealer: Crypto,
    opener: Crypto,
    send_sequence: u64,
    recv_sequence: u64,
    peer_key: [u8; 32],
    peer_addr: Option<SocketAddr>,
    send_timeout: Duration,
    recv_timeout: Option<Duration>,
}

impl SecureConnection {
    /// Wrap a stream that finished its handshake. The directional keys are
    /// dropped (and zeroed) once the ciphers hold them.
    pub fn new(framed: Framed<TcpStream, PacketCodec>, keys: SessionKeys, peer_key: [u8; 32]) -> Self {
        let peer_addr = framed.get_ref().peer_addr().ok();
        Self {
            framed,
            sealer: Crypto::new(&keys.send),
            opener: Crypto::new(&keys.recv),
            send_sequence: 0,
            recv_sequence: 0,
            peer_key,
            peer_addr,
            send_timeout: DEFAULT_TIMEOUT,
            recv_timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Set custom timeout durations. `None` waits for the next frame forever,
    /// which is what a server waiting between requests wants.
    pub fn with_timeouts(mut self, send_timeout: Duration, recv_timeout: Option<Duration>) -> Self {
        self.send_timeout = send_timeout;
        self.recv_timeout = recv_timeout;
        self
    }

    /// Static public key the peer proved during the handshake.
    pub fn peer_key(&self) -> &[u8; 32] {
        &self.peer_key
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Seal `data` as the next outgoing frame.
    fn seal(&mut self, data: &[u8]) -> Result<Packet> {
        let sequence = self.send_sequence;
        let ciphertext = self.sealer.encrypt(data, &Crypto::sequence_nonce(sequence))?;
        self.send_sequence = sequence
            .checked_add(1)
            .ok_or(BridgeError::EncryptionFailure)?;

        let mut payload = Vec::with_capacity(SEQUENCE_LEN + ciphertext.len());
        payload.extend_from_slice(&sequence.to_be_bytes());
        payload.extend(ciphertext);
        Ok(Packet::new(payload))
    }

    /// Open an incoming frame, which must be the next one in sequence.
    fn open(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < SEQUENCE_LEN {
            return Err(BridgeError::DecryptionFailure);
        }
        let (sequence_bytes, ciphertext) = payload.split_at(SEQUENCE_LEN);
        let mut raw = [0u8; SEQUENCE_LEN];
        raw.copy_from_slice(sequence_bytes);
        let sequence = u64::from_be_bytes(raw);

        if sequence != self.recv_sequence {
            warn!(
                expected = self.recv_sequence,
                got = sequence,
                "Dropping frame out of sequence"
            );
            return Err(BridgeError::OutOfSequence {
                expected: self.recv_sequence,
                got: sequence,
            });
        }

        let plaintext = self
            .opener
            .decrypt(ciphertext, &Crypto::sequence_nonce(sequence))?;
        self.recv_sequence = sequence
            .checked_add(1)
            .ok_or(BridgeError::DecryptionFailure)?;
        Ok(plaintext)
    }

    #[instrument(skip(self, data), fields(len = data.len()), level = "debug")]
    pub async fn send_bytes(&mut self, data: &[u8]) -> Result<()> {
        let packet = self.seal(data)?;
        let limit = self.send_timeout;
        let framed = &mut self.framed;
        with_timeout_error(
            async {
                framed.send(packet).await?;
                Ok(())
            },
            limit,
        )
        .await
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn recv_bytes(&mut self) -> Result<Vec<u8>> {
        let framed = &mut self.framed;
        let next = async {
            framed
                .next()
                .await
                .ok_or(BridgeError::ConnectionClosed)?
        };
        let pkt = match self.recv_timeout {
            Some(limit) => with_timeout_error(next, limit).await?,
            None => next.await?,
        };

        let plaintext = self.open(&pkt.payload)?;
        debug!(len = plaintext.len(), "Received secure frame");
        Ok(plaintext)
    }

    /// Send one request blob and wait for exactly one reply blob.
    pub async fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        self.send_bytes(request).await?;
        self.recv_bytes().await
    }

    pub async fn close(mut self) -> Result<()> {
        SinkExt::<Packet>::close(&mut self.framed).await
    }
}
