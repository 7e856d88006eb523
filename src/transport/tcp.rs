//! # TCP Transport
//!
//! Establishes [`SecureConnection`]s over TCP: the client dials and initiates
//! the handshake, the server accepts and answers it. Handshake messages travel
//! as cleartext bincode packets; everything after is encrypted.
//!
//! Authentication failures end here. A peer that cannot complete the
//! handshake gets a `Reject` (when it is still worth telling it why) and a
//! closed socket, and never reaches the request cycle.

use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, instrument, warn};

use crate::core::codec::PacketCodec;
use crate::core::packet::Packet;
use crate::error::{constants, BridgeError, Result};
use crate::protocol::handshake::{
    client_handshake_init, client_handshake_verify, server_handshake_finalize,
    server_handshake_response, PeerTrust, SessionKeys, Side,
};
use crate::protocol::message::HandshakeMessage;
use crate::service::secure::SecureConnection;
use crate::utils::keys::KeyPair;
use crate::utils::replay_cache::ReplayCache;
use crate::utils::timeout::with_timeout_error;

/// Server-side admission policy applied during the handshake.
#[derive(Debug, Clone)]
pub struct Admission {
    pub trust: PeerTrust,
    /// Empty means every address may attempt a handshake.
    pub allowed_addresses: Vec<IpAddr>,
}

impl Admission {
    pub fn permits_address(&self, addr: &IpAddr) -> bool {
        self.allowed_addresses.is_empty() || self.allowed_addresses.contains(addr)
    }
}

async fn send_handshake(
    framed: &mut Framed<TcpStream, PacketCodec>,
    msg: &HandshakeMessage,
) -> Result<()> {
    let payload = bincode::serialize(msg).map_err(|e| BridgeError::Serialize(e.to_string()))?;
    framed.send(Packet::new(payload)).await
}

async fn recv_handshake(framed: &mut Framed<TcpStream, PacketCodec>) -> Result<HandshakeMessage> {
    let packet = framed.next().await.ok_or(BridgeError::ConnectionClosed)??;
    bincode::deserialize(&packet.payload)
        .map_err(|e| BridgeError::Handshake(format!("malformed handshake message: {e}")))
}

/// Dial `addr` and authenticate as `identity`, trusting only `server_key`.
/// Frames in either direction are limited to `max_payload` bytes.
#[instrument(skip(identity, server_key))]
pub async fn connect(
    addr: &str,
    identity: &KeyPair,
    server_key: &[u8; 32],
    connect_timeout: Duration,
    handshake_timeout: Duration,
    max_payload: usize,
) -> Result<SecureConnection> {
    let stream = with_timeout_error(
        async { TcpStream::connect(addr).await.map_err(BridgeError::from) },
        connect_timeout,
    )
    .await?;
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, PacketCodec::new(max_payload));

    let key = with_timeout_error(
        async {
            let (state, hello) = client_handshake_init(identity)?;
            send_handshake(&mut framed, &hello).await?;
            let response = recv_handshake(&mut framed).await?;
            let (key, finish) = client_handshake_verify(state, identity, server_key, response)?;
            send_handshake(&mut framed, &finish).await?;
            Ok(key)
        },
        handshake_timeout,
    )
    .await?;

    debug!(%addr, "Secure connection established");
    let keys = SessionKeys::split(&key, Side::Client);
    Ok(SecureConnection::new(framed, keys, *server_key))
}

/// Authenticate an accepted stream as `identity` under the admission policy.
#[instrument(skip(stream, identity, admission, replay_cache))]
pub async fn accept(
    stream: TcpStream,
    peer_addr: SocketAddr,
    identity: &KeyPair,
    admission: &Admission,
    replay_cache: &Mutex<ReplayCache>,
    handshake_timeout: Duration,
    max_payload: usize,
) -> Result<SecureConnection> {
    if !admission.permits_address(&peer_addr.ip()) {
        warn!(%peer_addr, "Dropping connection from address outside the allow-list");
        return Err(BridgeError::Handshake(constants::ERR_ADDRESS_NOT_ALLOWED.into()));
    }

    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, PacketCodec::new(max_payload));
    let peer_id = peer_addr.ip().to_string();

    let (key, client_key) = with_timeout_error(
        async {
            let hello = recv_handshake(&mut framed).await?;
            let response = {
                let mut cache = replay_cache
                    .lock()
                    .map_err(|_| BridgeError::Internal(constants::ERR_LOCK_POISONED.into()))?;
                server_handshake_response(identity, &admission.trust, hello, &peer_id, &mut cache)
            };
            let (state, reply) = match response {
                Ok(pair) => pair,
                Err(e) => {
                    let reject = HandshakeMessage::Reject {
                        reason: e.to_string(),
                    };
                    // Best effort; the peer may already be gone
                    let _ = send_handshake(&mut framed, &reject).await;
                    return Err(e);
                }
            };
            send_handshake(&mut framed, &reply).await?;
            let finish = recv_handshake(&mut framed).await?;
            server_handshake_finalize(state, finish)
        },
        handshake_timeout,
    )
    .await?;

    debug!(%peer_addr, "Peer authenticated");
    let keys = SessionKeys::split(&key, Side::Server);
    Ok(SecureConnection::new(framed, keys, client_key))
}
