//! Mutually authenticated key agreement using X25519 (x25519-dalek)
//!
//! Each endpoint holds a long-term static key pair and pins the static public
//! key of its peer. A connection runs three messages:
//!
//! ```text
//! client -> server  ClientHello  { S_c, E_c, timestamp, nonce_c }
//! server -> client  ServerHello  { E_s, nonce_s, proof_s }
//! client -> server  ClientFinish { proof_c }
//! ```
//!
//! The session key mixes three Diffie-Hellman results: `ee = DH(e_c, E_s)`,
//! `es = DH(e_c, S_s)` and `se = DH(s_c, E_s)`. Only the holder of the server's
//! static secret can compute `es`, only the holder of the client's can compute
//! `se`, so a valid proof from each side authenticates it. Replay of a
//! ClientHello is caught by timestamp freshness plus a nonce cache.
//!
//! Handshake state is per session: `ClientHandshakeState` and
//! `ServerHandshakeState` are passed through the flow by value.

use crate::error::{constants, BridgeError, Result};
use crate::protocol::message::HandshakeMessage;
use crate::utils::crypto::fill_random;
use crate::utils::keys::KeyPair;
use crate::utils::replay_cache::ReplayCache;
use crate::utils::time::current_timestamp_millis;
use hmac::{Hmac, Mac};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, ReusableSecret};
use zeroize::Zeroizing;

use tracing::{debug, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

const PROTOCOL_LABEL: &[u8] = b"secure-bridge handshake v1";
const SERVER_PROOF_LABEL: &[u8] = b"server proof";
const CLIENT_PROOF_LABEL: &[u8] = b"client proof";
const CLIENT_TO_SERVER_LABEL: &[u8] = b"client to server";
const SERVER_TO_CLIENT_LABEL: &[u8] = b"server to client";

/// Maximum age of a ClientHello timestamp in seconds.
pub const MAX_HELLO_AGE_SECS: u64 = 30;

/// Which client identities a server accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerTrust {
    /// Only the configured peer public key.
    Pinned([u8; 32]),
    /// Any client that completes the handshake.
    AllowAny,
}

impl PeerTrust {
    pub fn permits(&self, key: &[u8; 32]) -> bool {
        match self {
            PeerTrust::Pinned(pinned) => pinned == key,
            PeerTrust::AllowAny => true,
        }
    }
}

/// Which end of the handshake a connection is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

/// Frame keys for one connection, one per direction. A frame sealed by one
/// side never opens under that side's own receive key.
pub struct SessionKeys {
    pub send: Zeroizing<[u8; 32]>,
    pub recv: Zeroizing<[u8; 32]>,
}

impl SessionKeys {
    /// Split the handshake's session key into directional keys for `side`.
    pub fn split(session_key: &[u8; 32], side: Side) -> Self {
        let to_server = direction_key(session_key, CLIENT_TO_SERVER_LABEL);
        let to_client = direction_key(session_key, SERVER_TO_CLIENT_LABEL);
        match side {
            Side::Client => Self {
                send: to_server,
                recv: to_client,
            },
            Side::Server => Self {
                send: to_client,
                recv: to_server,
            },
        }
    }
}

fn direction_key(session_key: &[u8; 32], label: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(PROTOCOL_LABEL);
    hasher.update(label);
    hasher.update(session_key);
    Zeroizing::new(hasher.finalize().into())
}

/// Client-side handshake state - passed through the handshake flow
pub struct ClientHandshakeState {
    ephemeral: ReusableSecret,
    ephemeral_public: [u8; 32],
    static_public: [u8; 32],
    timestamp: u64,
    nonce: [u8; 16],
}

impl ClientHandshakeState {
    /// Get reference to client nonce (for testing)
    #[cfg(test)]
    pub fn client_nonce(&self) -> &[u8; 16] {
        &self.nonce
    }
}

/// Server-side handshake state - passed through the handshake flow
pub struct ServerHandshakeState {
    session_key: Zeroizing<[u8; 32]>,
    transcript: [u8; 32],
    client_static: [u8; 32],
}

impl ServerHandshakeState {
    /// The client's authenticated static key, once finalized.
    pub fn client_static(&self) -> &[u8; 32] {
        &self.client_static
    }
}

/// Verify that a timestamp is recent enough
/// Rejects timestamps older than `max_age_seconds` or more than 2 seconds in the future
pub fn verify_timestamp(timestamp: u64, max_age_seconds: u64) -> bool {
    let current = match current_timestamp_millis() {
        Ok(time) => time,
        Err(_) => return false,
    };

    let max_age_ms = max_age_seconds * 1000;
    const FUTURE_TOLERANCE_MS: u64 = 2000;

    if timestamp > current + FUTURE_TOLERANCE_MS {
        return false;
    }

    if current > timestamp && current - timestamp > max_age_ms {
        return false;
    }

    true
}

fn generate_nonce() -> Result<[u8; 16]> {
    let mut nonce = [0u8; 16];
    fill_random(&mut nonce)?;
    Ok(nonce)
}

/// Hash of everything both sides said, binding proofs to this exact exchange.
fn transcript_hash(
    client_static: &[u8; 32],
    client_ephemeral: &[u8; 32],
    timestamp: u64,
    client_nonce: &[u8; 16],
    server_static: &[u8; 32],
    server_ephemeral: &[u8; 32],
    server_nonce: &[u8; 16],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(PROTOCOL_LABEL);
    hasher.update(client_static);
    hasher.update(client_ephemeral);
    hasher.update(timestamp.to_be_bytes());
    hasher.update(client_nonce);
    hasher.update(server_static);
    hasher.update(server_ephemeral);
    hasher.update(server_nonce);
    hasher.finalize().into()
}

/// Derive the session key from the three shared secrets and the transcript
fn derive_session_key(
    ee: &[u8; 32],
    es: &[u8; 32],
    se: &[u8; 32],
    transcript: &[u8; 32],
) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(PROTOCOL_LABEL);
    hasher.update(b"ee");
    hasher.update(ee);
    hasher.update(b"es");
    hasher.update(es);
    hasher.update(b"se");
    hasher.update(se);
    hasher.update(transcript);
    Zeroizing::new(hasher.finalize().into())
}

fn key_proof(key: &[u8; 32], label: &[u8], transcript: &[u8; 32]) -> Result<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| BridgeError::Handshake(e.to_string()))?;
    mac.update(label);
    mac.update(transcript);
    Ok(mac.finalize().into_bytes().into())
}

fn verify_proof(key: &[u8; 32], label: &[u8], transcript: &[u8; 32], proof: &[u8; 32]) -> bool {
    match HmacSha256::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(label);
            mac.update(transcript);
            mac.verify_slice(proof).is_ok()
        }
        Err(_) => false,
    }
}

/// Initiates the handshake from the client side.
///
/// # Returns
/// A tuple of (new `ClientHandshakeState`, `HandshakeMessage::ClientHello`)
#[instrument(skip(identity))]
pub fn client_handshake_init(identity: &KeyPair) -> Result<(ClientHandshakeState, HandshakeMessage)> {
    let ephemeral = ReusableSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();
    let nonce = generate_nonce()?;
    let timestamp = current_timestamp_millis()?;
    let static_public = identity.public_bytes();

    debug!("Client initiating secure handshake");

    Ok((
        ClientHandshakeState {
            ephemeral,
            ephemeral_public,
            static_public,
            timestamp,
            nonce,
        },
        HandshakeMessage::ClientHello {
            static_key: static_public,
            ephemeral_key: ephemeral_public,
            timestamp,
            nonce,
        },
    ))
}

/// Server checks a ClientHello, derives the session key and proves it.
///
/// # Errors
/// Returns `BridgeError::Handshake` for stale timestamps, replays and
/// untrusted client keys.
#[instrument(skip(identity, trust, hello, replay_cache))]
pub fn server_handshake_response(
    identity: &KeyPair,
    trust: &PeerTrust,
    hello: HandshakeMessage,
    peer_id: &str,
    replay_cache: &mut ReplayCache,
) -> Result<(ServerHandshakeState, HandshakeMessage)> {
    let (client_static, client_ephemeral, timestamp, client_nonce) = match hello {
        HandshakeMessage::ClientHello {
            static_key,
            ephemeral_key,
            timestamp,
            nonce,
        } => (static_key, ephemeral_key, timestamp, nonce),
        _ => {
            return Err(BridgeError::Handshake(
                constants::ERR_UNEXPECTED_HANDSHAKE.into(),
            ))
        }
    };

    if !verify_timestamp(timestamp, MAX_HELLO_AGE_SECS) {
        return Err(BridgeError::Handshake(constants::ERR_INVALID_TIMESTAMP.into()));
    }

    // Untrusted keys never reach the cache, so they cannot evict real entries
    if !trust.permits(&client_static) {
        warn!(peer_id, "Rejecting handshake from untrusted key");
        return Err(BridgeError::Handshake(constants::ERR_UNTRUSTED_PEER.into()));
    }

    if replay_cache.is_replay(peer_id, &client_nonce, timestamp) {
        return Err(BridgeError::Handshake(constants::ERR_REPLAY_ATTACK.into()));
    }

    let ephemeral = ReusableSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();
    let server_nonce = generate_nonce()?;

    let client_ephemeral_key = PublicKey::from(client_ephemeral);
    let client_static_key = PublicKey::from(client_static);

    let ee = ephemeral.diffie_hellman(&client_ephemeral_key);
    let es = identity.secret().diffie_hellman(&client_ephemeral_key);
    let se = ephemeral.diffie_hellman(&client_static_key);

    let transcript = transcript_hash(
        &client_static,
        &client_ephemeral,
        timestamp,
        &client_nonce,
        &identity.public_bytes(),
        &ephemeral_public,
        &server_nonce,
    );
    let session_key = derive_session_key(ee.as_bytes(), es.as_bytes(), se.as_bytes(), &transcript);
    let proof = key_proof(&session_key, SERVER_PROOF_LABEL, &transcript)?;

    debug!("Server responding to handshake initiation");

    Ok((
        ServerHandshakeState {
            session_key,
            transcript,
            client_static,
        },
        HandshakeMessage::ServerHello {
            ephemeral_key: ephemeral_public,
            nonce: server_nonce,
            proof,
        },
    ))
}

/// Client verifies the server's proof against the pinned server key,
/// derives the session key and produces its own proof.
///
/// # Returns
/// The session key and `HandshakeMessage::ClientFinish`
///
/// # Errors
/// Returns `BridgeError::Handshake` if the server cannot prove the key, which
/// is what happens when it does not hold the pinned static secret.
#[instrument(skip(state, identity, server_static, response))]
pub fn client_handshake_verify(
    state: ClientHandshakeState,
    identity: &KeyPair,
    server_static: &[u8; 32],
    response: HandshakeMessage,
) -> Result<(Zeroizing<[u8; 32]>, HandshakeMessage)> {
    let (server_ephemeral, server_nonce, proof) = match response {
        HandshakeMessage::ServerHello {
            ephemeral_key,
            nonce,
            proof,
        } => (ephemeral_key, nonce, proof),
        HandshakeMessage::Reject { reason } => return Err(BridgeError::Handshake(reason)),
        _ => {
            return Err(BridgeError::Handshake(
                constants::ERR_UNEXPECTED_HANDSHAKE.into(),
            ))
        }
    };

    let server_ephemeral_key = PublicKey::from(server_ephemeral);
    let server_static_key = PublicKey::from(*server_static);

    let ee = state.ephemeral.diffie_hellman(&server_ephemeral_key);
    let es = state.ephemeral.diffie_hellman(&server_static_key);
    let se = identity.secret().diffie_hellman(&server_ephemeral_key);

    let transcript = transcript_hash(
        &state.static_public,
        &state.ephemeral_public,
        state.timestamp,
        &state.nonce,
        server_static,
        &server_ephemeral,
        &server_nonce,
    );
    let session_key = derive_session_key(ee.as_bytes(), es.as_bytes(), se.as_bytes(), &transcript);

    if !verify_proof(&session_key, SERVER_PROOF_LABEL, &transcript, &proof) {
        return Err(BridgeError::Handshake(constants::ERR_SERVER_PROOF_FAILED.into()));
    }

    let finish = key_proof(&session_key, CLIENT_PROOF_LABEL, &transcript)?;

    debug!("Client verified server response");

    Ok((session_key, HandshakeMessage::ClientFinish { proof: finish }))
}

/// Server verifies the client's proof and releases the session key.
///
/// # Errors
/// Returns `BridgeError::Handshake` if the client does not hold its static secret.
#[instrument(skip(state, finish))]
pub fn server_handshake_finalize(
    state: ServerHandshakeState,
    finish: HandshakeMessage,
) -> Result<(Zeroizing<[u8; 32]>, [u8; 32])> {
    let proof = match finish {
        HandshakeMessage::ClientFinish { proof } => proof,
        _ => {
            return Err(BridgeError::Handshake(
                constants::ERR_UNEXPECTED_HANDSHAKE.into(),
            ))
        }
    };

    if !verify_proof(&state.session_key, CLIENT_PROOF_LABEL, &state.transcript, &proof) {
        return Err(BridgeError::Handshake(constants::ERR_CLIENT_PROOF_FAILED.into()));
    }

    debug!("Server finalized handshake and derived session key");

    Ok((state.session_key, state.client_static))
}
