//! # Authorization Tokens
//!
//! Compact HS256 JWTs that authorize individual requests on top of the
//! connection-level handshake.
//!
//! A [`TokenAuthority`] holds the signing secret. The secret is replaced on a
//! fixed interval by [`TokenAuthority::spawn_rotation`]; tokens signed under a
//! replaced secret stop validating, unless the authority was built to accept
//! the immediately previous secret as well.
//!
//! Issue and validate each take one snapshot of the secret set, so a rotation
//! landing mid-validation cannot mix two secrets.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};
use zeroize::Zeroizing;

use crate::config::TokenConfig;
use crate::error::{constants, BridgeError, Result};
use crate::utils::crypto::fill_random;
use crate::utils::time::current_timestamp_secs;

type HmacSha256 = Hmac<Sha256>;

/// Length of generated signing secrets in bytes.
pub const SECRET_LEN: usize = 64;

/// Claims carried by every issued token.
pub type Claims = Map<String, Value>;

struct SecretSet {
    current: Zeroizing<Vec<u8>>,
    previous: Option<Zeroizing<Vec<u8>>>,
    rotated_at: u64,
}

/// Issues and validates request tokens under a rotating secret.
pub struct TokenAuthority {
    secrets: RwLock<Arc<SecretSet>>,
    ttl: Duration,
    accept_previous: bool,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("ttl", &self.ttl)
            .field("accept_previous", &self.accept_previous)
            .finish_non_exhaustive()
    }
}

fn random_secret() -> Result<Zeroizing<Vec<u8>>> {
    let mut secret = Zeroizing::new(vec![0u8; SECRET_LEN]);
    fill_random(&mut secret)?;
    Ok(secret)
}

fn sign(secret: &[u8], signing_input: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| BridgeError::Internal(format!("HMAC key rejected: {e}")))?;
    mac.update(signing_input.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn signature_matches(secret: &[u8], signing_input: &str, signature: &[u8]) -> bool {
    match HmacSha256::new_from_slice(secret) {
        Ok(mut mac) => {
            mac.update(signing_input.as_bytes());
            mac.verify_slice(signature).is_ok()
        }
        Err(_) => false,
    }
}

fn decode_segment(segment: &str) -> Result<Value> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| BridgeError::InvalidToken)?;
    serde_json::from_slice(&bytes).map_err(|_| BridgeError::InvalidToken)
}

impl TokenAuthority {
    /// Authority with a fresh OS-random secret.
    pub fn new(config: &TokenConfig) -> Result<Self> {
        Self::build(random_secret()?, config)
    }

    /// Authority whose first secret is `seed`; later rotations are random.
    pub fn with_seed(seed: &[u8], config: &TokenConfig) -> Result<Self> {
        if seed.is_empty() {
            return Err(BridgeError::Config("token seed cannot be empty".into()));
        }
        Self::build(Zeroizing::new(seed.to_vec()), config)
    }

    fn build(secret: Zeroizing<Vec<u8>>, config: &TokenConfig) -> Result<Self> {
        Ok(Self {
            secrets: RwLock::new(Arc::new(SecretSet {
                current: secret,
                previous: None,
                rotated_at: current_timestamp_secs()?,
            })),
            ttl: config.ttl,
            accept_previous: config.accept_previous_secret,
        })
    }

    fn snapshot(&self) -> Result<Arc<SecretSet>> {
        self.secrets
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| BridgeError::Internal(constants::ERR_LOCK_POISONED.into()))
    }

    /// Sign `claims` with `iat` set to now and `exp` one TTL later.
    pub fn issue(&self, claims: Claims) -> Result<String> {
        let secrets = self.snapshot()?;
        let now = current_timestamp_secs()?;

        let mut payload = claims;
        payload.insert("iat".into(), json!(now));
        payload.insert("exp".into(), json!(now + self.ttl.as_secs()));

        let header = json!({"alg": "HS256", "typ": "JWT"});
        let header = serde_json::to_vec(&header).map_err(|e| BridgeError::Serialize(e.to_string()))?;
        let payload =
            serde_json::to_vec(&payload).map_err(|e| BridgeError::Serialize(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let signature = sign(&secrets.current, &signing_input)?;
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Token with no claims beyond `iat` and `exp`.
    pub fn issue_default(&self) -> Result<String> {
        self.issue(Claims::new())
    }

    /// Check signature then expiry, returning the claims.
    ///
    /// The signature is checked first so a forged token never learns whether
    /// its `exp` would have passed.
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let secrets = self.snapshot()?;

        let mut parts = token.split('.');
        let (header, payload, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(BridgeError::InvalidToken),
        };

        if decode_segment(header)?.get("alg").and_then(Value::as_str) != Some("HS256") {
            return Err(BridgeError::InvalidToken);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| BridgeError::InvalidToken)?;
        let signing_input = &token[..header.len() + 1 + payload.len()];

        let verified = signature_matches(&secrets.current, signing_input, &signature)
            || (self.accept_previous
                && secrets
                    .previous
                    .as_ref()
                    .is_some_and(|prev| signature_matches(prev, signing_input, &signature)));
        if !verified {
            return Err(BridgeError::InvalidToken);
        }

        let claims = match decode_segment(payload)? {
            Value::Object(map) => map,
            _ => return Err(BridgeError::InvalidToken),
        };
        let exp = claims
            .get("exp")
            .and_then(Value::as_u64)
            .ok_or(BridgeError::InvalidToken)?;
        if current_timestamp_secs()? > exp {
            return Err(BridgeError::Expired);
        }

        Ok(claims)
    }

    /// Install a fresh random secret.
    pub fn rotate(&self) -> Result<()> {
        let fresh = random_secret()?;
        let rotated_at = current_timestamp_secs()?;
        let mut guard = self
            .secrets
            .write()
            .map_err(|_| BridgeError::Internal(constants::ERR_LOCK_POISONED.into()))?;
        let previous = self.accept_previous.then(|| guard.current.clone());
        *guard = Arc::new(SecretSet {
            current: fresh,
            previous,
            rotated_at,
        });
        debug!(rotated_at, "Token secret rotated");
        Ok(())
    }

    /// UNIX seconds of the last rotation (construction counts as one).
    pub fn last_rotation(&self) -> Result<u64> {
        Ok(self.snapshot()?.rotated_at)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Rotate every `interval` until `shutdown_rx` fires or its sender drops.
    #[instrument(skip(self, shutdown_rx))]
    pub fn spawn_rotation(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> JoinHandle<()> {
        let authority = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            info!(interval_secs = interval.as_secs(), "Token rotation started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Token rotation stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = authority.rotate() {
                            error!(error = %e, "Token rotation failed; keeping current secret");
                        }
                    }
                }
            }
        })
    }
}
