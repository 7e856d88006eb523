//! Static X25519 identities used for transport-level mutual authentication.
//!
//! A bridge endpoint owns one [`KeyPair`] and pins the public key of the one
//! peer it trusts. Keys travel between parties as Z85 text.

use crate::error::{BridgeError, Result};
use crate::utils::z85::{self, KEY_BYTES};
use rand_core::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Generate a fresh key pair and return it as `(private_text, public_text)`.
///
/// Every call draws from the operating system's CSPRNG.
pub fn generate_keypair() -> Result<(String, String)> {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    let secret_bytes = Zeroizing::new(secret.to_bytes());
    Ok((z85::encode(&secret_bytes[..])?, z85::encode(public.as_bytes())?))
}

/// An endpoint's own static key pair.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Build a key pair from Z85 text.
    ///
    /// When `public_text` is given it must match the public key derived from
    /// the private key; a mismatched pair would fail every handshake later.
    ///
    /// # Errors
    /// Returns `BridgeError::Format` for undecodable text and
    /// `BridgeError::Config` for a mismatched pair.
    pub fn from_z85(private_text: &str, public_text: Option<&str>) -> Result<Self> {
        let raw = Zeroizing::new(z85::decode_key(private_text)?);
        let secret = StaticSecret::from(*raw);
        let public = PublicKey::from(&secret);

        if let Some(text) = public_text {
            let claimed = z85::decode_key(text)?;
            if claimed != *public.as_bytes() {
                return Err(BridgeError::Config(
                    "public key does not belong to the configured private key".to_string(),
                ));
            }
        }

        Ok(Self { secret, public })
    }

    /// The raw public key.
    pub fn public_bytes(&self) -> [u8; KEY_BYTES] {
        self.public.to_bytes()
    }

    /// The public key as Z85 text, suitable for a discovery endpoint.
    pub fn public_text(&self) -> String {
        // 32 is a multiple of 4
        z85::encode(self.public.as_bytes()).unwrap_or_default()
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    /// Render the keys for diagnostics. The private key is masked.
    pub fn describe(&self, peer: Option<&[u8; KEY_BYTES]>) -> String {
        let peer_text = peer
            .and_then(|p| z85::encode(p).ok())
            .unwrap_or_else(|| "<none>".to_string());
        let public = self.public_text();
        format!(
            "private=<{} bytes masked> public={} peer={}",
            KEY_BYTES, public, peer_text
        )
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_text())
            .finish_non_exhaustive()
    }
}
