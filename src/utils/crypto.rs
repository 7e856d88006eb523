//! XChaCha20-Poly1305 frame encryption for established sessions.
//!
//! Each direction of a session has its own key, and frames in a direction are
//! numbered from zero. The frame number is the nonce, so a key never sees the
//! same nonce twice and a copied frame cannot decrypt at another position.

use crate::error::{constants, BridgeError, Result};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};

/// Nonce length for XChaCha20-Poly1305.
pub const NONCE_LEN: usize = 24;

/// Length of the frame sequence number carried in front of the ciphertext.
pub const SEQUENCE_LEN: usize = 8;

/// AEAD cipher bound to one session key.
pub struct Crypto {
    cipher: XChaCha20Poly1305,
}

impl Crypto {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Nonce for frame number `sequence`: zero padded, big-endian counter last.
    pub fn sequence_nonce(sequence: u64) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[NONCE_LEN - SEQUENCE_LEN..].copy_from_slice(&sequence.to_be_bytes());
        nonce
    }

    pub fn encrypt(&self, plaintext: &[u8], nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(XNonce::from_slice(nonce), plaintext)
            .map_err(|_| BridgeError::EncryptionFailure)
    }

    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>> {
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| BridgeError::DecryptionFailure)
    }
}

/// Fill a buffer from the operating system CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    getrandom::fill(buf).map_err(|e| {
        BridgeError::Internal(format!("{}: {e}", constants::ERR_RANDOM_SOURCE))
    })
}
