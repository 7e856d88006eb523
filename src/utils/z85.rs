//! # Z85 Key Codec
//!
//! Textual encoding for key material exchanged out of band.
//!
//! Wraps the `z85` crate. Z85 packs every 4 binary bytes into 5 printable
//! ASCII characters, so a 32-byte key becomes a 40-character string that
//! survives copy/paste, config files and environment variables. Only whole
//! groups are accepted in either direction; the crate's padded tail form is
//! not part of the key format.
//!
//! ## Usage
//! ```rust
//! use secure_bridge::utils::z85;
//!
//! let text = z85::encode(&[0x86, 0x4F, 0xD2, 0x6F, 0xB5, 0x59, 0xF7, 0x5B]).unwrap();
//! assert_eq!(text, "HelloWorld");
//! assert_eq!(z85::decode(&text).unwrap().len(), 8);
//! ```

use crate::error::{BridgeError, Result};

/// Length of a raw key in bytes.
pub const KEY_BYTES: usize = 32;

/// Length of an encoded key in characters.
pub const KEY_TEXT_LEN: usize = KEY_BYTES / 4 * 5;

const ALPHABET: &[u8; 85] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ.-:+=^!/*?&<>()[]{}@%$#";

/// Encode binary data whose length is a multiple of 4.
///
/// # Errors
/// Returns `BridgeError::Format` if the input length is not a multiple of 4.
pub fn encode(data: &[u8]) -> Result<String> {
    if data.len() % 4 != 0 {
        return Err(BridgeError::Format(format!(
            "z85 input must be a multiple of 4 bytes, got {}",
            data.len()
        )));
    }
    Ok(::z85::encode(data))
}

/// Groups above `u32::MAX` have no 4-byte form; reject them before decoding.
fn check_group_range(text: &[u8]) -> Result<()> {
    for (index, group) in text.chunks_exact(5).enumerate() {
        let mut value: u64 = 0;
        for &c in group {
            match ALPHABET.iter().position(|&a| a == c) {
                Some(digit) => value = value * 85 + digit as u64,
                // Left for the codec to report with its position
                None => return Ok(()),
            }
        }
        if value > u64::from(u32::MAX) {
            return Err(BridgeError::Format(format!(
                "z85 group {index} overflows 32 bits"
            )));
        }
    }
    Ok(())
}

/// Decode Z85 text back into bytes.
///
/// # Errors
/// Returns `BridgeError::Format` if the length is not a multiple of 5, a
/// character is outside the alphabet, or a group overflows 32 bits.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    if bytes.len() % 5 != 0 {
        return Err(BridgeError::Format(format!(
            "z85 text length must be a multiple of 5, got {}",
            bytes.len()
        )));
    }
    check_group_range(bytes)?;
    ::z85::decode(bytes).map_err(|e| BridgeError::Format(format!("invalid z85: {e:?}")))
}

/// Decode a 40-character key into exactly 32 raw bytes.
///
/// # Errors
/// Returns `BridgeError::Format` for invalid text or a wrong decoded length.
pub fn decode_key(text: &str) -> Result<[u8; KEY_BYTES]> {
    let bytes = decode(text.trim())?;
    let len = bytes.len();
    bytes.try_into().map_err(|_: Vec<u8>| {
        BridgeError::Format(format!("key must be exactly {KEY_BYTES} bytes, got {len}"))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_vector() {
        let data = [0x86, 0x4F, 0xD2, 0x6F, 0xB5, 0x59, 0xF7, 0x5B];
        assert_eq!(encode(&data).unwrap(), "HelloWorld");
        assert_eq!(decode("HelloWorld").unwrap(), data);
    }

    #[test]
    fn test_key_length() {
        let text = encode(&[7u8; KEY_BYTES]).unwrap();
        assert_eq!(text.len(), KEY_TEXT_LEN);
        assert_eq!(decode_key(&text).unwrap(), [7u8; KEY_BYTES]);
    }

    #[test]
    fn test_extremes() {
        assert_eq!(encode(&[0u8; 4]).unwrap(), "00000");
        assert_eq!(encode(&[0xFF; 4]).unwrap(), "%nSc0");
        assert_eq!(decode("%nSc0").unwrap(), vec![0xFF; 4]);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(encode(&[1, 2, 3]), Err(BridgeError::Format(_))));
        assert!(matches!(decode("abcd"), Err(BridgeError::Format(_))));
        assert!(matches!(decode("ab~cd"), Err(BridgeError::Format(_))));
        // One past the largest group
        assert!(matches!(decode("%nSc1"), Err(BridgeError::Format(_))));
        assert!(matches!(decode("#####"), Err(BridgeError::Format(_))));
        assert!(matches!(decode_key("HelloWorld"), Err(BridgeError::Format(_))));
    }

    #[test]
    fn test_padded_tail_form_is_not_accepted() {
        // Six characters would be a valid tail for the underlying codec
        assert!(matches!(decode("Hello1"), Err(BridgeError::Format(_))));
        assert!(matches!(encode(&[1, 2, 3, 4, 5]), Err(BridgeError::Format(_))));
    }

    #[test]
    fn test_empty() {
        assert_eq!(encode(&[]).unwrap(), "");
        assert!(decode("").unwrap().is_empty());
    }
}
