//! Channel message encryption.
//!
//! Message bodies are encrypted with the channel's shared key. The wire form
//! is lowercase hex of `format || nonce || ciphertext`, where the ciphertext
//! includes the Poly1305 tag.

use crate::crypto::{ChannelKey, EncryptionNonce, NONCE_LEN};
use crate::error::{CryptoError, Result};

/// Format identifier for encrypted message bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EncryptionFormat {
    /// ChaCha20-Poly1305 with 256-bit key.
    ChaCha20Poly1305 = 1,
}

impl EncryptionFormat {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::ChaCha20Poly1305),
            _ => None,
        }
    }
}

/// Symmetric encryption of message bodies under a channel key.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelCipher;

impl ChannelCipher {
    /// Encrypt `plaintext` for a channel.
    ///
    /// A fresh nonce is drawn for every call, so encrypting the same text
    /// twice yields different ciphertexts.
    pub fn encrypt(plaintext: &str, key: &ChannelKey) -> Result<String> {
        let nonce = EncryptionNonce::generate();
        let sealed = key.encrypt(plaintext.as_bytes(), &nonce)?;

        let mut buf = Vec::with_capacity(1 + NONCE_LEN + sealed.len());
        buf.push(EncryptionFormat::ChaCha20Poly1305 as u8);
        buf.extend_from_slice(nonce.as_bytes());
        buf.extend_from_slice(&sealed);
        Ok(hex::encode(buf))
    }

    /// Decrypt a message body.
    ///
    /// A [`CryptoError::Decryption`] means the key does not match the
    /// ciphertext and the channel key should be re-fetched.
    pub fn decrypt(ciphertext: &str, key: &ChannelKey) -> Result<String> {
        let bytes =
            hex::decode(ciphertext).map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;

        let (&format, rest) = bytes
            .split_first()
            .ok_or_else(|| CryptoError::MalformedCiphertext("empty ciphertext".into()))?;

        match EncryptionFormat::from_byte(format) {
            Some(EncryptionFormat::ChaCha20Poly1305) => {}
            None => {
                return Err(CryptoError::MalformedCiphertext(format!(
                    "unknown format byte {}",
                    format
                )))
            }
        }

        if rest.len() < NONCE_LEN {
            return Err(CryptoError::MalformedCiphertext(
                "ciphertext shorter than nonce".into(),
            ));
        }
        let (nonce, sealed) = rest.split_at(NONCE_LEN);
        let mut nonce_arr = [0u8; NONCE_LEN];
        nonce_arr.copy_from_slice(nonce);

        let plain = key.decrypt(sealed, &EncryptionNonce::from_bytes(nonce_arr))?;
        String::from_utf8(plain).map_err(|_| CryptoError::InvalidUtf8)
    }
}
