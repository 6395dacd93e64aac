//! Sealed boxes: small payloads wrapped for a single X25519 recipient.
//!
//! The sender generates an ephemeral key pair, agrees a shared secret with
//! the recipient's public key, derives a one-shot wrapping key bound to both
//! public keys and encrypts with ChaCha20-Poly1305. Only the holder of the
//! recipient secret can open the box.
//!
//! Wire form: base64(ephemeral_public || nonce || ciphertext).

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::crypto::{
    EncryptionNonce, EphemeralKeyPair, X25519PublicKey, X25519StaticSecret, KEY_LEN, NONCE_LEN,
};
use crate::error::{CryptoError, Result};

/// Poly1305 tag length.
const TAG_LEN: usize = 16;

/// A payload encrypted for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    /// Ephemeral X25519 public key (sender's side of ECDH).
    pub ephemeral_public: X25519PublicKey,

    /// Nonce used for encryption.
    pub nonce: EncryptionNonce,

    /// The payload, encrypted with the derived wrapping key.
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    /// Seal `plaintext` so only the owner of `recipient` can open it.
    pub fn seal(plaintext: &[u8], recipient: &X25519PublicKey) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();

        let shared = ephemeral.diffie_hellman(recipient);
        let wrap_key = shared.derive_wrap_key(&context(&ephemeral_public, recipient));

        let nonce = EncryptionNonce::generate();
        let ciphertext = wrap_key.encrypt(plaintext, &nonce)?;

        Ok(Self {
            ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// Open the box with the recipient's secret key.
    pub fn open(&self, recipient_secret: &X25519StaticSecret) -> Result<Vec<u8>> {
        let recipient_public = recipient_secret.public_key();
        let shared = recipient_secret.diffie_hellman(&self.ephemeral_public);
        let wrap_key = shared.derive_wrap_key(&context(&self.ephemeral_public, &recipient_public));

        wrap_key.decrypt(&self.ciphertext, &self.nonce)
    }

    /// Encode for transmission.
    pub fn to_base64(&self) -> String {
        let mut buf = Vec::with_capacity(KEY_LEN + NONCE_LEN + self.ciphertext.len());
        buf.extend_from_slice(self.ephemeral_public.as_bytes());
        buf.extend_from_slice(self.nonce.as_bytes());
        buf.extend_from_slice(&self.ciphertext);
        STANDARD.encode(buf)
    }

    /// Decode from the transmitted form.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;

        if bytes.len() < KEY_LEN + NONCE_LEN + TAG_LEN {
            return Err(CryptoError::MalformedCiphertext(format!(
                "sealed box too short: {} bytes",
                bytes.len()
            )));
        }

        let (public, rest) = bytes.split_at(KEY_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let mut nonce_arr = [0u8; NONCE_LEN];
        nonce_arr.copy_from_slice(nonce);

        Ok(Self {
            ephemeral_public: X25519PublicKey::from_slice(public)?,
            nonce: EncryptionNonce::from_bytes(nonce_arr),
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Seal and encode in one step.
pub fn seal_to_base64(plaintext: &[u8], recipient: &X25519PublicKey) -> Result<String> {
    Ok(SealedBox::seal(plaintext, recipient)?.to_base64())
}

/// Decode and open in one step.
pub fn open_from_base64(encoded: &str, recipient_secret: &X25519StaticSecret) -> Result<Vec<u8>> {
    SealedBox::from_base64(encoded)?.open(recipient_secret)
}

fn context(ephemeral: &X25519PublicKey, recipient: &X25519PublicKey) -> [u8; 2 * KEY_LEN] {
    let mut ctx = [0u8; 2 * KEY_LEN];
    ctx[..KEY_LEN].copy_from_slice(ephemeral.as_bytes());
    ctx[KEY_LEN..].copy_from_slice(recipient.as_bytes());
    ctx
}
