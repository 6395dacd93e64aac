//! PEM armor for X25519 public keys.
//!
//! Public keys travel as text: the client sends its own with every request
//! that returns wrapped channel keys, and the server publishes its key for
//! password and key submission.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::crypto::X25519PublicKey;
use crate::error::{CryptoError, Result};

const BEGIN: &str = "-----BEGIN X25519 PUBLIC KEY-----";
const END: &str = "-----END X25519 PUBLIC KEY-----";

/// Armor a public key.
pub fn encode_public_key(key: &X25519PublicKey) -> String {
    format!("{}\n{}\n{}\n", BEGIN, STANDARD.encode(key.as_bytes()), END)
}

/// Parse an armored public key.
///
/// Only the structure is checked: armor lines, base64 body, 32 bytes.
pub fn decode_public_key(pem: &str) -> Result<X25519PublicKey> {
    let body = pem
        .trim()
        .strip_prefix(BEGIN)
        .and_then(|rest| rest.strip_suffix(END))
        .ok_or_else(|| CryptoError::MalformedPem("missing X25519 PUBLIC KEY armor".into()))?;

    let joined: String = body.split_whitespace().collect();
    let bytes = STANDARD
        .decode(joined)
        .map_err(|e| CryptoError::MalformedPem(e.to_string()))?;

    X25519PublicKey::from_slice(&bytes)
}
