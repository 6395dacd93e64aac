//! Message digests: the identity used to recognise a re-delivered message.
//!
//! Messages carry no server-assigned identifier, so a message is identified
//! by Blake3(domain || channel || sender || ciphertext). Ciphertexts use a
//! fresh nonce per send, so two sends of the same text produce different
//! digests while a redelivery of the same frame produces the same one.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ChannelId, UserId};

const DIGEST_DOMAIN: &[u8] = b"cipherchat-message-v0:";

/// A 32-byte content address of a delivered message.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageDigest(pub [u8; 32]);

impl MessageDigest {
    /// Compute the digest of a message as delivered on `channel`.
    pub fn compute(channel: &ChannelId, sender: &UserId, ciphertext: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DIGEST_DOMAIN);
        hasher.update(&channel.to_bytes());
        hasher.update(b":");
        hasher.update(&sender.0.to_be_bytes());
        hasher.update(b":");
        hasher.update(ciphertext.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for MessageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for MessageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for MessageDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
