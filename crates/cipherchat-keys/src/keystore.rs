//! The session key store.
//!
//! Holds the client's X25519 identity for the lifetime of one session and the
//! server public key cached for the current live connection.

use tracing::{debug, warn};

use crate::crypto::{ChannelKey, X25519PublicKey, X25519StaticSecret};
use crate::error::{CryptoError, Result};
use crate::pem;
use crate::sealed;

/// Cached server public key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServerKeySlot {
    /// Nothing fetched since the last connection drop.
    #[default]
    Missing,
    /// The server published something that did not parse.
    Malformed(String),
    /// A usable key.
    Ready(X25519PublicKey),
}

/// Per-session key material.
///
/// The identity is generated once and never persisted or exported; only its
/// public half leaves the process.
#[derive(Debug)]
pub struct KeyStore {
    identity: X25519StaticSecret,
    public: X25519PublicKey,
    server: ServerKeySlot,
}

impl KeyStore {
    /// Generate a fresh identity.
    ///
    /// An error here means the OS RNG is unavailable and the session cannot
    /// start.
    pub fn generate_identity() -> Result<Self> {
        let identity = X25519StaticSecret::generate()?;
        Ok(Self::from_identity(identity))
    }

    /// Build a store around an existing secret.
    pub fn from_identity(identity: X25519StaticSecret) -> Self {
        let public = identity.public_key();
        debug!(public = %hex::encode(&public.as_bytes()[..8]), "session identity ready");
        Self {
            identity,
            public,
            server: ServerKeySlot::Missing,
        }
    }

    /// This client's public key.
    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    /// This client's public key, PEM armored.
    pub fn public_key_pem(&self) -> String {
        pem::encode_public_key(&self.public)
    }

    /// Replace the cached server key.
    ///
    /// A key that fails to parse is still recorded, so later wraps fail with
    /// [`CryptoError::MalformedServerKey`] instead of using a stale key.
    pub fn set_server_public_key(&mut self, pem_text: &str) -> Result<()> {
        match pem::decode_public_key(pem_text) {
            Ok(key) => {
                self.server = ServerKeySlot::Ready(key);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "server published a malformed public key");
                self.server = ServerKeySlot::Malformed(e.to_string());
                Err(CryptoError::MalformedServerKey(e.to_string()))
            }
        }
    }

    /// Forget the cached server key.
    pub fn clear_server_public_key(&mut self) {
        self.server = ServerKeySlot::Missing;
    }

    /// Current server key state.
    pub fn server_key(&self) -> &ServerKeySlot {
        &self.server
    }

    /// Seal `plaintext` for the server. Returns base64 text.
    pub fn wrap_for_server(&self, plaintext: &[u8]) -> Result<String> {
        let server = match &self.server {
            ServerKeySlot::Ready(key) => key,
            ServerKeySlot::Missing => return Err(CryptoError::MissingServerKey),
            ServerKeySlot::Malformed(reason) => {
                return Err(CryptoError::MalformedServerKey(reason.clone()))
            }
        };
        sealed::seal_to_base64(plaintext, server)
    }

    /// Open a sealed box the server addressed to this client.
    pub fn unwrap_from_server(&self, wrapped: &str) -> Result<Vec<u8>> {
        sealed::open_from_base64(wrapped, &self.identity)
    }

    /// Open a wrapped channel key.
    pub fn unwrap_channel_key(&self, wrapped: &str) -> Result<ChannelKey> {
        let mut raw = self.unwrap_from_server(wrapped)?;
        let key = ChannelKey::from_slice(&raw);
        zeroize::Zeroize::zeroize(&mut raw);
        key
    }
}
