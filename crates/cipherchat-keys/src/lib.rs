//! # cipherchat keys
//!
//! Session identity, key wrapping and channel message encryption.
//!
//! ## Overview
//!
//! Every session generates a fresh X25519 identity. Its public half is sent
//! to the server as PEM so the server can wrap channel keys for this client;
//! the secret half never leaves the [`KeyStore`].
//!
//! Two kinds of encryption are used:
//!
//! 1. **Sealed boxes** carry small payloads (channel keys, passwords) between
//!    client and server using an ephemeral X25519 exchange
//! 2. **Channel encryption** protects message bodies with the channel's
//!    shared ChaCha20-Poly1305 key
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cipherchat_keys::{ChannelCipher, ChannelKey, KeyStore};
//!
//! let mut keys = KeyStore::generate_identity().unwrap();
//! // keys.set_server_public_key(&server_pem)?;
//! // let wrapped_password = keys.wrap_for_server(b"hunter22")?;
//!
//! let key = ChannelKey::generate();
//! let ciphertext = ChannelCipher::encrypt("hi", &key).unwrap();
//! assert_eq!(ChannelCipher::decrypt(&ciphertext, &key).unwrap(), "hi");
//! ```

pub mod cipher;
pub mod crypto;
pub mod error;
pub mod keystore;
pub mod pem;
pub mod sealed;

pub use cipher::{ChannelCipher, EncryptionFormat};
pub use crypto::{
    ChannelKey, EncryptionNonce, EphemeralKeyPair, SharedKey, X25519PublicKey, X25519StaticSecret,
};
pub use error::{CryptoError, Result};
pub use keystore::{KeyStore, ServerKeySlot};
pub use pem::{decode_public_key, encode_public_key};
pub use sealed::{open_from_base64, seal_to_base64, SealedBox};
