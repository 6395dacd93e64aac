//! Error types for the keys module.

use thiserror::Error;

/// Errors from key management and encryption.
///
/// Apart from [`CryptoError::IdentityGeneration`], every variant is scoped to
/// a single operation or channel and never ends the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The session identity could not be generated.
    #[error("identity generation failed: {0}")]
    IdentityGeneration(String),

    /// No server public key is cached.
    #[error("no server public key cached")]
    MissingServerKey,

    /// The cached server public key did not parse.
    #[error("malformed server public key: {0}")]
    MalformedServerKey(String),

    /// PEM armor could not be parsed.
    #[error("malformed PEM: {0}")]
    MalformedPem(String),

    /// Encryption error.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Decryption failed: wrong key or tampered ciphertext.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// The ciphertext is not in the expected encoding.
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// A key had the wrong length.
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    /// Decrypted bytes were not valid UTF-8 text.
    #[error("plaintext is not valid UTF-8")]
    InvalidUtf8,
}

/// Result type for key operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
