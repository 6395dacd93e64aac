//! Error types for the sync module.

use thiserror::Error;

use cipherchat_core::ChannelId;
use cipherchat_keys::CryptoError;
use cipherchat_store::StoreError;

use crate::remote::RemoteError;

/// Errors that can occur during sync operations.
///
/// Transport errors drive the reconnect state machine; they reach callers
/// only when a caller's own write failed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The live connection is not established.
    #[error("live connection is not established")]
    NotConnected,

    /// A channel's key could not be recovered.
    #[error("key for {channel} unavailable: {source}")]
    ChannelKey {
        channel: ChannelId,
        #[source]
        source: CryptoError,
    },

    /// The channel is not known to this session.
    #[error("unknown channel: {0}")]
    UnknownChannel(ChannelId),

    /// A collaborator call failed.
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),

    /// Encryption or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A live frame could not be parsed or built.
    #[error("invalid frame: {0}")]
    Frame(String),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ChannelNotFound(id) => SyncError::UnknownChannel(id),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Frame(err.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
