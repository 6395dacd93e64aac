//! Error types for sessions.

use thiserror::Error;

use cipherchat_core::ValidationError;
use cipherchat_keys::CryptoError;
use cipherchat_store::StoreError;
use cipherchat_sync::{RemoteError, SyncError};

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Input rejected before any network call.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Key or encryption error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// A collaborator call failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Too many sends are waiting for the connection.
    #[error("outbox full ({0} queued sends)")]
    OutboxFull(usize),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
