//! Error types for the store module.

use thiserror::Error;

use cipherchat_core::ChannelId;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The channel is not in the store.
    #[error("channel not found: {0}")]
    ChannelNotFound(ChannelId),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
