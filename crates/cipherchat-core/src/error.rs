//! Error types for cipherchat Core.

use thiserror::Error;

/// Malformed user input, rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be between {min} and {max} characters, got {got}")]
    Length {
        field: &'static str,
        min: usize,
        max: usize,
        got: usize,
    },

    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("new password does not match its confirmation")]
    PasswordMismatch,

    #[error("new password must differ from the old one")]
    PasswordUnchanged,

    #[error("a password is required for this room")]
    PasswordRequired,
}
