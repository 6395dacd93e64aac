//! # cipherchat Core
//!
//! Pure primitives shared by every cipherchat crate: identifiers, message
//! digests and input validation.
//!
//! This crate contains no I/O, no key material and no networking.
//!
//! ## Key Types
//!
//! - [`ChannelId`] - Addresses a group room or a direct conversation
//! - [`UserId`] / [`RoomId`] - Server-assigned identifiers
//! - [`Sender`] - Who authored a message (id + display name)
//! - [`MessageDigest`] - Content address used to detect re-delivered messages
//!
//! ## Validation
//!
//! User input (room names, usernames, passwords) is checked here before any
//! network call is made. See [`validation`].

pub mod digest;
pub mod error;
pub mod types;
pub mod validation;

pub use digest::MessageDigest;
pub use error::ValidationError;
pub use types::{ChannelId, ChannelKind, RoomId, Sender, UserId};
pub use validation::{
    validate_message_text, validate_password, validate_person_name, validate_room_name,
    validate_username,
};
