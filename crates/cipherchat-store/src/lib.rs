//! # cipherchat Store
//!
//! Channel state for one session: channel records, their keys and their
//! message logs.
//!
//! ## Overview
//!
//! Messages reach a client twice over: once from the history fetch and
//! again from the live transport, and again after every reconnect. The
//! [`ChannelStore`] reconciles these into one duplicate-free log per channel
//! by keying each message on its [`MessageDigest`](cipherchat_core::MessageDigest).
//!
//! ## Key Types
//!
//! - [`ChannelStore`] - Owns every channel and its log
//! - [`Channel`] - One channel: id, name, key, messages
//! - [`StoredMessage`] - A log entry with its local sequence number
//! - [`AppendOutcome`] / [`UpsertOutcome`] - What a mutation did
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cipherchat_core::{ChannelId, Sender};
//! use cipherchat_keys::ChannelKey;
//! use cipherchat_store::{AppendOutcome, ChannelStore, NewMessage};
//!
//! let mut store = ChannelStore::new();
//! let lobby = ChannelId::group(1);
//! store.upsert_channel(lobby, "lobby", ChannelKey::generate());
//!
//! let msg = NewMessage::from_delivery(&lobby, Sender::new(7, "alice"), "hi", "01ab");
//! assert!(matches!(
//!     store.append_message(&lobby, msg.clone(), true),
//!     Ok(AppendOutcome::Appended(_))
//! ));
//! assert!(matches!(
//!     store.append_message(&lobby, msg, true),
//!     Ok(AppendOutcome::Duplicate(_))
//! ));
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent upserts**: an existing channel keeps its original key
//! - **Transient echoes**: a local send is shown at once and promoted in
//!   place when the server confirms it

pub mod channel;
pub mod error;
pub mod memory;
pub mod outcome;

pub use channel::{Channel, Delivery, NewMessage, StoredMessage};
pub use error::{Result, StoreError};
pub use memory::ChannelStore;
pub use outcome::{AppendOutcome, UpsertOutcome};
