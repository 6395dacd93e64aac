//! # cipherchat
//!
//! The client-side session engine for end-to-end encrypted group and direct
//! messaging.
//!
//! ## Overview
//!
//! A session keeps a local, decrypted, duplicate-free copy of every channel
//! the user belongs to:
//!
//! - **History** is pulled at start and after every reconnect
//! - **Live updates** arrive over a transport that reconnects with
//!   exponential backoff (1s doubling to 64s)
//! - **Sends** appear at once as transient echoes, promoted when written to
//!   the connection and discarded if the send fails
//!
//! Channel keys arrive sealed to the session's X25519 key; message bodies are
//! encrypted with ChaCha20-Poly1305 under the channel key.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cipherchat::{Backend, SessionConfig, SyncCoordinator, WebSocketTransport};
//! use cipherchat::core::ChannelId;
//!
//! async fn example<B: Backend>(backend: Arc<B>) -> cipherchat::Result<()> {
//!     let me = backend.who_am_i().await?;
//!     let transport = WebSocketTransport::for_user("https://chat.example.org", me.id)?;
//!
//!     let mut session = SyncCoordinator::new(backend, me, transport, SessionConfig::default())?;
//!     let mut events = session.subscribe();
//!     session.start().await;
//!
//!     session.send(ChannelId::group(1), "hello").await?;
//!     while session.step().await {
//!         while let Ok(event) = events.try_recv() {
//!             println!("{:?}", event);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `cipherchat::core` - Identifiers, digests, input validation
//! - `cipherchat::keys` - Key store and channel cipher
//! - `cipherchat::store` - Channel store
//! - `cipherchat::sync` - History sync, live connection, collaborator traits

pub mod auth;
pub mod coordinator;
pub mod error;
pub mod events;

// Re-export component crates
pub use cipherchat_core as core;
pub use cipherchat_keys as keys;
pub use cipherchat_store as store;
pub use cipherchat_sync as sync;

// Re-export main types for convenience
pub use auth::{AccountClient, Credentials, PasswordChange, SignupForm};
pub use coordinator::{SendOutcome, SessionConfig, SyncCoordinator};
pub use error::{Result, SessionError};
pub use events::{ConnectionStatus, DropReason, SessionEvent};

pub use cipherchat_core::{ChannelId, ChannelKind, RoomId, Sender, UserId, ValidationError};
pub use cipherchat_sync::{
    Backend, ConnectionState, Identity, LiveTransport, MemoryTransport, WebSocketTransport,
};
