//! # cipherchat Sync
//!
//! The two sources of channel state and the machinery that keeps them
//! flowing.
//!
//! ## Overview
//!
//! A client learns about messages in two ways:
//!
//! - **History**: a pull of every joined channel with its backlog, done at
//!   session start and after every reconnect ([`HistorySync`])
//! - **Live updates**: JSON frames pushed over a long-lived transport
//!   ([`LiveConnection`] over a [`LiveTransport`])
//!
//! Both deliver the same messages more than once. Deduplication happens in
//! the store; this crate only guarantees that nothing is lost across
//! reconnects.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cipherchat_sync::{BackoffConfig, LiveConnection, LiveSignal, WebSocketTransport};
//! use cipherchat_core::UserId;
//!
//! async fn example() {
//!     let transport = WebSocketTransport::for_user("http://localhost:8000", UserId(1)).unwrap();
//!     let mut live = LiveConnection::new(transport, BackoffConfig::default());
//!     live.connect();
//!
//!     loop {
//!         match live.next().await {
//!             LiveSignal::Event(event) => println!("{:?}", event),
//!             LiveSignal::Closed => break,
//!             _ => {}
//!         }
//!     }
//! }
//! ```
//!
//! ## Reconnection
//!
//! ```text
//! failure 1 -> wait 1s
//! failure 2 -> wait 2s
//! failure 3 -> wait 4s ... capped at 64s, unbounded retries
//! connected -> schedule resets to 1s
//! ```

pub mod backoff;
pub mod connection;
pub mod error;
pub mod history;
pub mod messages;
pub mod pending;
pub mod remote;
pub mod transport;
pub mod ws;

pub use backoff::{Backoff, BackoffConfig};
pub use connection::{ConnectionState, LiveConnection, LiveSignal, RetryTimer};
pub use error::{Result, SyncError};
pub use history::{HistoryReport, HistorySync};
pub use messages::{DirectPayload, GroupPayload, LiveEvent};
pub use pending::{PendingEvent, PendingEvents};
pub use remote::{
    Backend, BacklogMessage, ChannelDirectory, ChannelSnapshot, CreateChannelRequest,
    HistorySource, Identity, IdentityService, JoinableChannel, KeyExchange, RemoteError,
    RemoteResult, SignupRequest,
};
pub use transport::{
    memory::{MemoryTransport, MemoryTransportHandle},
    LiveTransport,
};
pub use ws::WebSocketTransport;
