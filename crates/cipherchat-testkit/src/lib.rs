//! # cipherchat Testkit
//!
//! Testing utilities for cipherchat.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **FakeServer**: an in-memory server implementing every collaborator
//!   trait, with a real server key so the full crypto path runs
//! - **Generators**: Proptest strategies for property-based testing
//! - **Tracing**: [`init_tracing`] to see session logs in test output
//!
//! ## Test Fixtures
//!
//! ```rust
//! use cipherchat_testkit::FakeServer;
//!
//! let server = FakeServer::new();
//! let alice = server.register_user("alice", "password-a");
//! let lobby = server.create_room("lobby", None);
//! server.join(lobby, &alice);
//! let frame = server.post_group(lobby, &alice, "hi");
//! assert!(frame.starts_with("{\"Group\""));
//! ```
//!
//! Set `RUST_LOG=cipherchat=debug` to see what a failing scenario did.

pub mod fixtures;
pub mod generators;

pub use fixtures::FakeServer;
pub use generators::{any_text, channel_id, message_text, sender, user_id};

use tracing_subscriber::EnvFilter;

/// Install a test-friendly tracing subscriber. Safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
