//! Transport abstraction for the live connection.
//!
//! A transport carries JSON text frames between this client and the server.
//! It knows nothing about reconnection: [`LiveConnection`](crate::LiveConnection)
//! decides when to open it again after a failure.

use async_trait::async_trait;

use crate::error::Result;

/// A bidirectional text-frame transport.
#[async_trait]
pub trait LiveTransport: Send {
    /// Establish the underlying connection.
    async fn open(&mut self) -> Result<()>;

    /// Receive the next frame.
    ///
    /// Returns `Ok(None)` when the server closed the connection cleanly.
    /// Must be cancel safe.
    async fn recv(&mut self) -> Result<Option<String>>;

    /// Write one frame.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Tear down the underlying connection. Errors are swallowed.
    async fn close(&mut self);
}

/// A scriptable in-memory transport for tests.
///
/// The [`MemoryTransportHandle`] plays the server: it pushes frames, injects
/// failures and inspects what the client sent.
pub mod memory {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;

    use crate::error::SyncError;

    /// Something the fake server does to the client.
    #[derive(Debug, Clone)]
    enum Inbound {
        Frame(String),
        Error(String),
        Close,
    }

    #[derive(Debug, Default)]
    struct Script {
        open_failures: VecDeque<String>,
        send_failures: VecDeque<String>,
        sent: Vec<String>,
        opens: usize,
        is_open: bool,
    }

    /// Client side of the in-memory transport.
    pub struct MemoryTransport {
        inbound: mpsc::UnboundedReceiver<Inbound>,
        script: Arc<Mutex<Script>>,
    }

    /// Server side of the in-memory transport.
    #[derive(Clone)]
    pub struct MemoryTransportHandle {
        inbound: mpsc::UnboundedSender<Inbound>,
        script: Arc<Mutex<Script>>,
    }

    impl MemoryTransport {
        /// Create a connected transport/handle pair.
        pub fn pair() -> (Self, MemoryTransportHandle) {
            let (tx, rx) = mpsc::unbounded_channel();
            let script = Arc::new(Mutex::new(Script::default()));
            (
                Self {
                    inbound: rx,
                    script: Arc::clone(&script),
                },
                MemoryTransportHandle {
                    inbound: tx,
                    script,
                },
            )
        }

        fn script(&self) -> std::sync::MutexGuard<'_, Script> {
            self.script.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    impl MemoryTransportHandle {
        fn script(&self) -> std::sync::MutexGuard<'_, Script> {
            self.script.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Deliver a text frame to the client.
        pub fn push_frame(&self, frame: impl Into<String>) {
            let _ = self.inbound.send(Inbound::Frame(frame.into()));
        }

        /// Make the client's pending receive fail.
        pub fn push_error(&self, reason: impl Into<String>) {
            let _ = self.inbound.send(Inbound::Error(reason.into()));
        }

        /// Close the connection from the server side.
        pub fn push_close(&self) {
            let _ = self.inbound.send(Inbound::Close);
        }

        /// Make the next `n` open attempts fail.
        pub fn fail_next_opens(&self, n: usize) {
            let mut script = self.script();
            for i in 0..n {
                script
                    .open_failures
                    .push_back(format!("scripted open failure {}", i + 1));
            }
        }

        /// Make the next `n` sends fail.
        pub fn fail_next_sends(&self, n: usize) {
            let mut script = self.script();
            for i in 0..n {
                script
                    .send_failures
                    .push_back(format!("scripted send failure {}", i + 1));
            }
        }

        /// Frames the client has sent, in order.
        pub fn sent(&self) -> Vec<String> {
            self.script().sent.clone()
        }

        /// Number of successful opens.
        pub fn opens(&self) -> usize {
            self.script().opens
        }

        pub fn is_open(&self) -> bool {
            self.script().is_open
        }
    }

    #[async_trait]
    impl LiveTransport for MemoryTransport {
        async fn open(&mut self) -> Result<()> {
            let mut script = self.script();
            if let Some(reason) = script.open_failures.pop_front() {
                return Err(SyncError::Transport(reason));
            }
            script.opens += 1;
            script.is_open = true;
            Ok(())
        }

        async fn recv(&mut self) -> Result<Option<String>> {
            let is_open = self.script().is_open;
            if !is_open {
                return Err(SyncError::Transport("transport not open".into()));
            }
            match self.inbound.recv().await {
                Some(Inbound::Frame(frame)) => Ok(Some(frame)),
                Some(Inbound::Error(reason)) => {
                    self.script().is_open = false;
                    Err(SyncError::Transport(reason))
                }
                Some(Inbound::Close) | None => {
                    self.script().is_open = false;
                    Ok(None)
                }
            }
        }

        async fn send(&mut self, frame: String) -> Result<()> {
            let mut script = self.script();
            if !script.is_open {
                return Err(SyncError::Transport("transport not open".into()));
            }
            if let Some(reason) = script.send_failures.pop_front() {
                script.is_open = false;
                return Err(SyncError::Transport(reason));
            }
            script.sent.push(frame);
            Ok(())
        }

        async fn close(&mut self) {
            self.script().is_open = false;
        }
    }
}
