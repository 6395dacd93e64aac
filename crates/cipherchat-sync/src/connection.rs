//! The live connection state machine.
//!
//! ```text
//! Disconnected --connect--> Connecting --open ok--> Connected
//!                              ^    |                   |
//!                     timer    |    | open failed       | recv/send failed,
//!                     fired    |    v                   | server closed
//!                           Reconnecting <--------------+
//! ```
//!
//! Any state goes to `Disconnected` on [`LiveConnection::close`], which is
//! the only way out of the loop. The connection is driven by calling
//! [`LiveConnection::next`]; every transition the caller must react to is
//! returned as a [`LiveSignal`].

use std::pin::Pin;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, BackoffConfig};
use crate::error::{Result, SyncError};
use crate::messages::LiveEvent;
use crate::transport::LiveTransport;

/// The state of the live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting `retry_in` before the next attempt.
    Reconnecting { attempt: u32, retry_in: Duration },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// What the caller of [`LiveConnection::next`] is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveSignal {
    /// The transport is (re-)established.
    Connected,
    /// The transport failed; a retry is scheduled.
    Reconnecting { retry_in: Duration },
    /// An inbound event.
    Event(LiveEvent),
    /// The connection was closed and will not reconnect.
    Closed,
}

/// A cancellable one-shot retry timer.
#[derive(Debug, Default)]
pub struct RetryTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl RetryTimer {
    /// Arm the timer, replacing any pending deadline.
    pub fn arm(&mut self, delay: Duration) {
        self.sleep = Some(Box::pin(tokio::time::sleep(delay)));
    }

    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Wait for the deadline. Returns at once when not armed.
    ///
    /// Cancel safe: dropping the future leaves the deadline in place.
    pub async fn wait(&mut self) {
        if let Some(sleep) = self.sleep.as_mut() {
            sleep.as_mut().await;
        }
        self.sleep = None;
    }
}

/// A resilient live-update connection over a [`LiveTransport`].
pub struct LiveConnection<T> {
    transport: T,
    state: watch::Sender<ConnectionState>,
    backoff: Backoff,
    timer: RetryTimer,
}

impl<T: LiveTransport> LiveConnection<T> {
    /// Create a disconnected connection.
    pub fn new(transport: T, config: BackoffConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            state,
            backoff: Backoff::new(config),
            timer: RetryTimer::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state changes.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "connection state");
        }
    }

    /// Start connecting. The transport is opened by the next call to
    /// [`next`](Self::next). Has no effect unless disconnected.
    pub fn connect(&mut self) {
        if self.state() == ConnectionState::Disconnected {
            self.set_state(ConnectionState::Connecting);
        }
    }

    /// Drive the state machine until something happens.
    ///
    /// Malformed frames are logged and skipped without a state change.
    pub async fn next(&mut self) -> LiveSignal {
        loop {
            match self.state() {
                ConnectionState::Disconnected => return LiveSignal::Closed,

                ConnectionState::Connecting => match self.transport.open().await {
                    Ok(()) => {
                        self.timer.cancel();
                        self.backoff.reset();
                        self.set_state(ConnectionState::Connected);
                        info!("live connection established");
                        return LiveSignal::Connected;
                    }
                    Err(e) => return self.fail(e).await,
                },

                ConnectionState::Reconnecting { .. } => {
                    self.timer.wait().await;
                    self.set_state(ConnectionState::Connecting);
                }

                ConnectionState::Connected => match self.transport.recv().await {
                    Ok(Some(frame)) => match LiveEvent::parse(&frame) {
                        Ok(event) => return LiveSignal::Event(event),
                        Err(e) => {
                            warn!(error = %e, len = frame.len(), "dropping malformed frame");
                        }
                    },
                    Ok(None) => {
                        return self
                            .fail(SyncError::Transport("closed by server".into()))
                            .await
                    }
                    Err(e) => return self.fail(e).await,
                },
            }
        }
    }

    /// Write an event.
    ///
    /// A write failure moves the connection to `Reconnecting` and is also
    /// returned to the caller.
    pub async fn send(&mut self, event: &LiveEvent) -> Result<()> {
        if !self.state().is_connected() {
            return Err(SyncError::NotConnected);
        }
        let frame = event.to_frame()?;
        match self.transport.send(frame).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let message = e.to_string();
                self.fail(e).await;
                Err(SyncError::Transport(message))
            }
        }
    }

    /// Close for good: cancel any pending retry and tear down the transport.
    pub async fn close(&mut self) {
        self.timer.cancel();
        self.transport.close().await;
        self.set_state(ConnectionState::Disconnected);
        info!("live connection closed");
    }

    async fn fail(&mut self, error: SyncError) -> LiveSignal {
        self.transport.close().await;
        let retry_in = self.backoff.next_delay();
        let attempt = self.backoff.attempts();
        self.timer.arm(retry_in);
        self.set_state(ConnectionState::Reconnecting { attempt, retry_in });
        warn!(
            error = %error,
            attempt,
            retry_in_secs = retry_in.as_secs(),
            "connection lost, reconnecting"
        );
        LiveSignal::Reconnecting { retry_in }
    }
}
