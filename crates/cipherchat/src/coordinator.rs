//! The session coordinator.
//!
//! Owns everything a logged-in session needs (key store, channel store, live
//! connection) and sequences history sync, live events and outgoing sends so
//! that each channel log stays complete and duplicate free across any number
//! of reconnects.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use cipherchat_core::{
    validate_message_text, validate_room_name, validate_username, ChannelId, Sender,
    ValidationError,
};
use cipherchat_keys::{ChannelCipher, KeyStore, ServerKeySlot};
use cipherchat_store::{AppendOutcome, ChannelStore, NewMessage, StoreError};
use cipherchat_sync::{
    Backend, BackoffConfig, ChannelSnapshot, ConnectionState, CreateChannelRequest, HistoryReport,
    HistorySync, Identity, JoinableChannel, LiveConnection, LiveEvent, LiveSignal, LiveTransport,
    PendingEvents,
};

use crate::error::{Result, SessionError};
use crate::events::{ConnectionStatus, DropReason, SessionEvent};

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Reconnect schedule.
    pub backoff: BackoffConfig,
    /// Maximum live events waiting for an unknown channel.
    pub pending_capacity: usize,
    /// How long such an event may wait.
    pub pending_ttl: Duration,
    /// Maximum sends queued while disconnected.
    pub outbox_capacity: usize,
    /// How long a queued send may wait for the connection.
    pub send_timeout: Duration,
    /// Capacity of the notification channel.
    pub notification_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            pending_capacity: 256,
            pending_ttl: Duration::from_secs(30),
            outbox_capacity: 64,
            send_timeout: Duration::from_secs(30),
            notification_capacity: 256,
        }
    }
}

/// What happened to an accepted send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the live connection; the echo is persisted.
    Delivered(u64),
    /// Waiting in the outbox for the connection; the echo is transient.
    Queued(u64),
}

impl SendOutcome {
    pub fn seq(&self) -> u64 {
        match *self {
            Self::Delivered(seq) | Self::Queued(seq) => seq,
        }
    }
}

/// A send waiting for the connection.
#[derive(Debug)]
struct QueuedSend {
    channel: ChannelId,
    seq: u64,
    event: LiveEvent,
    message: NewMessage,
    deadline: Instant,
}

/// Drives one user session.
pub struct SyncCoordinator<B, T> {
    backend: Arc<B>,
    identity: Identity,
    keys: KeyStore,
    store: ChannelStore,
    connection: LiveConnection<T>,
    pending: PendingEvents,
    outbox: VecDeque<QueuedSend>,
    refresh_requested: bool,
    status: ConnectionStatus,
    events: broadcast::Sender<SessionEvent>,
    config: SessionConfig,
}

impl<B, T> SyncCoordinator<B, T>
where
    B: Backend,
    T: LiveTransport,
{
    /// Create a session for `identity` with a fresh key pair.
    ///
    /// Fails only if no identity key can be generated.
    pub fn new(
        backend: Arc<B>,
        identity: Identity,
        transport: T,
        config: SessionConfig,
    ) -> Result<Self> {
        let keys = KeyStore::generate_identity()?;
        Ok(Self::with_keys(backend, identity, keys, transport, config))
    }

    /// Create a session for whoever the backend says is logged in.
    pub async fn for_current_user(
        backend: Arc<B>,
        transport: T,
        config: SessionConfig,
    ) -> Result<Self> {
        let identity = backend.who_am_i().await?;
        info!(user = %identity.id, username = %identity.username, "session starting");
        Self::new(backend, identity, transport, config)
    }

    /// Create a session around an existing key store.
    pub fn with_keys(
        backend: Arc<B>,
        identity: Identity,
        keys: KeyStore,
        transport: T,
        config: SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.notification_capacity.max(1));
        Self {
            backend,
            identity,
            keys,
            store: ChannelStore::new(),
            connection: LiveConnection::new(transport, config.backoff.clone()),
            pending: PendingEvents::new(config.pending_capacity, config.pending_ttl),
            outbox: VecDeque::new(),
            refresh_requested: false,
            status: ConnectionStatus::Disconnected,
            events,
            config,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query Surface
    // ─────────────────────────────────────────────────────────────────────────

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn store(&self) -> &ChannelStore {
        &self.store
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Observe raw connection state changes.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.state().into()
    }

    /// Subscribe to session notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Sends waiting for the connection.
    pub fn queued_sends(&self) -> usize {
        self.outbox.len()
    }

    /// Live events waiting for their channel.
    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    pub fn set_active_channel(&mut self, id: ChannelId) -> Result<()> {
        Ok(self.store.set_active_channel(id)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Load history, then start the live connection.
    ///
    /// The connection starts even if the history fetch fails; the first
    /// Connected transition fetches it again. Returns `None` in that case.
    pub async fn start(&mut self) -> Option<HistoryReport> {
        let report = match self.refresh_history().await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "initial history fetch failed, retrying on connect");
                None
            }
        };
        self.connection.connect();
        self.observe_state();
        report
    }

    /// Process one live signal or deadline.
    ///
    /// Returns `false` once the session is closed.
    pub async fn step(&mut self) -> bool {
        self.expire(Instant::now());

        if self.refresh_requested && self.connection.state().is_connected() {
            self.refresh_requested = false;
            self.refresh_and_resolve().await;
        }

        let deadline = self.next_deadline();
        let signal = match deadline {
            Some(at) => match tokio::time::timeout_at(at, self.connection.next()).await {
                Ok(signal) => signal,
                Err(_) => {
                    self.expire(Instant::now());
                    return true;
                }
            },
            None => self.connection.next().await,
        };

        self.handle_signal(signal).await
    }

    /// Run until the session is closed.
    pub async fn run(&mut self) {
        while self.step().await {}
    }

    /// End the session: close the connection and fail every queued send.
    pub async fn close(&mut self) {
        self.connection.close().await;
        self.keys.clear_server_public_key();

        while let Some(queued) = self.outbox.pop_front() {
            self.fail_queued(queued, "session closed");
        }
        for dropped in self.pending.drain() {
            self.emit(SessionEvent::EventDropped {
                channel: dropped.channel,
                reason: DropReason::Closed,
            });
        }
        self.observe_state();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Live Events
    // ─────────────────────────────────────────────────────────────────────────

    /// Merge a live event into the store.
    ///
    /// Events for channels not yet known are buffered until the next history
    /// refresh; channels are never created from a live event alone.
    pub fn on_live_event(&mut self, event: LiveEvent) {
        let Some(channel) = event.channel_for(self.identity.id) else {
            debug!("ignoring live event of unknown kind");
            return;
        };

        if !self.store.contains(&channel) {
            debug!(channel = %channel, "live event for unknown channel, buffering");
            if let Some(evicted) = self.pending.push(channel, event, Instant::now()) {
                self.emit(SessionEvent::EventDropped {
                    channel: evicted.channel,
                    reason: DropReason::Overflow,
                });
            }
            self.refresh_requested = true;
            return;
        }

        self.apply_live_event(channel, &event);
    }

    fn apply_live_event(&mut self, channel: ChannelId, event: &LiveEvent) {
        let (Some(content), Some(key)) = (event.content(), self.store.channel_key(&channel))
        else {
            return;
        };

        let text = match ChannelCipher::decrypt(content, key) {
            Ok(text) => text,
            Err(e) => {
                warn!(channel = %channel, error = %e, "dropping undecryptable live message");
                self.emit(SessionEvent::ChannelWarning {
                    channel,
                    reason: e.to_string(),
                });
                return;
            }
        };

        let Some(sender) = self.sender_of(channel, event) else {
            return;
        };
        let message = NewMessage::from_delivery(&channel, sender, text, content);
        match self.store.append_message(&channel, message, true) {
            Ok(outcome) => self.publish_append(channel, outcome),
            Err(e) => warn!(channel = %channel, error = %e, "live append failed"),
        }
    }

    /// Direct frames carry no display name; the peer's name is the channel
    /// name.
    fn sender_of(&self, channel: ChannelId, event: &LiveEvent) -> Option<Sender> {
        match event {
            LiveEvent::Group(p) => Some(Sender::new(p.sender_id, p.sender_name.clone())),
            LiveEvent::Direct(p) if p.sender == self.identity.id => Some(self.identity.as_sender()),
            LiveEvent::Direct(p) => {
                let name = self.store.channel(&channel).map(|c| c.name().to_string())?;
                Some(Sender::new(p.sender, name))
            }
            LiveEvent::Unknown => None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sending
    // ─────────────────────────────────────────────────────────────────────────

    /// Send a message.
    ///
    /// The message shows up at once as a transient echo. While connected it
    /// is written immediately and the echo promoted; a failed write discards
    /// the echo and returns the error. While disconnected the send is queued
    /// and retried after the next reconnect.
    pub async fn send(&mut self, channel: ChannelId, plaintext: &str) -> Result<SendOutcome> {
        let text = validate_message_text(plaintext)?;
        let key = self
            .store
            .channel_key(&channel)
            .ok_or(StoreError::ChannelNotFound(channel))?;

        let ciphertext = ChannelCipher::encrypt(text, key)?;
        let me = self.identity.as_sender();
        let message = NewMessage::from_delivery(&channel, me.clone(), text, &ciphertext);
        let event = LiveEvent::outgoing(channel, &me, ciphertext);

        let seq = self
            .store
            .append_message(&channel, message.clone(), false)?
            .seq();
        self.emit(SessionEvent::MessageAppended { channel, seq });

        if self.connection.state().is_connected() {
            self.transmit(channel, seq, &event, message).await?;
            return Ok(SendOutcome::Delivered(seq));
        }

        if self.outbox.len() >= self.config.outbox_capacity {
            self.discard_echo(channel, seq);
            return Err(SessionError::OutboxFull(self.outbox.len()));
        }

        debug!(channel = %channel, seq, "not connected, send queued");
        self.outbox.push_back(QueuedSend {
            channel,
            seq,
            event,
            message,
            deadline: Instant::now() + self.config.send_timeout,
        });
        Ok(SendOutcome::Queued(seq))
    }

    async fn transmit(
        &mut self,
        channel: ChannelId,
        seq: u64,
        event: &LiveEvent,
        message: NewMessage,
    ) -> Result<()> {
        if let Err(e) = self.connection.send(event).await {
            warn!(channel = %channel, seq, error = %e, "send failed");
            self.discard_echo(channel, seq);
            self.observe_state();
            return Err(e.into());
        }

        match self.store.append_message(&channel, message, true) {
            Ok(outcome) => self.publish_append(channel, outcome),
            // Removed while the write was in flight.
            Err(e) => debug!(channel = %channel, error = %e, "sent to a removed channel"),
        }
        Ok(())
    }

    async fn flush_outbox(&mut self) {
        while let Some(queued) = self.outbox.pop_front() {
            if !self.connection.state().is_connected() {
                self.outbox.push_front(queued);
                break;
            }
            if !self.store.contains(&queued.channel) {
                self.fail_queued(queued, "channel removed");
                continue;
            }

            let QueuedSend {
                channel,
                seq,
                event,
                message,
                ..
            } = queued;
            if let Err(e) = self.transmit(channel, seq, &event, message).await {
                self.emit(SessionEvent::SendFailed {
                    channel,
                    seq,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn fail_queued(&mut self, queued: QueuedSend, reason: &str) {
        debug!(channel = %queued.channel, seq = queued.seq, reason, "queued send failed");
        self.discard_echo(queued.channel, queued.seq);
        self.emit(SessionEvent::SendFailed {
            channel: queued.channel,
            seq: queued.seq,
            reason: reason.to_string(),
        });
    }

    fn discard_echo(&mut self, channel: ChannelId, seq: u64) {
        if let Ok(true) = self.store.discard_transient(&channel, seq) {
            self.emit(SessionEvent::MessageDiscarded { channel, seq });
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Channel Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Rooms the user may join.
    pub async fn list_joinable_channels(&self) -> Result<Vec<JoinableChannel>> {
        Ok(self.backend.list_joinable_channels().await?)
    }

    /// Create a room, or join the existing room with that name.
    pub async fn create_channel(
        &mut self,
        name: &str,
        password: Option<&str>,
        require_password: bool,
    ) -> Result<ChannelId> {
        let name = validate_room_name(name)?.to_string();
        let password = password.filter(|p| !p.is_empty());
        if require_password && password.is_none() {
            return Err(ValidationError::PasswordRequired.into());
        }

        let wrapped_password = match password {
            Some(password) => {
                self.ensure_server_key().await?;
                Some(self.keys.wrap_for_server(password.as_bytes())?)
            }
            None => None,
        };

        let request = CreateChannelRequest {
            user: self.identity.id,
            name,
            wrapped_password,
            require_password,
            client_key_pem: self.keys.public_key_pem(),
        };
        let snapshot = self.backend.create_channel(&request).await?;
        self.adopt_snapshot(&snapshot)
    }

    /// Open a direct conversation with another user.
    pub async fn add_direct_peer(&mut self, username: &str) -> Result<ChannelId> {
        let username = validate_username(username)?;
        let snapshot = self
            .backend
            .add_direct_peer(self.identity.id, username, &self.keys.public_key_pem())
            .await?;
        self.adopt_snapshot(&snapshot)
    }

    /// Leave a room or close a direct conversation.
    pub async fn remove_channel(&mut self, id: ChannelId) -> Result<()> {
        if !self.store.contains(&id) {
            debug!(channel = %id, "channel already removed");
            return Ok(());
        }

        match id {
            ChannelId::Group(room) => self.backend.remove_channel(self.identity.id, room).await?,
            ChannelId::Direct(peer) => {
                self.backend
                    .remove_direct_peer(self.identity.id, peer)
                    .await?
            }
        }

        let (dropped, kept): (Vec<_>, Vec<_>) =
            self.outbox.drain(..).partition(|q| q.channel == id);
        self.outbox = kept.into();
        for queued in dropped {
            self.fail_queued(queued, "channel removed");
        }

        if self.store.remove_channel(&id).is_some() {
            info!(channel = %id, "channel removed");
            self.emit(SessionEvent::ChannelRemoved(id));
        }
        Ok(())
    }

    fn adopt_snapshot(&mut self, snapshot: &ChannelSnapshot) -> Result<ChannelId> {
        let mut report = HistoryReport::default();
        HistorySync::new(&self.keys, &mut self.store).apply_snapshot(snapshot, &mut report);
        self.publish_report(&report);

        if let Some((_, error)) = report.failures.into_iter().next() {
            return Err(error.into());
        }
        self.retry_pending(false);
        Ok(snapshot.id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection Signals
    // ─────────────────────────────────────────────────────────────────────────

    async fn handle_signal(&mut self, signal: LiveSignal) -> bool {
        match signal {
            LiveSignal::Connected => {
                self.observe_state();
                if let Err(e) = self.refresh_server_key().await {
                    warn!(error = %e, "could not refresh server key");
                }
                self.refresh_requested = false;
                self.refresh_and_resolve().await;
                self.flush_outbox().await;
                true
            }
            LiveSignal::Reconnecting { retry_in } => {
                debug!(retry_in_secs = retry_in.as_secs(), "live connection lost");
                self.observe_state();
                true
            }
            LiveSignal::Event(event) => {
                self.on_live_event(event);
                true
            }
            LiveSignal::Closed => {
                self.observe_state();
                false
            }
        }
    }

    /// Publish a status change and drop the server key once disconnected.
    fn observe_state(&mut self) {
        let state = self.connection.state();
        if !state.is_connected() {
            self.keys.clear_server_public_key();
        }

        let status = ConnectionStatus::from(state);
        if status != self.status {
            self.status = status;
            self.emit(SessionEvent::ConnectionChanged(status));
        }
    }

    async fn refresh_server_key(&mut self) -> Result<()> {
        let pem = self.backend.server_public_key().await?;
        self.keys.set_server_public_key(&pem)?;
        Ok(())
    }

    async fn ensure_server_key(&mut self) -> Result<()> {
        match self.keys.server_key() {
            ServerKeySlot::Ready(_) => Ok(()),
            _ => self.refresh_server_key().await,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // History and Pending Events
    // ─────────────────────────────────────────────────────────────────────────

    async fn refresh_history(&mut self) -> Result<HistoryReport> {
        let report = HistorySync::new(&self.keys, &mut self.store)
            .fetch_channels_and_backlog(self.backend.as_ref(), self.identity.id)
            .await?;
        self.publish_report(&report);
        Ok(report)
    }

    async fn refresh_and_resolve(&mut self) {
        match self.refresh_history().await {
            Ok(_) => self.retry_pending(true),
            Err(e) => {
                warn!(error = %e, "history refresh failed, keeping buffered events");
                self.retry_pending(false);
            }
        }
    }

    /// Re-attempt buffered events. With `drop_unresolved`, events whose
    /// channel is still unknown are dropped; otherwise they stay buffered.
    fn retry_pending(&mut self, drop_unresolved: bool) {
        for pending in self.pending.drain() {
            if self.store.contains(&pending.channel) {
                self.apply_live_event(pending.channel, &pending.event);
            } else if drop_unresolved {
                debug!(channel = %pending.channel, "dropping event for unjoined channel");
                self.emit(SessionEvent::EventDropped {
                    channel: pending.channel,
                    reason: DropReason::Unresolved,
                });
            } else {
                self.pending
                    .push(pending.channel, pending.event, pending.received_at);
            }
        }
    }

    fn expire(&mut self, now: Instant) {
        for expired in self.pending.expire(now) {
            debug!(channel = %expired.channel, "buffered event expired");
            self.emit(SessionEvent::EventDropped {
                channel: expired.channel,
                reason: DropReason::Expired,
            });
        }

        while self.outbox.front().is_some_and(|q| q.deadline <= now) {
            if let Some(queued) = self.outbox.pop_front() {
                self.fail_queued(queued, "timed out waiting for connection");
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let outbox = self.outbox.front().map(|q| q.deadline);
        match (outbox, self.pending.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Notifications
    // ─────────────────────────────────────────────────────────────────────────

    fn emit(&self, event: SessionEvent) {
        trace!(?event, "session event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish_append(&self, channel: ChannelId, outcome: AppendOutcome) {
        match outcome {
            AppendOutcome::Appended(seq) => self.emit(SessionEvent::MessageAppended { channel, seq }),
            AppendOutcome::Promoted(seq) => self.emit(SessionEvent::MessagePromoted { channel, seq }),
            AppendOutcome::Duplicate(seq) => trace!(channel = %channel, seq, "duplicate delivery"),
        }
    }

    fn publish_report(&self, report: &HistoryReport) {
        for &id in &report.channels_created {
            self.emit(SessionEvent::ChannelAdded(id));
        }
        for &(channel, seq) in &report.appended {
            self.emit(SessionEvent::MessageAppended { channel, seq });
        }
        for &(channel, seq) in &report.promoted {
            self.emit(SessionEvent::MessagePromoted { channel, seq });
        }
        for (channel, error) in &report.undecryptable {
            self.emit(SessionEvent::ChannelWarning {
                channel: *channel,
                reason: error.to_string(),
            });
        }
        for (channel, error) in &report.failures {
            self.emit(SessionEvent::ChannelWarning {
                channel: *channel,
                reason: error.to_string(),
            });
        }
    }
}
