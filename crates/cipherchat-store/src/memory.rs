//! The channel store.
//!
//! Owns every channel record, channel key and message log of a session. It
//! is a plain value owned by the session coordinator; all mutation goes
//! through `&mut self`.

use std::collections::HashMap;

use tracing::{debug, trace};

use cipherchat_core::{ChannelId, ChannelKind};
use cipherchat_keys::ChannelKey;

use crate::channel::{Channel, Delivery, NewMessage, StoredMessage};
use crate::error::{Result, StoreError};
use crate::outcome::{AppendOutcome, UpsertOutcome};

/// In-memory channel state for one session.
#[derive(Debug, Default)]
pub struct ChannelStore {
    channels: HashMap<ChannelId, Channel>,
    /// Creation order.
    order: Vec<ChannelId>,
    active: Option<ChannelId>,
    next_seq: u64,
}

impl ChannelStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Channels
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a channel unless it is already known.
    ///
    /// An existing record keeps its key, name and messages; the arguments are
    /// ignored in that case.
    pub fn upsert_channel(
        &mut self,
        id: ChannelId,
        name: impl Into<String>,
        key: ChannelKey,
    ) -> UpsertOutcome {
        if self.channels.contains_key(&id) {
            trace!(channel = %id, "channel already known");
            return UpsertOutcome::Existing;
        }

        let name = name.into();
        debug!(channel = %id, name = %name, "channel added");
        self.channels.insert(id, Channel::new(id, name, key));
        self.order.push(id);
        UpsertOutcome::Created
    }

    /// Remove a channel together with its key and log.
    ///
    /// Removing an unknown channel does nothing. If the removed channel was
    /// active, the selection moves to the first remaining channel of the same
    /// kind, then to any channel.
    pub fn remove_channel(&mut self, id: &ChannelId) -> Option<Channel> {
        let channel = self.channels.remove(id)?;
        self.order.retain(|c| c != id);

        if self.active == Some(*id) {
            self.active = self
                .order
                .iter()
                .find(|c| c.kind() == id.kind())
                .or_else(|| self.order.first())
                .copied();
            debug!(removed = %id, active = ?self.active, "active channel moved");
        }

        debug!(channel = %id, "channel removed");
        Some(channel)
    }

    pub fn contains(&self, id: &ChannelId) -> bool {
        self.channels.contains_key(id)
    }

    pub fn channel(&self, id: &ChannelId) -> Option<&Channel> {
        self.channels.get(id)
    }

    /// All channels in creation order.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> + '_ {
        self.order.iter().filter_map(|id| self.channels.get(id))
    }

    /// Channels of one kind in creation order.
    pub fn channels_of_kind(&self, kind: ChannelKind) -> impl Iterator<Item = &Channel> + '_ {
        self.channels().filter(move |c| c.kind() == kind)
    }

    pub fn channel_key(&self, id: &ChannelId) -> Option<&ChannelKey> {
        self.channels.get(id).map(Channel::key)
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────────────────

    pub fn active_channel(&self) -> Option<ChannelId> {
        self.active
    }

    pub fn set_active_channel(&mut self, id: ChannelId) -> Result<()> {
        if !self.channels.contains_key(&id) {
            return Err(StoreError::ChannelNotFound(id));
        }
        self.active = Some(id);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a message to a channel log.
    ///
    /// With `persist == false` the message is a transient echo of a local
    /// send. A later persisted delivery with the same digest promotes the
    /// echo in place; any other repeat is reported as a duplicate.
    pub fn append_message(
        &mut self,
        id: &ChannelId,
        message: NewMessage,
        persist: bool,
    ) -> Result<AppendOutcome> {
        let channel = self
            .channels
            .get_mut(id)
            .ok_or(StoreError::ChannelNotFound(*id))?;

        if let Some(seq) = channel.seq_of(&message.digest) {
            if let Some(existing) = channel.get_mut(seq) {
                if persist && existing.is_transient() {
                    existing.delivery = Delivery::Persisted;
                    trace!(channel = %id, seq, "echo promoted");
                    return Ok(AppendOutcome::Promoted(seq));
                }
            }
            trace!(channel = %id, seq, digest = %message.digest, "duplicate delivery");
            return Ok(AppendOutcome::Duplicate(seq));
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        channel.push(StoredMessage {
            seq,
            sender: message.sender,
            text: message.text,
            digest: message.digest,
            delivery: if persist {
                Delivery::Persisted
            } else {
                Delivery::Transient
            },
        });
        trace!(channel = %id, seq, persist, "message appended");
        Ok(AppendOutcome::Appended(seq))
    }

    /// Drop a transient echo after its send failed.
    ///
    /// Returns whether anything was removed. Persisted entries are never
    /// removed.
    pub fn discard_transient(&mut self, id: &ChannelId, seq: u64) -> Result<bool> {
        let channel = self
            .channels
            .get_mut(id)
            .ok_or(StoreError::ChannelNotFound(*id))?;

        let transient = channel
            .messages()
            .iter()
            .any(|m| m.seq == seq && m.is_transient());
        if !transient {
            return Ok(false);
        }

        channel.remove(seq);
        debug!(channel = %id, seq, "echo discarded");
        Ok(true)
    }

    /// The log of a channel in append order.
    pub fn messages(&self, id: &ChannelId) -> Result<&[StoredMessage]> {
        self.channels
            .get(id)
            .map(Channel::messages)
            .ok_or(StoreError::ChannelNotFound(*id))
    }
}
