//! Channel records and their message logs.

use std::collections::HashMap;

use cipherchat_core::{ChannelId, ChannelKind, MessageDigest, Sender};
use cipherchat_keys::ChannelKey;

/// Whether the server has confirmed a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A local echo of an outgoing message, not yet acknowledged.
    Transient,
    /// Confirmed by the server (history, live delivery or send ack).
    Persisted,
}

/// A message as handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender: Sender,
    pub text: String,
    pub digest: MessageDigest,
}

impl NewMessage {
    /// Build a message whose digest is computed from the ciphertext it
    /// arrived as.
    pub fn from_delivery(
        channel: &ChannelId,
        sender: Sender,
        text: impl Into<String>,
        ciphertext: &str,
    ) -> Self {
        let digest = MessageDigest::compute(channel, &sender.id, ciphertext);
        Self {
            sender,
            text: text.into(),
            digest,
        }
    }
}

/// A message in a channel log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Local sequence number, increasing across the whole store.
    pub seq: u64,
    pub sender: Sender,
    pub text: String,
    pub digest: MessageDigest,
    pub delivery: Delivery,
}

impl StoredMessage {
    pub fn is_transient(&self) -> bool {
        self.delivery == Delivery::Transient
    }
}

/// One channel: identity, display name, key and message log.
#[derive(Debug, Clone)]
pub struct Channel {
    id: ChannelId,
    name: String,
    key: ChannelKey,
    messages: Vec<StoredMessage>,
    /// digest -> seq
    index: HashMap<MessageDigest, u64>,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, name: String, key: ChannelKey) -> Self {
        Self {
            id,
            name,
            key,
            messages: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn kind(&self) -> ChannelKind {
        self.id.kind()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    /// The log in append order.
    pub fn messages(&self) -> &[StoredMessage] {
        &self.messages
    }

    pub(crate) fn seq_of(&self, digest: &MessageDigest) -> Option<u64> {
        self.index.get(digest).copied()
    }

    pub(crate) fn get_mut(&mut self, seq: u64) -> Option<&mut StoredMessage> {
        // Sequence numbers increase along the log.
        self.messages
            .binary_search_by_key(&seq, |m| m.seq)
            .ok()
            .map(move |i| &mut self.messages[i])
    }

    pub(crate) fn push(&mut self, message: StoredMessage) {
        self.index.insert(message.digest, message.seq);
        self.messages.push(message);
    }

    pub(crate) fn remove(&mut self, seq: u64) -> Option<StoredMessage> {
        let pos = self.messages.binary_search_by_key(&seq, |m| m.seq).ok()?;
        let message = self.messages.remove(pos);
        self.index.remove(&message.digest);
        Some(message)
    }
}
