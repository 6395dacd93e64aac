//! Buffer for live events addressed to channels not yet known.
//!
//! A live event can overtake the history fetch that introduces its channel.
//! Such events wait here until the next refresh, bounded both in number and
//! in age.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use cipherchat_core::ChannelId;

use crate::messages::LiveEvent;

/// An event waiting for its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub channel: ChannelId,
    pub event: LiveEvent,
    pub received_at: Instant,
}

/// Bounded FIFO of pending events.
#[derive(Debug)]
pub struct PendingEvents {
    entries: VecDeque<PendingEvent>,
    capacity: usize,
    ttl: Duration,
}

impl PendingEvents {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            ttl,
        }
    }

    /// Buffer an event. When full, the oldest entry is evicted and returned.
    pub fn push(
        &mut self,
        channel: ChannelId,
        event: LiveEvent,
        now: Instant,
    ) -> Option<PendingEvent> {
        if self.capacity == 0 {
            return Some(PendingEvent {
                channel,
                event,
                received_at: now,
            });
        }
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(PendingEvent {
            channel,
            event,
            received_at: now,
        });
        evicted
    }

    /// Remove and return entries older than the TTL.
    pub fn expire(&mut self, now: Instant) -> Vec<PendingEvent> {
        let mut expired = Vec::new();
        while let Some(front) = self.entries.front() {
            if now.duration_since(front.received_at) < self.ttl {
                break;
            }
            if let Some(entry) = self.entries.pop_front() {
                expired.push(entry);
            }
        }
        expired
    }

    /// Take every entry, oldest first.
    pub fn drain(&mut self) -> Vec<PendingEvent> {
        self.entries.drain(..).collect()
    }

    /// When the oldest entry expires.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.front().map(|e| e.received_at + self.ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
