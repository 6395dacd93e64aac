//! Outcomes of store mutations.
//!
//! Re-delivery is normal, not an error: the history fetch and the live
//! transport overlap, and reconnects replay. Mutations therefore report what
//! they did instead of failing on repeats.

/// Result of upserting a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The channel was new and has been recorded.
    Created,
    /// The channel already existed; its key, name and log were kept.
    Existing,
}

impl UpsertOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }
}

/// Result of appending a message.
///
/// Every variant carries the local sequence number of the entry in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new entry was added at the end of the log.
    Appended(u64),
    /// A transient echo was confirmed in place.
    Promoted(u64),
    /// The message was already in the log (idempotent, not an error).
    Duplicate(u64),
}

impl AppendOutcome {
    /// Sequence number of the affected entry.
    pub fn seq(&self) -> u64 {
        match *self {
            Self::Appended(seq) | Self::Promoted(seq) | Self::Duplicate(seq) => seq,
        }
    }

    /// Whether the log changed.
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Duplicate(_))
    }
}
