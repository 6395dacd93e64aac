//! Notifications published by a session.

use cipherchat_core::ChannelId;
use cipherchat_sync::ConnectionState;

/// Connection status as shown to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    /// Connecting or waiting to retry.
    Reconnecting,
    Disconnected,
}

impl From<ConnectionState> for ConnectionStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::Connected,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => {
                Self::Reconnecting
            }
            ConnectionState::Disconnected => Self::Disconnected,
        }
    }
}

/// Why a buffered live event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Its channel was still unknown after a refresh.
    Unresolved,
    /// It waited longer than the pending TTL.
    Expired,
    /// The buffer was full.
    Overflow,
    /// The session closed.
    Closed,
}

/// Something changed in the session.
///
/// Sequence numbers refer to [`StoredMessage::seq`](cipherchat_store::StoredMessage).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ChannelAdded(ChannelId),
    ChannelRemoved(ChannelId),
    MessageAppended { channel: ChannelId, seq: u64 },
    /// A transient echo was confirmed.
    MessagePromoted { channel: ChannelId, seq: u64 },
    /// A transient echo was removed.
    MessageDiscarded { channel: ChannelId, seq: u64 },
    ConnectionChanged(ConnectionStatus),
    /// A send that had been accepted failed later.
    SendFailed {
        channel: ChannelId,
        seq: u64,
        reason: String,
    },
    EventDropped {
        channel: ChannelId,
        reason: DropReason,
    },
    /// Something in a channel could not be processed, e.g. a message that
    /// did not decrypt.
    ChannelWarning { channel: ChannelId, reason: String },
}
