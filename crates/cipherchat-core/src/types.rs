//! Strong type definitions for cipherchat.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A server-assigned user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A server-assigned group room identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RoomId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// The two flavours of channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// A shared room with any number of members.
    Group,
    /// A one-to-one conversation with another user.
    Direct,
}

/// Identifies a channel.
///
/// Room ids and user ids come from different server tables and may collide,
/// so the kind is part of the identity. A direct conversation is addressed
/// by the peer's user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    Group(RoomId),
    Direct(UserId),
}

impl ChannelId {
    /// Address a group room.
    pub const fn group(id: i64) -> Self {
        Self::Group(RoomId(id))
    }

    /// Address the direct conversation with `peer`.
    pub const fn direct(peer: i64) -> Self {
        Self::Direct(UserId(peer))
    }

    /// The kind of channel this id addresses.
    pub const fn kind(&self) -> ChannelKind {
        match self {
            Self::Group(_) => ChannelKind::Group,
            Self::Direct(_) => ChannelKind::Direct,
        }
    }

    /// The raw server-side identifier.
    pub const fn raw(&self) -> i64 {
        match self {
            Self::Group(room) => room.0,
            Self::Direct(user) => user.0,
        }
    }

    /// Stable byte encoding used for digests.
    pub fn to_bytes(&self) -> [u8; 9] {
        let mut out = [0u8; 9];
        out[0] = match self.kind() {
            ChannelKind::Group => b'g',
            ChannelKind::Direct => b'd',
        };
        out[1..].copy_from_slice(&self.raw().to_be_bytes());
        out
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(room) => write!(f, "group:{}", room),
            Self::Direct(user) => write!(f, "direct:{}", user),
        }
    }
}

/// The author of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sender {
    pub id: UserId,
    pub name: String,
}

impl Sender {
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_kind() {
        assert_eq!(ChannelId::group(3).kind(), ChannelKind::Group);
        assert_eq!(ChannelId::direct(3).kind(), ChannelKind::Direct);
    }

    #[test]
    fn test_group_and_direct_do_not_collide() {
        let group = ChannelId::group(7);
        let direct = ChannelId::direct(7);

        assert_ne!(group, direct);
        assert_ne!(group.to_bytes(), direct.to_bytes());
        assert_eq!(group.raw(), direct.raw());
    }

    #[test]
    fn test_channel_id_display() {
        assert_eq!(ChannelId::group(12).to_string(), "group:12");
        assert_eq!(ChannelId::direct(4).to_string(), "direct:4");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&UserId(42)).unwrap();
        assert_eq!(json, "42");

        let room: RoomId = serde_json::from_str("9").unwrap();
        assert_eq!(room, RoomId(9));
    }
}
