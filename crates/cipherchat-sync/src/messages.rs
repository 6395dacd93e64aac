//! Live update frames.
//!
//! Frames are JSON text, externally tagged by kind:
//!
//! ```text
//! {"Group":{"sender_id":1,"sender_name":"alice","group_id":3,"content":"01ab.."}}
//! {"Direct":{"sender":1,"recipient":2,"content":"01ab.."}}
//! ```
//!
//! `content` is always ciphertext. Any other JSON object is accepted as
//! [`LiveEvent::Unknown`] so newer servers can add kinds without breaking
//! older clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cipherchat_core::{ChannelId, RoomId, Sender, UserId};

use crate::error::{Result, SyncError};

/// A message posted to a group room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPayload {
    pub sender_id: UserId,
    pub sender_name: String,
    pub group_id: RoomId,
    pub content: String,
}

/// A message in a direct conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectPayload {
    pub sender: UserId,
    pub recipient: UserId,
    pub content: String,
}

/// An event received from (or sent over) the live transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    Group(GroupPayload),
    Direct(DirectPayload),
    /// A well-formed frame of a kind this client does not handle.
    Unknown,
}

/// The closed wire shape; `Unknown` never goes on the wire.
#[derive(Serialize, Deserialize)]
enum WireEvent {
    Group(GroupPayload),
    Direct(DirectPayload),
}

const KNOWN_TAGS: [&str; 2] = ["Group", "Direct"];

impl LiveEvent {
    /// Parse a text frame.
    ///
    /// Frames that are not JSON objects, or that carry a known tag with a
    /// malformed body, are [`SyncError::Frame`].
    pub fn parse(frame: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(frame)?;

        let object = value
            .as_object()
            .ok_or_else(|| SyncError::Frame("frame is not a JSON object".into()))?;
        if !object.keys().any(|k| KNOWN_TAGS.contains(&k.as_str())) {
            return Ok(LiveEvent::Unknown);
        }

        Ok(match serde_json::from_value::<WireEvent>(value)? {
            WireEvent::Group(payload) => LiveEvent::Group(payload),
            WireEvent::Direct(payload) => LiveEvent::Direct(payload),
        })
    }

    /// Serialize to a text frame.
    pub fn to_frame(&self) -> Result<String> {
        let wire = match self {
            LiveEvent::Group(payload) => WireEvent::Group(payload.clone()),
            LiveEvent::Direct(payload) => WireEvent::Direct(payload.clone()),
            LiveEvent::Unknown => {
                return Err(SyncError::Frame("unknown events cannot be sent".into()))
            }
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// The ciphertext carried by the event.
    pub fn content(&self) -> Option<&str> {
        match self {
            LiveEvent::Group(p) => Some(&p.content),
            LiveEvent::Direct(p) => Some(&p.content),
            LiveEvent::Unknown => None,
        }
    }

    pub fn sender_id(&self) -> Option<UserId> {
        match self {
            LiveEvent::Group(p) => Some(p.sender_id),
            LiveEvent::Direct(p) => Some(p.sender),
            LiveEvent::Unknown => None,
        }
    }

    /// The channel this event belongs to, from the point of view of `me`.
    ///
    /// A direct message lives in the conversation with the other party: the
    /// sender for incoming messages, the recipient for echoes of our own.
    pub fn channel_for(&self, me: UserId) -> Option<ChannelId> {
        match self {
            LiveEvent::Group(p) => Some(ChannelId::Group(p.group_id)),
            LiveEvent::Direct(p) if p.sender == me => Some(ChannelId::Direct(p.recipient)),
            LiveEvent::Direct(p) => Some(ChannelId::Direct(p.sender)),
            LiveEvent::Unknown => None,
        }
    }

    /// Build the frame for a message we are sending on `channel`.
    pub fn outgoing(channel: ChannelId, me: &Sender, content: String) -> Self {
        match channel {
            ChannelId::Group(group_id) => LiveEvent::Group(GroupPayload {
                sender_id: me.id,
                sender_name: me.name.clone(),
                group_id,
                content,
            }),
            ChannelId::Direct(recipient) => LiveEvent::Direct(DirectPayload {
                sender: me.id,
                recipient,
                content,
            }),
        }
    }
}
