//! Proptest generators for property-based testing.

use proptest::prelude::*;

use cipherchat_core::{ChannelId, RoomId, Sender, UserId};

/// Generate a user id.
pub fn user_id() -> impl Strategy<Value = UserId> {
    (1i64..10_000).prop_map(UserId)
}

/// Generate a channel id of either kind.
pub fn channel_id() -> impl Strategy<Value = ChannelId> {
    prop_oneof![
        (1i64..10_000).prop_map(|id| ChannelId::Group(RoomId(id))),
        user_id().prop_map(ChannelId::Direct),
    ]
}

/// Generate a sender with a plausible username.
pub fn sender() -> impl Strategy<Value = Sender> {
    (user_id(), "[a-z][a-z0-9_]{0,19}").prop_map(|(id, name)| Sender::new(id, name))
}

/// Generate message text that passes validation: non-blank, already trimmed.
pub fn message_text() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 ,.!?'-]{0,78}[A-Za-z0-9.!?]"
}

/// Generate arbitrary unicode text, possibly empty or blank.
pub fn any_text(max_len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 0..=max_len).prop_map(|chars| chars.into_iter().collect())
}
