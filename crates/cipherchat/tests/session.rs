//! End-to-end session scenarios against the in-memory server.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use cipherchat::core::{ChannelId, ValidationError};
use cipherchat::store::StoreError;
use cipherchat::sync::{
    ConnectionState, Identity, MemoryTransport, MemoryTransportHandle, RemoteError, SyncError,
};
use cipherchat::{
    AccountClient, ConnectionStatus, Credentials, DropReason, PasswordChange, SendOutcome,
    SessionConfig, SessionError, SessionEvent, SignupForm, SyncCoordinator,
};
use cipherchat_testkit::{init_tracing, FakeServer};

const PING: &str = r#"{"Typing":{"user":2}}"#;

type Session = SyncCoordinator<FakeServer, MemoryTransport>;

struct Harness {
    server: Arc<FakeServer>,
    handle: MemoryTransportHandle,
    alice: Identity,
    bob: Identity,
    lobby: ChannelId,
}

impl Harness {
    /// Alice and Bob, both members of "lobby".
    fn new() -> Self {
        init_tracing();
        let server = Arc::new(FakeServer::new());
        let alice = server.register_user("alice", "password-a");
        let bob = server.register_user("bob", "password-b");
        let room = server.create_room("lobby", None);
        server.join(room, &alice);
        server.join(room, &bob);
        server.login_as(&alice);

        let (_, handle) = MemoryTransport::pair();
        Self {
            server,
            handle,
            alice,
            bob,
            lobby: ChannelId::Group(room),
        }
    }

    fn room(&self) -> cipherchat::RoomId {
        match self.lobby {
            ChannelId::Group(room) => room,
            ChannelId::Direct(_) => unreachable!(),
        }
    }

    fn session(&mut self, config: SessionConfig) -> Session {
        let (transport, handle) = MemoryTransport::pair();
        self.handle = handle;
        SyncCoordinator::new(
            Arc::clone(&self.server),
            self.alice.clone(),
            transport,
            config,
        )
        .unwrap()
    }

    /// A started session that has completed its first connect.
    async fn connected(&mut self) -> (Session, broadcast::Receiver<SessionEvent>) {
        let mut session = self.session(SessionConfig::default());
        let events = session.subscribe();
        session.start().await.unwrap();
        assert!(session.step().await);
        assert_eq!(session.connection_state(), ConnectionState::Connected);
        (session, events)
    }

    /// Drop the live connection and let the session notice.
    async fn disconnect(&self, session: &mut Session) {
        self.handle.push_error("connection reset");
        assert!(session.step().await);
        assert!(matches!(
            session.connection_state(),
            ConnectionState::Reconnecting { .. }
        ));
    }
}

fn texts(session: &Session, channel: ChannelId) -> Vec<String> {
    session
        .store()
        .messages(&channel)
        .unwrap()
        .iter()
        .map(|m| m.text.clone())
        .collect()
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn retry_delay(session: &Session) -> Option<u64> {
    match session.connection_state() {
        ConnectionState::Reconnecting { retry_in, .. } => Some(retry_in.as_secs()),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// History and live merge
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_history_then_live_keeps_order() {
    let mut h = Harness::new();
    for text in ["A", "B", "C"] {
        h.server.post_group(h.room(), &h.bob, text);
    }

    let (mut session, _events) = h.connected().await;
    assert_eq!(texts(&session, h.lobby), ["A", "B", "C"]);

    for text in ["D", "E"] {
        h.handle.push_frame(h.server.post_group(h.room(), &h.bob, text));
        assert!(session.step().await);
    }

    assert_eq!(texts(&session, h.lobby), ["A", "B", "C", "D", "E"]);
    let seqs: Vec<u64> = session
        .store()
        .messages(&h.lobby)
        .unwrap()
        .iter()
        .map(|m| m.seq)
        .collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_history_message_repeated_live_is_stored_once() {
    let mut h = Harness::new();
    let frame = h.server.post_group(h.room(), &h.bob, "hi");

    let (mut session, _events) = h.connected().await;
    h.handle.push_frame(frame);
    assert!(session.step().await);

    assert_eq!(texts(&session, h.lobby), ["hi"]);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_live_event_appends_once() {
    let mut h = Harness::new();
    let (mut session, mut events) = h.connected().await;
    drain(&mut events);

    let frame = h.server.post_group(h.room(), &h.bob, "twice");
    h.handle.push_frame(frame.clone());
    h.handle.push_frame(frame);
    assert!(session.step().await);
    assert!(session.step().await);

    assert_eq!(texts(&session, h.lobby), ["twice"]);
    let appended = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::MessageAppended { .. }))
        .count();
    assert_eq!(appended, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_refreshes_history() {
    let mut h = Harness::new();
    let (mut session, _events) = h.connected().await;
    let fetches = h.server.history_fetches();

    h.disconnect(&mut session).await;
    // Posted while the client was away: only the refresh can deliver it.
    h.server.post_group(h.room(), &h.bob, "missed");
    assert!(session.step().await);

    assert_eq!(session.connection_state(), ConnectionState::Connected);
    assert_eq!(h.server.history_fetches(), fetches + 1);
    assert_eq!(texts(&session, h.lobby), ["missed"]);
}

#[tokio::test(start_paused = true)]
async fn test_undecryptable_live_message_warns() {
    let mut h = Harness::new();
    let (mut session, mut events) = h.connected().await;
    drain(&mut events);

    let frame = format!(
        r#"{{"Group":{{"sender_id":{},"sender_name":"bob","group_id":{},"content":"01deadbeef"}}}}"#,
        h.bob.id,
        h.room()
    );
    h.handle.push_frame(frame);
    assert!(session.step().await);

    assert!(texts(&session, h.lobby).is_empty());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::ChannelWarning { channel, .. } if *channel == h.lobby)));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_frame_kind_is_ignored() {
    let mut h = Harness::new();
    let (mut session, mut events) = h.connected().await;
    drain(&mut events);

    h.handle.push_frame(PING);
    assert!(session.step().await);

    assert!(drain(&mut events).is_empty());
    assert_eq!(session.pending_events(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconnect backoff
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_and_resets() {
    let mut h = Harness::new();
    let mut session = h.session(SessionConfig::default());
    let mut events = session.subscribe();
    h.handle.fail_next_opens(3);

    session.start().await.unwrap();
    let mut delays = Vec::new();
    for _ in 0..3 {
        assert!(session.step().await);
        delays.push(retry_delay(&session).unwrap());
    }
    assert_eq!(delays, [1, 2, 4]);

    assert!(session.step().await);
    assert_eq!(session.status(), ConnectionStatus::Connected);

    h.disconnect(&mut session).await;
    assert_eq!(retry_delay(&session), Some(1));

    let statuses: Vec<ConnectionStatus> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::ConnectionChanged(status) => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        [
            ConnectionStatus::Reconnecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Reconnecting,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_server_key_dropped_while_disconnected() {
    let mut h = Harness::new();
    let (mut session, _events) = h.connected().await;
    assert!(matches!(
        session.keys().server_key(),
        cipherchat::keys::ServerKeySlot::Ready(_)
    ));

    h.disconnect(&mut session).await;
    assert_eq!(
        session.keys().server_key(),
        &cipherchat::keys::ServerKeySlot::Missing
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Sending
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_send_while_connected_is_promoted() {
    let mut h = Harness::new();
    let (mut session, mut events) = h.connected().await;
    drain(&mut events);

    let outcome = session.send(h.lobby, "  hello  ").await.unwrap();
    let seq = outcome.seq();
    assert_eq!(outcome, SendOutcome::Delivered(seq));

    let messages = session.store().messages(&h.lobby).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "hello");
    assert_eq!(messages[0].sender, h.alice.as_sender());
    assert!(!messages[0].is_transient());

    assert_eq!(
        drain(&mut events),
        [
            SessionEvent::MessageAppended {
                channel: h.lobby,
                seq
            },
            SessionEvent::MessagePromoted {
                channel: h.lobby,
                seq
            },
        ]
    );

    // The server relays the message back to every member, including us.
    let sent = h.handle.sent();
    assert_eq!(sent.len(), 1);
    let relayed = h.server.accept_frame(&sent[0]).unwrap();
    h.handle.push_frame(relayed);
    assert!(session.step().await);
    assert_eq!(texts(&session, h.lobby), ["hello"]);
}

#[tokio::test(start_paused = true)]
async fn test_direct_send_echo_maps_to_peer() {
    let mut h = Harness::new();
    h.server.open_direct(&h.alice, &h.bob);
    let (mut session, _events) = h.connected().await;
    let with_bob = ChannelId::Direct(h.bob.id);

    session.send(with_bob, "psst").await.unwrap();
    let relayed = h.server.accept_frame(&h.handle.sent()[0]).unwrap();
    h.handle.push_frame(relayed);
    assert!(session.step().await);

    assert_eq!(texts(&session, with_bob), ["psst"]);
    assert_eq!(session.pending_events(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_discards_echo() {
    let mut h = Harness::new();
    let (mut session, mut events) = h.connected().await;
    drain(&mut events);

    h.handle.fail_next_sends(1);
    let err = session.send(h.lobby, "lost").await.unwrap_err();
    assert!(matches!(err, SessionError::Sync(SyncError::Transport(_))));

    assert!(texts(&session, h.lobby).is_empty());
    assert!(matches!(
        session.connection_state(),
        ConnectionState::Reconnecting { .. }
    ));
    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::MessageDiscarded { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::MessagePromoted { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_send_while_reconnecting_times_out() {
    let mut h = Harness::new();
    let config = SessionConfig {
        send_timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    };
    let mut session = h.session(config);
    let mut events = session.subscribe();
    session.start().await.unwrap();
    assert!(session.step().await);
    h.disconnect(&mut session).await;
    h.handle.fail_next_opens(100);
    drain(&mut events);

    let outcome = session.send(h.lobby, "later").await.unwrap();
    let seq = outcome.seq();
    assert_eq!(outcome, SendOutcome::Queued(seq));
    let echo = &session.store().messages(&h.lobby).unwrap()[0];
    assert!(echo.is_transient());

    for _ in 0..10 {
        if session.queued_sends() == 0 {
            break;
        }
        assert!(session.step().await);
    }

    assert_eq!(session.queued_sends(), 0);
    assert!(texts(&session, h.lobby).is_empty());
    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::MessageDiscarded {
        channel: h.lobby,
        seq
    }));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::SendFailed { seq: s, .. } if *s == seq)));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::MessagePromoted { .. })));
    assert!(h.handle.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_queued_send_flushed_on_reconnect() {
    let mut h = Harness::new();
    let (mut session, mut events) = h.connected().await;
    h.disconnect(&mut session).await;
    drain(&mut events);

    let seq = match session.send(h.lobby, "queued").await.unwrap() {
        SendOutcome::Queued(seq) => seq,
        other => panic!("expected a queued send, got {:?}", other),
    };

    assert!(session.step().await);
    assert_eq!(session.connection_state(), ConnectionState::Connected);
    assert_eq!(session.queued_sends(), 0);
    assert_eq!(h.handle.sent().len(), 1);

    let messages = session.store().messages(&h.lobby).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].seq, seq);
    assert!(!messages[0].is_transient());
    assert!(drain(&mut events).contains(&SessionEvent::MessagePromoted {
        channel: h.lobby,
        seq
    }));
}

#[tokio::test(start_paused = true)]
async fn test_outbox_is_bounded() {
    let mut h = Harness::new();
    let config = SessionConfig {
        outbox_capacity: 1,
        ..SessionConfig::default()
    };
    let mut session = h.session(config);
    session.start().await.unwrap();

    session.send(h.lobby, "one").await.unwrap();
    let err = session.send(h.lobby, "two").await.unwrap_err();
    assert!(matches!(err, SessionError::OutboxFull(1)));
    assert_eq!(texts(&session, h.lobby), ["one"]);
}

#[tokio::test(start_paused = true)]
async fn test_close_fails_queued_sends() {
    let mut h = Harness::new();
    let (mut session, mut events) = h.connected().await;
    h.disconnect(&mut session).await;
    drain(&mut events);

    let seq = session.send(h.lobby, "never").await.unwrap().seq();
    session.close().await;

    assert_eq!(session.status(), ConnectionStatus::Disconnected);
    assert_eq!(session.queued_sends(), 0);
    assert!(texts(&session, h.lobby).is_empty());
    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::SendFailed {
        channel: h.lobby,
        seq,
        reason: "session closed".into()
    }));
    assert!(events.contains(&SessionEvent::ConnectionChanged(
        ConnectionStatus::Disconnected
    )));
    assert!(!session.step().await);
}

#[tokio::test(start_paused = true)]
async fn test_send_to_unknown_channel_fails() {
    let mut h = Harness::new();
    let (mut session, _events) = h.connected().await;

    let err = session
        .send(ChannelId::group(999), "hello")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Store(StoreError::ChannelNotFound(_))
    ));
    assert!(h.handle.sent().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Live events for channels not yet known
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_live_event_for_new_direct_resolved_by_refresh() {
    let mut h = Harness::new();
    let carol = h.server.register_user("carol", "password-c");
    let (mut session, mut events) = h.connected().await;
    drain(&mut events);

    let with_carol = ChannelId::Direct(carol.id);
    h.handle
        .push_frame(h.server.post_direct(&carol, &h.alice, "hello alice"));
    assert!(session.step().await);
    assert_eq!(session.pending_events(), 1);
    assert!(!session.store().contains(&with_carol));

    h.handle.push_frame(PING);
    assert!(session.step().await);

    assert_eq!(session.pending_events(), 0);
    assert_eq!(texts(&session, with_carol), ["hello alice"]);
    assert_eq!(session.store().channel(&with_carol).unwrap().name(), "carol");
    assert!(drain(&mut events).contains(&SessionEvent::ChannelAdded(with_carol)));
}

#[tokio::test(start_paused = true)]
async fn test_live_event_for_unjoined_room_dropped() {
    let mut h = Harness::new();
    let other = h.server.create_room("other", None);
    h.server.join(other, &h.bob);
    let (mut session, mut events) = h.connected().await;
    drain(&mut events);

    h.handle
        .push_frame(h.server.post_group(other, &h.bob, "not for alice"));
    assert!(session.step().await);
    h.handle.push_frame(PING);
    assert!(session.step().await);

    assert!(!session.store().contains(&ChannelId::Group(other)));
    assert_eq!(session.pending_events(), 0);
    assert!(drain(&mut events).contains(&SessionEvent::EventDropped {
        channel: ChannelId::Group(other),
        reason: DropReason::Unresolved
    }));
}

#[tokio::test(start_paused = true)]
async fn test_pending_event_expires_when_refresh_fails() {
    let mut h = Harness::new();
    let carol = h.server.register_user("carol", "password-c");
    let (mut session, mut events) = h.connected().await;
    drain(&mut events);

    h.handle
        .push_frame(h.server.post_direct(&carol, &h.alice, "hello alice"));
    assert!(session.step().await);
    h.server.set_offline(true);

    // Refresh fails, the event waits out its TTL.
    assert!(session.step().await);

    assert_eq!(session.pending_events(), 0);
    assert!(!session.store().contains(&ChannelId::Direct(carol.id)));
    assert!(drain(&mut events).contains(&SessionEvent::EventDropped {
        channel: ChannelId::Direct(carol.id),
        reason: DropReason::Expired
    }));
}

#[tokio::test(start_paused = true)]
async fn test_pending_buffer_overflow_evicts_oldest() {
    let mut h = Harness::new();
    let other = h.server.create_room("other", None);
    let config = SessionConfig {
        pending_capacity: 1,
        ..SessionConfig::default()
    };
    let mut session = h.session(config);
    let mut events = session.subscribe();
    session.start().await.unwrap();
    assert!(session.step().await);
    drain(&mut events);

    let first = h.server.post_group(other, &h.bob, "first");
    let second = h.server.post_group(other, &h.bob, "second");
    session.on_live_event(cipherchat::sync::LiveEvent::parse(&first).unwrap());
    session.on_live_event(cipherchat::sync::LiveEvent::parse(&second).unwrap());

    assert_eq!(session.pending_events(), 1);
    assert_eq!(
        drain(&mut events),
        [SessionEvent::EventDropped {
            channel: ChannelId::Group(other),
            reason: DropReason::Overflow
        }]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel operations
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_create_channel_adds_room() {
    let mut h = Harness::new();
    let mut session = h.session(SessionConfig::default());
    let mut events = session.subscribe();
    session.start().await.unwrap();
    drain(&mut events);

    let id = session
        .create_channel("  book club ", None, false)
        .await
        .unwrap();

    assert_eq!(session.store().channel(&id).unwrap().name(), "book club");
    assert_eq!(drain(&mut events), [SessionEvent::ChannelAdded(id)]);
    let ChannelId::Group(room) = id else {
        panic!("expected a group channel");
    };
    assert_eq!(h.server.members(room), [h.alice.id]);
}

#[tokio::test(start_paused = true)]
async fn test_join_password_room_applies_backlog() {
    let mut h = Harness::new();
    let vault = h.server.create_room("vault", Some("open-sesame"));
    h.server.join(vault, &h.bob);
    h.server.post_group(vault, &h.bob, "welcome");

    let mut session = h.session(SessionConfig::default());
    session.start().await.unwrap();

    let err = session
        .create_channel("vault", Some("wrong"), true)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Remote(RemoteError::Denied(_))));
    assert!(!session.store().contains(&ChannelId::Group(vault)));

    let id = session
        .create_channel("vault", Some("open-sesame"), true)
        .await
        .unwrap();
    assert_eq!(id, ChannelId::Group(vault));
    assert_eq!(texts(&session, id), ["welcome"]);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_input_rejected_before_network() {
    let mut h = Harness::new();
    let mut session = h.session(SessionConfig::default());
    session.start().await.unwrap();
    let rooms = h.server.room_count();

    for (name, password, require) in [
        ("   ", None, false),
        ("a room name that is far too long", None, false),
        ("secret", None, true),
        ("secret", Some(""), true),
    ] {
        let err = session
            .create_channel(name, password, require)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)), "{}", name);
    }
    assert!(matches!(
        session.add_direct_peer("").await,
        Err(SessionError::Validation(ValidationError::Empty { .. }))
    ));
    assert!(matches!(
        session.send(h.lobby, " \n ").await,
        Err(SessionError::Validation(ValidationError::Empty { .. }))
    ));

    assert_eq!(h.server.key_fetches(), 0);
    assert_eq!(h.server.room_count(), rooms);
}

#[tokio::test(start_paused = true)]
async fn test_direct_peer_add_and_remove() {
    let mut h = Harness::new();
    let mut session = h.session(SessionConfig::default());
    let mut events = session.subscribe();
    session.start().await.unwrap();
    drain(&mut events);

    let id = session.add_direct_peer("bob").await.unwrap();
    assert_eq!(id, ChannelId::Direct(h.bob.id));
    assert_eq!(session.store().channel(&id).unwrap().name(), "bob");
    assert!(h.server.direct_is_open(h.alice.id, h.bob.id));

    session.remove_channel(id).await.unwrap();
    assert!(!session.store().contains(&id));
    assert!(!h.server.direct_is_open(h.alice.id, h.bob.id));
    assert_eq!(
        drain(&mut events),
        [SessionEvent::ChannelAdded(id), SessionEvent::ChannelRemoved(id)]
    );

    assert!(matches!(
        session.add_direct_peer("nobody").await,
        Err(SessionError::Remote(RemoteError::Denied(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_remove_room_leaves_on_server() {
    let mut h = Harness::new();
    let mut session = h.session(SessionConfig::default());
    session.start().await.unwrap();
    session.set_active_channel(h.lobby).unwrap();

    session.remove_channel(h.lobby).await.unwrap();
    assert!(!session.store().contains(&h.lobby));
    assert_eq!(session.store().active_channel(), None);
    assert_eq!(h.server.members(h.room()), [h.bob.id]);

    // A repeated removal is a local no-op: with the server unreachable, any
    // directory call would fail.
    h.server.set_offline(true);
    session.remove_channel(h.lobby).await.unwrap();
    assert_eq!(h.server.members(h.room()), [h.bob.id]);
}

#[tokio::test(start_paused = true)]
async fn test_history_failure_still_connects_and_retries() {
    let mut h = Harness::new();
    h.server.post_group(h.room(), &h.bob, "early");
    let mut session = h.session(SessionConfig::default());
    h.server.set_offline(true);

    assert!(session.start().await.is_none());
    assert_eq!(session.connection_state(), ConnectionState::Connecting);
    assert!(!session.store().contains(&h.lobby));

    h.server.set_offline(false);
    assert!(session.step().await);

    assert_eq!(session.connection_state(), ConnectionState::Connected);
    assert_eq!(texts(&session, h.lobby), ["early"]);
    assert_eq!(h.server.history_fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_session_for_current_user() {
    let h = Harness::new();
    let (transport, _handle) = MemoryTransport::pair();
    let session =
        SyncCoordinator::for_current_user(Arc::clone(&h.server), transport, SessionConfig::default())
            .await
            .unwrap();
    assert_eq!(session.identity(), &h.alice);
}

// ─────────────────────────────────────────────────────────────────────────────
// Account operations
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_with_wrapped_password() {
    let h = Harness::new();
    h.server.clear_session();
    let mut account = AccountClient::new(Arc::clone(&h.server)).unwrap();

    let wrong = Credentials::new("alice", "not-her-password").unwrap();
    assert!(matches!(
        account.login(&wrong).await,
        Err(SessionError::Remote(RemoteError::Denied(_)))
    ));

    let right = Credentials::new(" alice ", "password-a").unwrap();
    let me = account.login(&right).await.unwrap();
    assert_eq!(me, h.alice);
    assert_eq!(account.who_am_i().await.unwrap(), h.alice);

    account.logout().await.unwrap();
    assert_eq!(h.server.session(), None);
}

#[tokio::test]
async fn test_signup_then_login() {
    let h = Harness::new();
    let mut account = AccountClient::new(Arc::clone(&h.server)).unwrap();

    let form = SignupForm::new("Dana", "Scully", "dana@example.org", "dana", "trust-no-1").unwrap();
    account.signup(&form).await.unwrap();
    assert!(matches!(
        account.signup(&form).await,
        Err(SessionError::Remote(RemoteError::Denied(_)))
    ));

    let me = account
        .login(&Credentials::new("dana", "trust-no-1").unwrap())
        .await
        .unwrap();
    assert_eq!(me.username, "dana");
}

#[tokio::test]
async fn test_change_password() {
    let h = Harness::new();
    let mut account = AccountClient::new(Arc::clone(&h.server)).unwrap();

    let change = PasswordChange::new("password-a", "password-z", "password-z").unwrap();
    account.change_password(h.alice.id, &change).await.unwrap();
    assert_eq!(
        h.server.password_of(h.alice.id).as_deref(),
        Some("password-z")
    );

    let stale = PasswordChange::new("password-a", "password-y", "password-y").unwrap();
    assert!(matches!(
        account.change_password(h.alice.id, &stale).await,
        Err(SessionError::Remote(RemoteError::Denied(_)))
    ));
}

#[tokio::test]
async fn test_malformed_server_key_blocks_login() {
    let h = Harness::new();
    h.server.publish_key("-----BEGIN X25519 PUBLIC KEY-----\nnot base64\n-----END X25519 PUBLIC KEY-----");
    let mut account = AccountClient::new(Arc::clone(&h.server)).unwrap();

    let err = account
        .login(&Credentials::new("alice", "password-a").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Crypto(cipherchat::keys::CryptoError::MalformedServerKey(_))
    ));
}
