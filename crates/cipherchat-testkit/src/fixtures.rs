//! An in-memory server implementing every collaborator trait.
//!
//! `FakeServer` keeps users, rooms and direct conversations in memory, holds
//! a real X25519 server key, and seals channel keys to whatever client key a
//! request carries, so sessions under test run the full crypto path.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use cipherchat_core::{ChannelId, RoomId, Sender, UserId};
use cipherchat_keys::{
    decode_public_key, encode_public_key, open_from_base64, seal_to_base64, ChannelCipher,
    ChannelKey, X25519StaticSecret,
};
use cipherchat_sync::{
    BacklogMessage, ChannelDirectory, ChannelSnapshot, CreateChannelRequest, HistorySource,
    Identity, IdentityService, JoinableChannel, KeyExchange, LiveEvent, RemoteError,
    RemoteResult, SignupRequest,
};

struct User {
    username: String,
    password: String,
}

struct Room {
    name: String,
    key: ChannelKey,
    password: Option<String>,
    require_password: bool,
    members: BTreeSet<UserId>,
    backlog: Vec<BacklogMessage>,
}

struct Conversation {
    key: ChannelKey,
    /// Participants who currently list the conversation.
    open_for: BTreeSet<UserId>,
    backlog: Vec<BacklogMessage>,
}

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, User>,
    session: Option<UserId>,
    rooms: BTreeMap<RoomId, Room>,
    conversations: BTreeMap<(UserId, UserId), Conversation>,
    next_user: i64,
    next_room: i64,
    offline: bool,
    published_key: Option<String>,
    history_fetches: usize,
    key_fetches: usize,
}

impl State {
    fn user_by_name(&self, username: &str) -> Option<UserId> {
        self.users
            .iter()
            .find(|(_, u)| u.username == username)
            .map(|(id, _)| *id)
    }

    fn username(&self, id: UserId) -> String {
        self.users
            .get(&id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    fn conversation(&mut self, a: UserId, b: UserId) -> &mut Conversation {
        self.conversations
            .entry(pair(a, b))
            .or_insert_with(|| Conversation {
                key: ChannelKey::generate(),
                open_for: BTreeSet::new(),
                backlog: Vec::new(),
            })
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.offline {
            return Err(RemoteError::Unavailable(anyhow::anyhow!(
                "connection refused"
            )));
        }
        Ok(())
    }
}

fn pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn denied(reason: impl Into<String>) -> RemoteError {
    RemoteError::Denied(reason.into())
}

/// An in-memory chat server.
pub struct FakeServer {
    secret: X25519StaticSecret,
    state: Mutex<State>,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            secret: X25519StaticSecret::generate().expect("os rng available"),
            state: Mutex::new(State {
                next_user: 1,
                next_room: 1,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn unwrap_password(&self, wrapped: &str) -> RemoteResult<String> {
        let raw = open_from_base64(wrapped, &self.secret)
            .map_err(|e| denied(format!("cannot unwrap password: {}", e)))?;
        String::from_utf8(raw).map_err(|_| denied("password is not utf-8"))
    }

    fn seal_key(&self, key: &ChannelKey, client_key_pem: &str) -> RemoteResult<String> {
        let client = decode_public_key(client_key_pem)
            .map_err(|e| denied(format!("bad client key: {}", e)))?;
        seal_to_base64(key.as_bytes(), &client)
            .map_err(|e| RemoteError::Unavailable(anyhow::anyhow!(e)))
    }

    fn room_snapshot(
        &self,
        state: &State,
        id: RoomId,
        client_key_pem: &str,
    ) -> RemoteResult<ChannelSnapshot> {
        let room = state
            .rooms
            .get(&id)
            .ok_or_else(|| denied(format!("no room {}", id)))?;
        Ok(ChannelSnapshot {
            id: ChannelId::Group(id),
            name: room.name.clone(),
            wrapped_key: self.seal_key(&room.key, client_key_pem)?,
            backlog: room.backlog.clone(),
        })
    }

    fn direct_snapshot(
        &self,
        state: &State,
        me: UserId,
        peer: UserId,
        client_key_pem: &str,
    ) -> RemoteResult<ChannelSnapshot> {
        let conversation = state
            .conversations
            .get(&pair(me, peer))
            .ok_or_else(|| denied("no such conversation"))?;
        Ok(ChannelSnapshot {
            id: ChannelId::Direct(peer),
            name: state.username(peer),
            wrapped_key: self.seal_key(&conversation.key, client_key_pem)?,
            backlog: conversation.backlog.clone(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scenario Setup
    // ─────────────────────────────────────────────────────────────────────────

    /// The server's public key, PEM armored.
    pub fn public_key_pem(&self) -> String {
        encode_public_key(&self.secret.public_key())
    }

    /// Publish `pem` instead of the real key, e.g. a malformed one.
    pub fn publish_key(&self, pem: impl Into<String>) {
        self.state().published_key = Some(pem.into());
    }

    pub fn register_user(&self, username: &str, password: &str) -> Identity {
        let mut state = self.state();
        let id = UserId(state.next_user);
        state.next_user += 1;
        state.users.insert(
            id,
            User {
                username: username.to_string(),
                password: password.to_string(),
            },
        );
        Identity {
            id,
            username: username.to_string(),
        }
    }

    /// Make `user` the logged-in session.
    pub fn login_as(&self, user: &Identity) {
        self.state().session = Some(user.id);
    }

    pub fn session(&self) -> Option<UserId> {
        self.state().session
    }

    pub fn clear_session(&self) {
        self.state().session = None;
    }

    pub fn password_of(&self, user: UserId) -> Option<String> {
        self.state().users.get(&user).map(|u| u.password.clone())
    }

    /// Create a room with no members.
    pub fn create_room(&self, name: &str, password: Option<&str>) -> RoomId {
        let mut state = self.state();
        let id = RoomId(state.next_room);
        state.next_room += 1;
        state.rooms.insert(
            id,
            Room {
                name: name.to_string(),
                key: ChannelKey::generate(),
                password: password.map(str::to_string),
                require_password: password.is_some(),
                members: BTreeSet::new(),
                backlog: Vec::new(),
            },
        );
        id
    }

    pub fn join(&self, room: RoomId, user: &Identity) {
        if let Some(room) = self.state().rooms.get_mut(&room) {
            room.members.insert(user.id);
        }
    }

    pub fn room_count(&self) -> usize {
        self.state().rooms.len()
    }

    pub fn members(&self, room: RoomId) -> Vec<UserId> {
        self.state()
            .rooms
            .get(&room)
            .map(|r| r.members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn room_key(&self, room: RoomId) -> Option<ChannelKey> {
        self.state().rooms.get(&room).map(|r| r.key.clone())
    }

    /// Open the direct conversation between `a` and `b` for both.
    pub fn open_direct(&self, a: &Identity, b: &Identity) {
        let mut state = self.state();
        let conversation = state.conversation(a.id, b.id);
        conversation.open_for.insert(a.id);
        conversation.open_for.insert(b.id);
    }

    /// Whether `user` currently lists the conversation with `peer`.
    pub fn direct_is_open(&self, user: UserId, peer: UserId) -> bool {
        self.state()
            .conversations
            .get(&pair(user, peer))
            .is_some_and(|c| c.open_for.contains(&user))
    }

    /// Post to a room's backlog and return the live frame the server would
    /// push to members.
    pub fn post_group(&self, room: RoomId, from: &Identity, text: &str) -> String {
        let mut state = self.state();
        let Some(room_state) = state.rooms.get_mut(&room) else {
            panic!("post_group: no room {}", room);
        };
        let content = ChannelCipher::encrypt(text, &room_state.key).expect("encrypt");
        room_state.backlog.push(BacklogMessage {
            sender: Sender::new(from.id, from.username.clone()),
            ciphertext: content.clone(),
        });
        LiveEvent::outgoing(ChannelId::Group(room), &from.as_sender(), content)
            .to_frame()
            .expect("group frame")
    }

    /// Post a direct message, opening the conversation for both sides.
    pub fn post_direct(&self, from: &Identity, to: &Identity, text: &str) -> String {
        let mut state = self.state();
        let conversation = state.conversation(from.id, to.id);
        conversation.open_for.insert(from.id);
        conversation.open_for.insert(to.id);
        let content = ChannelCipher::encrypt(text, &conversation.key).expect("encrypt");
        conversation.backlog.push(BacklogMessage {
            sender: Sender::new(from.id, from.username.clone()),
            ciphertext: content.clone(),
        });
        LiveEvent::outgoing(ChannelId::Direct(to.id), &from.as_sender(), content)
            .to_frame()
            .expect("direct frame")
    }

    /// Accept a frame a client sent: record it in the backlog and return it
    /// for relaying. Returns `None` for frames the server would reject.
    pub fn accept_frame(&self, frame: &str) -> Option<String> {
        let event = LiveEvent::parse(frame).ok()?;
        let mut state = self.state();
        match &event {
            LiveEvent::Group(p) => {
                let room = state.rooms.get_mut(&p.group_id)?;
                if !room.members.contains(&p.sender_id) {
                    return None;
                }
                room.backlog.push(BacklogMessage {
                    sender: Sender::new(p.sender_id, p.sender_name.clone()),
                    ciphertext: p.content.clone(),
                });
            }
            LiveEvent::Direct(p) => {
                let name = state.username(p.sender);
                let conversation = state.conversations.get_mut(&pair(p.sender, p.recipient))?;
                conversation.open_for.insert(p.recipient);
                conversation.backlog.push(BacklogMessage {
                    sender: Sender::new(p.sender, name),
                    ciphertext: p.content.clone(),
                });
            }
            LiveEvent::Unknown => return None,
        }
        Some(frame.to_string())
    }

    /// While offline every collaborator call fails as unavailable.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn history_fetches(&self) -> usize {
        self.state().history_fetches
    }

    pub fn key_fetches(&self) -> usize {
        self.state().key_fetches
    }
}

#[async_trait]
impl IdentityService for FakeServer {
    async fn login(&self, username: &str, wrapped_password: &str) -> RemoteResult<()> {
        let password = self.unwrap_password(wrapped_password)?;
        let mut state = self.state();
        state.check_online()?;
        let id = state
            .user_by_name(username)
            .ok_or_else(|| denied("incorrect username or password"))?;
        if state.users.get(&id).map(|u| u.password.as_str()) != Some(password.as_str()) {
            return Err(denied("incorrect username or password"));
        }
        state.session = Some(id);
        Ok(())
    }

    async fn signup(&self, request: &SignupRequest) -> RemoteResult<()> {
        let password = self.unwrap_password(&request.wrapped_password)?;
        {
            let state = self.state();
            state.check_online()?;
            if state.user_by_name(&request.username).is_some() {
                return Err(denied("username already taken"));
            }
        }
        self.register_user(&request.username, &password);
        Ok(())
    }

    async fn who_am_i(&self) -> RemoteResult<Identity> {
        let state = self.state();
        state.check_online()?;
        let id = state.session.ok_or_else(|| denied("not logged in"))?;
        Ok(Identity {
            id,
            username: state.username(id),
        })
    }

    async fn change_password(
        &self,
        user: UserId,
        wrapped_old: &str,
        wrapped_new: &str,
    ) -> RemoteResult<()> {
        let old = self.unwrap_password(wrapped_old)?;
        let new = self.unwrap_password(wrapped_new)?;
        let mut state = self.state();
        state.check_online()?;
        let account = state
            .users
            .get_mut(&user)
            .ok_or_else(|| denied("no such user"))?;
        if account.password != old {
            return Err(denied("old password is incorrect"));
        }
        account.password = new;
        Ok(())
    }

    async fn logout(&self) -> RemoteResult<()> {
        let mut state = self.state();
        state.check_online()?;
        state.session = None;
        Ok(())
    }
}

#[async_trait]
impl ChannelDirectory for FakeServer {
    async fn list_joinable_channels(&self) -> RemoteResult<Vec<JoinableChannel>> {
        let state = self.state();
        state.check_online()?;
        Ok(state
            .rooms
            .iter()
            .filter(|(_, room)| state.session.map_or(true, |me| !room.members.contains(&me)))
            .map(|(id, room)| JoinableChannel {
                id: *id,
                name: room.name.clone(),
                require_password: room.require_password,
            })
            .collect())
    }

    async fn create_channel(&self, request: &CreateChannelRequest) -> RemoteResult<ChannelSnapshot> {
        let password = request
            .wrapped_password
            .as_deref()
            .map(|w| self.unwrap_password(w))
            .transpose()?;

        let mut state = self.state();
        state.check_online()?;

        let existing = state
            .rooms
            .iter()
            .find(|(_, room)| room.name == request.name)
            .map(|(id, _)| *id);

        let id = match existing {
            Some(id) => {
                let room = state
                    .rooms
                    .get_mut(&id)
                    .ok_or_else(|| denied("room vanished"))?;
                if room.require_password && room.password != password {
                    return Err(denied("incorrect room password"));
                }
                room.members.insert(request.user);
                id
            }
            None => {
                let id = RoomId(state.next_room);
                state.next_room += 1;
                state.rooms.insert(
                    id,
                    Room {
                        name: request.name.clone(),
                        key: ChannelKey::generate(),
                        password,
                        require_password: request.require_password,
                        members: BTreeSet::from([request.user]),
                        backlog: Vec::new(),
                    },
                );
                id
            }
        };

        self.room_snapshot(&state, id, &request.client_key_pem)
    }

    async fn remove_channel(&self, user: UserId, room: RoomId) -> RemoteResult<()> {
        let mut state = self.state();
        state.check_online()?;
        let room = state
            .rooms
            .get_mut(&room)
            .ok_or_else(|| denied("no such room"))?;
        if !room.members.remove(&user) {
            return Err(denied("not a member"));
        }
        Ok(())
    }

    async fn add_direct_peer(
        &self,
        user: UserId,
        username: &str,
        client_key_pem: &str,
    ) -> RemoteResult<ChannelSnapshot> {
        let mut state = self.state();
        state.check_online()?;
        let peer = state
            .user_by_name(username)
            .ok_or_else(|| denied(format!("no user named {}", username)))?;
        if peer == user {
            return Err(denied("cannot message yourself"));
        }
        state.conversation(user, peer).open_for.insert(user);
        self.direct_snapshot(&state, user, peer, client_key_pem)
    }

    async fn remove_direct_peer(&self, user: UserId, peer: UserId) -> RemoteResult<()> {
        let mut state = self.state();
        state.check_online()?;
        let conversation = state
            .conversations
            .get_mut(&pair(user, peer))
            .ok_or_else(|| denied("no such conversation"))?;
        conversation.open_for.remove(&user);
        Ok(())
    }
}

#[async_trait]
impl HistorySource for FakeServer {
    async fn fetch_channels_and_backlog(
        &self,
        user: UserId,
        client_key_pem: &str,
    ) -> RemoteResult<Vec<ChannelSnapshot>> {
        let mut state = self.state();
        state.check_online()?;
        state.history_fetches += 1;

        let mut snapshots = Vec::new();
        let rooms: Vec<RoomId> = state
            .rooms
            .iter()
            .filter(|(_, room)| room.members.contains(&user))
            .map(|(id, _)| *id)
            .collect();
        for id in rooms {
            snapshots.push(self.room_snapshot(&state, id, client_key_pem)?);
        }

        let peers: Vec<UserId> = state
            .conversations
            .iter()
            .filter(|(_, c)| c.open_for.contains(&user))
            .map(|(&(a, b), _)| if a == user { b } else { a })
            .collect();
        for peer in peers {
            snapshots.push(self.direct_snapshot(&state, user, peer, client_key_pem)?);
        }
        Ok(snapshots)
    }
}

#[async_trait]
impl KeyExchange for FakeServer {
    async fn server_public_key(&self) -> RemoteResult<String> {
        let published = {
            let mut state = self.state();
            state.check_online()?;
            state.key_fetches += 1;
            state.published_key.clone()
        };
        Ok(published.unwrap_or_else(|| self.public_key_pem()))
    }
}
