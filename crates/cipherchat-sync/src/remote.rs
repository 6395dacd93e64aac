//! Collaborator interfaces: the server-side services a session talks to.
//!
//! Each trait is an opaque RPC surface. Implementations may speak HTTP,
//! gRPC or anything else; failures are reported as [`RemoteError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cipherchat_core::{ChannelId, RoomId, Sender, UserId};

/// A failed collaborator call.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The server refused the request.
    #[error("request denied: {0}")]
    Denied(String),

    /// The server could not be reached or answered nonsense.
    #[error("service unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

/// Result type for collaborator calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// The authenticated user, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
}

impl Identity {
    pub fn as_sender(&self) -> Sender {
        Sender::new(self.id, self.username.clone())
    }
}

/// A message in a channel backlog, still encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogMessage {
    pub sender: Sender,
    pub ciphertext: String,
}

/// One channel as returned by the server, with its key wrapped for this
/// client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    pub name: String,
    /// Channel key sealed to the client public key, base64.
    pub wrapped_key: String,
    /// Oldest first.
    pub backlog: Vec<BacklogMessage>,
}

/// A room the user may join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinableChannel {
    pub id: RoomId,
    pub name: String,
    pub require_password: bool,
}

/// Fields of a new account. The password is already wrapped for the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupRequest {
    pub full_name: String,
    pub surname: String,
    pub email: String,
    pub username: String,
    pub wrapped_password: String,
}

/// Create a room, or join an existing one with the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateChannelRequest {
    pub user: UserId,
    pub name: String,
    /// Room password wrapped for the server.
    pub wrapped_password: Option<String>,
    pub require_password: bool,
    /// Where the server should wrap the channel key to.
    pub client_key_pem: String,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn login(&self, username: &str, wrapped_password: &str) -> RemoteResult<()>;

    async fn signup(&self, request: &SignupRequest) -> RemoteResult<()>;

    async fn who_am_i(&self) -> RemoteResult<Identity>;

    async fn change_password(
        &self,
        user: UserId,
        wrapped_old: &str,
        wrapped_new: &str,
    ) -> RemoteResult<()>;

    async fn logout(&self) -> RemoteResult<()>;
}

#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn list_joinable_channels(&self) -> RemoteResult<Vec<JoinableChannel>>;

    /// Returns the room with its key wrapped for the requester and, when an
    /// existing room was joined, its backlog.
    async fn create_channel(&self, request: &CreateChannelRequest)
        -> RemoteResult<ChannelSnapshot>;

    async fn remove_channel(&self, user: UserId, room: RoomId) -> RemoteResult<()>;

    /// Open a direct conversation with `username`.
    async fn add_direct_peer(
        &self,
        user: UserId,
        username: &str,
        client_key_pem: &str,
    ) -> RemoteResult<ChannelSnapshot>;

    async fn remove_direct_peer(&self, user: UserId, peer: UserId) -> RemoteResult<()>;
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Every channel the user belongs to, with backlog.
    async fn fetch_channels_and_backlog(
        &self,
        user: UserId,
        client_key_pem: &str,
    ) -> RemoteResult<Vec<ChannelSnapshot>>;
}

#[async_trait]
pub trait KeyExchange: Send + Sync {
    /// The server's current public key, PEM armored.
    async fn server_public_key(&self) -> RemoteResult<String>;
}

/// Everything a session needs from the server.
pub trait Backend: IdentityService + ChannelDirectory + HistorySource + KeyExchange {}

impl<B> Backend for B where B: IdentityService + ChannelDirectory + HistorySource + KeyExchange {}
