//! WebSocket transport.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use cipherchat_core::UserId;

use crate::error::{Result, SyncError};
use crate::transport::LiveTransport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live transport over a WebSocket carrying JSON text frames.
pub struct WebSocketTransport {
    url: String,
    stream: Option<WsStream>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: None,
        }
    }

    /// Transport for `user`'s message stream on the server at `server_url`
    /// (`http://` or `https://`).
    pub fn for_user(server_url: &str, user: UserId) -> Result<Self> {
        let base = server_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            return Err(SyncError::Transport(format!(
                "server url must start with http:// or https://: {}",
                server_url
            )));
        };
        Ok(Self::new(format!("{}/messages/{}", ws_base, user)))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn stream(&mut self) -> Result<&mut WsStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| SyncError::Transport("websocket not open".into()))
    }
}

#[async_trait]
impl LiveTransport for WebSocketTransport {
    async fn open(&mut self) -> Result<()> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SyncError::Transport(format!("connect {}: {}", self.url, e)))?;
        debug!(url = %self.url, "websocket open");
        self.stream = Some(stream);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        loop {
            let next = self.stream()?.next().await;
            match next {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) | None => {
                    self.stream = None;
                    return Ok(None);
                }
                // Control frames are answered by tungstenite; binary is not
                // part of the protocol.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(SyncError::Transport(e.to_string()));
                }
            }
        }
    }

    async fn send(&mut self, frame: String) -> Result<()> {
        let result = self.stream()?.send(Message::Text(frame)).await;
        result.map_err(|e| {
            self.stream = None;
            SyncError::Transport(e.to_string())
        })
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
