//! Feed transport
//!
//! `Connector`/`Transport` are the seams the session task drives; the
//! production implementation is a tokio-tungstenite WebSocket with:
//! - TCP_NODELAY on plain sockets
//! - Control frames (ping/pong) absorbed below the feed layer
//! - Binary frames that are not UTF-8 dropped with a warning

use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::future::Future;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};

/// Transport-level connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Connected and ready
    Connected,
    /// Closed by either side
    Disconnected,
}

/// Errors that can occur with WebSocket connections
#[derive(Debug, thiserror::Error)]
pub enum WebSocketError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("Not connected")]
    NotConnected,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// One open duplex connection carrying text frames
pub trait Transport: Send + 'static {
    /// Send one text frame
    fn send_text(&mut self, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Next inbound frame; `Ok(None)` once the peer has closed
    fn recv(&mut self) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Close the connection; idempotent
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens transports to a feed URL
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// Perform the transport handshake
    fn connect(&self, url: &str) -> impl Future<Output = Result<Self::Transport>> + Send;
}

/// WebSocket connection to the price feed
pub struct WebSocketConnection {
    /// Underlying WebSocket stream
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    /// Connection state
    state: LinkState,
    /// Connection URL
    url: String,
}

impl fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("url", &self.url)
            .field("state", &self.state)
            .finish()
    }
}

impl WebSocketConnection {
    /// Connect to WebSocket endpoint
    ///
    /// No timeout of its own; the session task bounds the handshake.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| WebSocketError::ConnectionFailed(e.to_string()))?;

        if let MaybeTlsStream::Plain(tcp) = ws_stream.get_ref() {
            Self::optimize_tcp_stream(tcp)?;
        }

        Ok(Self {
            stream: ws_stream,
            state: LinkState::Connected,
            url: url.to_string(),
        })
    }

    /// Disable Nagle's algorithm - probes and frames go out immediately
    fn optimize_tcp_stream(stream: &TcpStream) -> Result<()> {
        stream
            .set_nodelay(true)
            .map_err(|e| WebSocketError::ConnectionFailed(e.to_string()))
    }
}

/// Text carried by a binary frame; None when it is not valid UTF-8
fn binary_text(data: &[u8]) -> Option<String> {
    String::from_utf8(data.to_vec()).ok()
}

impl Transport for WebSocketConnection {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        if self.state != LinkState::Connected {
            return Err(WebSocketError::NotConnected);
        }

        self.stream
            .send(Message::text(text.to_owned()))
            .await
            .map_err(|e| WebSocketError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        if self.state != LinkState::Connected {
            return Err(WebSocketError::NotConnected);
        }

        loop {
            match self.stream.next().await {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => return Ok(Some(text.as_str().to_owned())),
                    Message::Binary(data) => match binary_text(&data) {
                        Some(text) => return Ok(Some(text)),
                        None => {
                            tracing::warn!(url = %self.url, bytes = data.len(), "dropping binary frame that is not UTF-8");
                            continue;
                        }
                    },
                    Message::Close(_) => {
                        self.state = LinkState::Disconnected;
                        return Ok(None);
                    }
                    // tungstenite queues the pong reply itself
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                },
                Some(Err(e)) => {
                    self.state = LinkState::Disconnected;
                    return Err(WebSocketError::ReceiveFailed(e.to_string()));
                }
                None => {
                    self.state = LinkState::Disconnected;
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.state == LinkState::Connected {
            let _ = self.stream.close(None).await;
            self.state = LinkState::Disconnected;
        }
        Ok(())
    }
}

/// Production connector over tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Transport = WebSocketConnection;

    async fn connect(&self, url: &str) -> Result<WebSocketConnection> {
        WebSocketConnection::connect(url).await
    }
}
