use crate::core::errors::SodexError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{instrument, warn};

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Connection/handshake timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
        }
    }
}

/// Raw WebSocket transport: connect, send, receive, close.
///
/// Codec-free by design; the session layer owns message interpretation so
/// tests can script this seam directly.
#[async_trait]
pub trait WsTransport: Send {
    /// Open a connection to the given URL, completing the handshake within
    /// the configured timeout.
    async fn connect(&mut self, url: &str) -> Result<(), SodexError>;

    /// Send a raw frame.
    async fn send(&mut self, msg: Message) -> Result<(), SodexError>;

    /// Receive the next raw frame. `None` means the peer closed the stream.
    async fn next(&mut self) -> Option<Result<Message, SodexError>>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), SodexError>;

    /// Whether the connection is currently alive.
    fn is_connected(&self) -> bool;
}

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;
type WsStream = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

/// Tungstenite-based WebSocket transport.
pub struct TungsteniteWs {
    write: Option<WsSink>,
    read: Option<WsStream>,
    connected: bool,
    label: String,
    config: WsConfig,
}

impl TungsteniteWs {
    /// Create a transport; `label` tags log lines ("sodex-spot" etc.).
    #[must_use]
    pub fn new(label: String) -> Self {
        Self {
            write: None,
            read: None,
            connected: false,
            label,
            config: WsConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl WsTransport for TungsteniteWs {
    #[instrument(skip(self, url), fields(client = %self.label))]
    async fn connect(&mut self, url: &str) -> Result<(), SodexError> {
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);

        let (ws_stream, _) = tokio::time::timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| SodexError::WebSocket("connection handshake timed out".to_string()))?
            .map_err(|e| SodexError::WebSocket(format!("connection failed: {e}")))?;

        let (write, read) = ws_stream.split();
        self.write = Some(write);
        self.read = Some(read);
        self.connected = true;
        Ok(())
    }

    #[instrument(skip(self, msg), fields(client = %self.label))]
    async fn send(&mut self, msg: Message) -> Result<(), SodexError> {
        if !self.connected {
            return Err(SodexError::WebSocket("not connected".to_string()));
        }
        let write = self
            .write
            .as_mut()
            .ok_or_else(|| SodexError::WebSocket("write stream not available".to_string()))?;

        write.send(msg).await.map_err(|e| {
            self.connected = false;
            SodexError::WebSocket(format!("failed to send frame: {e}"))
        })
    }

    async fn next(&mut self) -> Option<Result<Message, SodexError>> {
        loop {
            if !self.connected {
                return None;
            }
            let read = self.read.as_mut()?;

            match read.next().await {
                Some(Ok(Message::Close(frame))) => {
                    self.connected = false;
                    return Some(Ok(Message::Close(frame)));
                }
                Some(Ok(Message::Ping(data))) => {
                    // Answer pings at the transport level.
                    if let Err(e) = self.send(Message::Pong(data)).await {
                        warn!(client = %self.label, "failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(message)) => return Some(Ok(message)),
                Some(Err(e)) => {
                    self.connected = false;
                    return Some(Err(SodexError::WebSocket(format!("stream error: {e}"))));
                }
                None => {
                    self.connected = false;
                    return None;
                }
            }
        }
    }

    #[instrument(skip(self), fields(client = %self.label))]
    async fn close(&mut self) -> Result<(), SodexError> {
        if let Some(write) = self.write.as_mut() {
            let _ = write.send(Message::Close(None)).await;
        }
        self.connected = false;
        self.write = None;
        self.read = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
