//! Transport seam for the indicator.
//!
//! A [`Connector`] opens a receive-only [`PushChannel`] to an [`Endpoint`].
//! Production code uses [`WebSocketConnector`]; tests plug in scripted
//! implementations.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};

use crate::error::ChannelError;

use super::Endpoint;

/// One data frame delivered by a push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Receive side of an open channel. No client-to-server messages exist.
#[async_trait]
pub trait PushChannel: Send {
    /// Next data frame. `None` means the peer closed the channel.
    async fn next_frame(&mut self) -> Option<Result<Frame, ChannelError>>;

    /// Close the channel. Called at most once per channel by the driver.
    async fn close(&mut self) -> Result<(), ChannelError>;
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Channel: PushChannel + 'static;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Channel, ChannelError>;
}

/// Opens WebSocket channels with `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

pub struct WebSocketChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Channel = WebSocketChannel;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Channel, ChannelError> {
        let (stream, response) =
            connect_async(endpoint.as_str())
                .await
                .map_err(|e| ChannelError::Connect {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;

        tracing::debug!(
            endpoint = %endpoint,
            secure = endpoint.is_secure(),
            status = %response.status(),
            "WebSocket handshake completed"
        );

        Ok(WebSocketChannel { stream })
    }
}

#[async_trait]
impl PushChannel for WebSocketChannel {
    async fn next_frame(&mut self) -> Option<Result<Frame, ChannelError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(Message::Binary(bytes)) => return Some(Ok(Frame::Binary(bytes.to_vec()))),
                // Pings are answered by tungstenite on the next read
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(frame)) => {
                    tracing::debug!(close_frame = ?frame, "Server closed the channel");
                    return None;
                }
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(e) => return Some(Err(ChannelError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            // Already closed by the peer or by an earlier failure
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(ChannelError::Transport(e.to_string())),
        }
    }
}
