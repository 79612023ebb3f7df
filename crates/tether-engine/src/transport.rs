use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Io(String),
    #[error("channel closed")]
    Closed,
}

/// Outbound half of a connected realtime transport.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, text: String) -> Result<(), TransportError>;
}

/// Inbound half. `None` means the peer closed the channel.
#[async_trait]
pub trait FrameStream: Send {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;
}

pub struct TransportPair {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

/// Dials a realtime channel. The channel manager only depends on this seam;
/// production uses WebSockets, tests use an in-memory pair.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<TransportPair, TransportError>;
}

/// Production connector over tokio-tungstenite.
#[derive(Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<TransportPair, TransportError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (sink, stream) = socket.split();
        Ok(TransportPair {
            sink: Box::new(WsSink { inner: sink }),
            stream: Box::new(WsStream { inner: stream }),
        })
    }
}

type WsSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsSink {
    inner: SplitSink<WsSocket, WsMessage>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

struct WsStream {
    inner: SplitStream<WsSocket>,
}

#[async_trait]
impl FrameStream for WsStream {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        while let Some(item) = self.inner.next().await {
            match item {
                Ok(WsMessage::Text(text)) => return Some(Ok(text.to_string())),
                Ok(WsMessage::Close(_)) => return None,
                // Pings are answered by the library; binary frames are not
                // part of this protocol.
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        assert!(TransportError::Connect("refused".into())
            .to_string()
            .contains("refused"));
        assert_eq!(TransportError::Closed.to_string(), "channel closed");
    }
}
