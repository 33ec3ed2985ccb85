//! WebSocket transport layer.
//!
//! Single responsibility: open a socket, move text frames in and out, close it.
//! No knowledge of opcodes, sessions or retry policy.

use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::error::GatewayError;

/// Type alias for the WebSocket send half
pub type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;

/// Type alias for the WebSocket receive half
pub type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// A bidirectional text-frame transport.
///
/// `send` and `receive` may be called concurrently from different tasks.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the socket. Fails with [`GatewayError::Connection`].
    async fn open(&self, url: &str) -> Result<(), GatewayError>;

    /// Write one text frame. Fails with [`GatewayError::Transport`] when the
    /// socket is closed or the write fails.
    async fn send(&self, text: String) -> Result<(), GatewayError>;

    /// Wait for the next text frame. Fails with [`GatewayError::Transport`]
    /// on remote close or read failure.
    async fn receive(&self) -> Result<String, GatewayError>;

    /// Close the socket. Calling it on a closed transport is a no-op.
    async fn close(&self);

    /// Close and reopen the socket.
    async fn reconnect(&self, url: &str) -> Result<(), GatewayError> {
        self.close().await;
        self.open(url).await
    }
}

/// [`Transport`] over `tokio-tungstenite`.
///
/// The socket is split so a writer and a reader can work concurrently; each
/// half sits behind its own lock.
#[derive(Default)]
pub struct WsTransport {
    sink: Mutex<Option<WsSink>>,
    stream: Mutex<Option<WsStream>>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

async fn connect(url: &str) -> Result<(WsSink, WsStream), GatewayError> {
    debug!(url = %url, "Connecting to WebSocket");
    let (ws, _response) = connect_async(url)
        .await
        .map_err(|e| GatewayError::Connection(format!("WebSocket connect failed: {}", e)))?;
    debug!(url = %url, "WebSocket connected");
    Ok(ws.split())
}

async fn close_sink(sink: &mut Option<WsSink>) {
    if let Some(mut sink) = sink.take() {
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Error while closing WebSocket");
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<(), GatewayError> {
        let (sink, stream) = connect(url).await?;
        let mut sink_slot = self.sink.lock().await;
        *self.stream.lock().await = Some(stream);
        *sink_slot = Some(sink);
        Ok(())
    }

    async fn send(&self, text: String) -> Result<(), GatewayError> {
        let mut sink = self.sink.lock().await;
        let sink = sink
            .as_mut()
            .ok_or_else(|| GatewayError::Transport("socket is closed".into()))?;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| GatewayError::Transport(format!("Failed to send: {}", e)))
    }

    async fn receive(&self) -> Result<String, GatewayError> {
        let mut stream = self.stream.lock().await;
        let stream = stream
            .as_mut()
            .ok_or_else(|| GatewayError::Transport("socket is closed".into()))?;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Close(frame))) => {
                    return Err(GatewayError::Transport(format!(
                        "closed by peer: {:?}",
                        frame
                    )))
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(len = data.len(), "Skipping binary frame");
                }
                // Pong is handled automatically by tungstenite
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(GatewayError::Transport(format!("WebSocket error: {}", e)))
                }
                None => return Err(GatewayError::Transport("stream ended".into())),
            }
        }
    }

    async fn close(&self) {
        close_sink(&mut *self.sink.lock().await).await;
        self.stream.lock().await.take();
    }

    /// Holds the write half for the whole cycle so concurrent sends wait for
    /// the new socket instead of failing on the old one.
    async fn reconnect(&self, url: &str) -> Result<(), GatewayError> {
        let mut sink = self.sink.lock().await;
        close_sink(&mut sink).await;
        self.stream.lock().await.take();

        let (new_sink, new_stream) = connect(url).await?;
        *self.stream.lock().await = Some(new_stream);
        *sink = Some(new_sink);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_on_unopened_transport_fails() {
        let transport = WsTransport::new();
        let err = transport.send("{}".into()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = WsTransport::new();
        transport.close().await;
        transport.close().await;
        assert!(matches!(
            transport.receive().await,
            Err(GatewayError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn open_reports_connection_error() {
        let transport = WsTransport::new();
        // Port 9 (discard) is not expected to speak WebSocket
        let err = transport.open("ws://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, GatewayError::Connection(_)));
    }
}
