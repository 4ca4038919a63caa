use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use worldlink_protocol::transport::{FrameSink, FrameStream, Transport, TransportError};

type Connection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport; STOMP frames travel as text messages
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

/// Write half of a websocket connection
pub struct WebSocketSink {
    inner: SplitSink<Connection, Message>,
}

/// Read half of a websocket connection
pub struct WebSocketReader {
    inner: SplitStream<Connection>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Sink = WebSocketSink;
    type Stream = WebSocketReader;

    async fn connect(&self, url: &str) -> Result<(WebSocketSink, WebSocketReader), TransportError> {
        tracing::info!(url = %url, "Connecting to WebSocket server");

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::info!(url = %url, "WebSocket connection established");

        let (sink, stream) = ws_stream.split();
        Ok((WebSocketSink { inner: sink }, WebSocketReader { inner: stream }))
    }
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .close()
            .await
            .map_err(|e| TransportError::Close(e.to_string()))
    }
}

#[async_trait]
impl FrameStream for WebSocketReader {
    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping non UTF-8 binary message");
                    }
                },
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("Server closed connection");
                    return None;
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite itself
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "WebSocket error");
                    return Some(Err(TransportError::Receive(e.to_string())));
                }
                None => {
                    tracing::info!("Connection closed");
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn start_echo_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let ws_stream = accept_async(stream).await.unwrap();
                    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

                    while let Some(Ok(msg)) = ws_receiver.next().await {
                        if msg.is_text() || msg.is_binary() {
                            let _ = ws_sender.send(msg).await;
                        }
                    }
                });
            }
        });

        (addr, handle)
    }

    #[tokio::test]
    async fn test_send_and_receive_text() {
        let (addr, server_handle) = start_echo_server().await;

        let transport = WebSocketTransport::new();
        let (mut sink, mut stream) = transport.connect(&format!("ws://{}", addr)).await.unwrap();

        for i in 1..=3 {
            sink.send_text(format!("SEND\n\nframe {}\0", i)).await.unwrap();
        }

        for i in 1..=3 {
            let received = tokio::time::timeout(
                tokio::time::Duration::from_secs(1),
                stream.next_text(),
            )
            .await
            .unwrap()
            .unwrap()
            .unwrap();

            assert_eq!(received, format!("SEND\n\nframe {}\0", i));
        }

        sink.close().await.unwrap();
        server_handle.abort();
    }

    #[tokio::test]
    async fn test_binary_text_is_accepted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let mut ws_stream = accept_async(stream).await.unwrap();
                ws_stream
                    .send(Message::Binary(vec![0xff, 0xfe]))
                    .await
                    .unwrap();
                ws_stream
                    .send(Message::Binary(b"MESSAGE\n\n{}\0".to_vec()))
                    .await
                    .unwrap();
                tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
            }
        });

        let (_sink, mut stream) = WebSocketTransport::new()
            .connect(&format!("ws://{}", addr))
            .await
            .unwrap();

        // The invalid UTF-8 message is skipped
        let received = stream.next_text().await.unwrap().unwrap();
        assert_eq!(received, "MESSAGE\n\n{}\0");
    }

    #[tokio::test]
    async fn test_stream_ends_when_server_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let mut ws_stream = accept_async(stream).await.unwrap();
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                let _ = ws_stream.close(None).await;
            }
        });

        let (_sink, mut stream) = WebSocketTransport::new()
            .connect(&format!("ws://{}", addr))
            .await
            .unwrap();

        let result = tokio::time::timeout(
            tokio::time::Duration::from_secs(2),
            stream.next_text(),
        )
        .await
        .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_fails_to_connect_invalid_address() {
        let result = tokio::time::timeout(
            tokio::time::Duration::from_secs(2),
            WebSocketTransport::new().connect("ws://127.0.0.1:1"),
        )
        .await
        .unwrap();

        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
