//! In-memory transport for testing
//!
//! This transport uses Tokio channels instead of network sockets, so a test
//! can play the broker through a [`MemoryPeer`] without any network. It can
//! also inject failures (refused connection, failing writes, failing close)
//! to drive the session's error paths.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use worldlink_protocol::transport::{FrameSink, FrameStream, Transport, TransportError};

/// In-memory client transport
///
/// # Example
///
/// ```
/// use worldlink_client::transport::memory::MemoryTransport;
///
/// let (transport, mut broker) = MemoryTransport::create_pair(100);
/// ```
pub struct MemoryTransport {
    /// Client halves, handed out by the first `connect`
    halves: Mutex<Option<(MemorySink, MemoryStream)>>,

    refuse: Option<String>,
}

/// Broker side of a [`MemoryTransport`]
pub struct MemoryPeer {
    to_client: Option<mpsc::Sender<String>>,
    from_client: mpsc::Receiver<String>,
}

impl MemoryTransport {
    /// Creates a transport and the broker side it is wired to
    pub fn create_pair(buffer_size: usize) -> (Self, MemoryPeer) {
        let (client_to_peer_tx, client_to_peer_rx) = mpsc::channel(buffer_size);
        let (peer_to_client_tx, peer_to_client_rx) = mpsc::channel(buffer_size);

        let sink = MemorySink {
            tx: Some(client_to_peer_tx),
            sends_left: None,
            fail_close: false,
        };
        let stream = MemoryStream {
            rx: peer_to_client_rx,
        };

        let transport = Self {
            halves: Mutex::new(Some((sink, stream))),
            refuse: None,
        };
        let peer = MemoryPeer {
            to_client: Some(peer_to_client_tx),
            from_client: client_to_peer_rx,
        };

        (transport, peer)
    }

    /// Transport whose `connect` always fails
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            halves: Mutex::new(None),
            refuse: Some(reason.into()),
        }
    }

    /// Lets `limit` writes succeed; every later write fails
    pub fn with_send_limit(self, limit: usize) -> Self {
        self.map_sink(|sink| sink.sends_left = Some(limit))
    }

    /// Makes `close` fail
    pub fn with_failing_close(self) -> Self {
        self.map_sink(|sink| sink.fail_close = true)
    }

    fn map_sink(self, f: impl FnOnce(&mut MemorySink)) -> Self {
        if let Some((sink, _)) = self
            .halves
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_mut()
        {
            f(sink);
        }
        self
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Sink = MemorySink;
    type Stream = MemoryStream;

    async fn connect(&self, url: &str) -> Result<(MemorySink, MemoryStream), TransportError> {
        if let Some(reason) = &self.refuse {
            return Err(TransportError::Connect(format!("{}: {}", url, reason)));
        }

        self.halves
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .ok_or_else(|| TransportError::Connect("memory transport already connected".into()))
    }
}

/// Write half of a [`MemoryTransport`]
pub struct MemorySink {
    tx: Option<mpsc::Sender<String>>,
    sends_left: Option<usize>,
    fail_close: bool,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if let Some(left) = self.sends_left.as_mut() {
            if *left == 0 {
                return Err(TransportError::Send("send limit reached".into()));
            }
            *left -= 1;
        }

        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(text).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.fail_close {
            return Err(TransportError::Close("close refused".into()));
        }
        self.tx = None;
        Ok(())
    }
}

/// Read half of a [`MemoryTransport`]
pub struct MemoryStream {
    rx: mpsc::Receiver<String>,
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

impl MemoryPeer {
    /// Sends a frame to the client
    pub async fn send(&self, text: impl Into<String>) -> Result<(), TransportError> {
        let tx = self.to_client.as_ref().ok_or(TransportError::Closed)?;
        tx.send(text.into()).await.map_err(|_| TransportError::Closed)
    }

    /// Next frame written by the client, or `None` once it closed
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Frame already written by the client, if any (non-blocking)
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Closes the broker to client direction, ending the client's stream
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_sends_to_peer() {
        let (transport, mut peer) = MemoryTransport::create_pair(10);
        let (mut sink, _stream) = transport.connect("memory").await.unwrap();

        sink.send_text("CONNECT\n\n\0".into()).await.unwrap();

        let received = tokio::time::timeout(tokio::time::Duration::from_secs(1), peer.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, "CONNECT\n\n\0");
    }

    #[tokio::test]
    async fn test_memory_transport_receives_from_peer() {
        let (transport, mut peer) = MemoryTransport::create_pair(10);
        let (_sink, mut stream) = transport.connect("memory").await.unwrap();

        peer.send("CONNECTED\n\n\0").await.unwrap();
        peer.hang_up();

        assert_eq!(stream.next_text().await, Some(Ok("CONNECTED\n\n\0".to_string())));
        assert_eq!(stream.next_text().await, None);
    }

    #[tokio::test]
    async fn test_connect_only_once() {
        let (transport, _peer) = MemoryTransport::create_pair(10);
        assert!(transport.connect("memory").await.is_ok());
        assert!(matches!(
            transport.connect("memory").await,
            Err(TransportError::Connect(_))
        ));
    }

    #[tokio::test]
    async fn test_refusing_transport() {
        let transport = MemoryTransport::refusing("connection refused");
        let err = transport.connect("ws://localhost:1").await.err().unwrap();
        assert_eq!(
            err,
            TransportError::Connect("ws://localhost:1: connection refused".into())
        );
    }

    #[tokio::test]
    async fn test_send_limit_and_close() {
        let (transport, mut peer) = MemoryTransport::create_pair(10);
        let (mut sink, _stream) = transport.with_send_limit(1).connect("memory").await.unwrap();

        assert!(sink.send_text("first".into()).await.is_ok());
        assert!(matches!(
            sink.send_text("second".into()).await,
            Err(TransportError::Send(_))
        ));
        assert_eq!(peer.recv().await, Some("first".to_string()));

        sink.close().await.unwrap();
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_failing_close() {
        let (transport, _peer) = MemoryTransport::create_pair(10);
        let (mut sink, _stream) = transport.with_failing_close().connect("memory").await.unwrap();

        assert!(matches!(sink.close().await, Err(TransportError::Close(_))));
    }
}
