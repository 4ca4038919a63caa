//! Transport layer abstraction
//!
//! A [`Transport`] opens a connection and hands back its two halves: a
//! [`FrameSink`] owned by the session controller for writes and a
//! [`FrameStream`] owned by the inbound listener for reads. Splitting the
//! halves lets both run concurrently without sharing the connection.
//!
//! # Example: Implementing a custom transport
//!
//! ```no_run
//! use async_trait::async_trait;
//! use worldlink_protocol::transport::{FrameSink, FrameStream, Transport, TransportError};
//!
//! struct Loopback;
//! struct LoopSink;
//! struct LoopStream;
//!
//! #[async_trait]
//! impl FrameSink for LoopSink {
//!     async fn send_text(&mut self, _text: String) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//!
//!     async fn close(&mut self) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl FrameStream for LoopStream {
//!     async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
//!         None
//!     }
//! }
//!
//! #[async_trait]
//! impl Transport for Loopback {
//!     type Sink = LoopSink;
//!     type Stream = LoopStream;
//!
//!     async fn connect(&self, _url: &str) -> Result<(LoopSink, LoopStream), TransportError> {
//!         Ok((LoopSink, LoopStream))
//!     }
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

/// Write half of a connection
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Writes one text frame; returns once the transport accepted it
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Closes the connection
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection
#[async_trait]
pub trait FrameStream: Send + 'static {
    /// Next inbound text frame, or `None` once the peer closed the connection
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;
}

/// Opens connections to a broker
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Sink: FrameSink;
    type Stream: FrameStream;

    async fn connect(&self, url: &str) -> Result<(Self::Sink, Self::Stream), TransportError>;
}

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Failed to send: {0}")]
    Send(String),

    #[error("Failed to receive: {0}")]
    Receive(String),

    #[error("Failed to close: {0}")]
    Close(String),

    #[error("Connection closed")]
    Closed,
}
