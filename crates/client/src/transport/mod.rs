//! Transports the session can run on

pub mod memory;
pub mod websocket;

pub use worldlink_protocol::transport::{FrameSink, FrameStream, Transport, TransportError};

/// Default transport type (WebSocket)
pub type DefaultTransport = websocket::WebSocketTransport;
