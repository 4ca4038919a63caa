//! # worldlink protocol
//!
//! Wire level building blocks for the worldlink item exchange.
//!
//! This crate provides:
//! - `FrameBuilder` / `Frame`: the STOMP text frames exchanged with the broker
//! - `classify`: prefix routing of raw inbound text (ERROR vs MESSAGE)
//! - `ItemDto`: the item record carried as JSON in SEND and MESSAGE bodies
//! - `SessionState`: the session state machine
//! - `Transport`: the connection abstraction the client runs on
//!
//! ## Example
//!
//! ```
//! use worldlink_protocol::{classify, item_destination, Frame, FrameBuilder, FrameClass, ItemDto};
//!
//! let builder = FrameBuilder::new("127.0.0.1");
//! let item = ItemDto::new(1, 2, 42);
//!
//! let text = builder
//!     .send(&item_destination("room1"), &item.to_json().unwrap())
//!     .unwrap();
//! assert_eq!(classify(&text), FrameClass::Unrecognized);
//!
//! let frame = Frame::parse(&text).unwrap();
//! assert_eq!(ItemDto::from_json(&frame.body).unwrap(), item);
//! ```

pub mod error;
pub mod frame;
pub mod item;
pub mod state;
pub mod transport;

pub use error::{FrameError, ProtocolError, Result};
pub use frame::{
    classify, item_destination, item_topic, validate_destination, Command, Frame, FrameBuilder,
    FrameClass,
};
pub use item::{ItemDto, WorldId};
pub use state::SessionState;
pub use transport::{FrameSink, FrameStream, Transport, TransportError};
