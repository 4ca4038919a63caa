//! # worldlink
//!
//! Multiworld item synchronisation over STOMP 1.2 on a websocket.
//!
//! ## Components
//!
//! - `worldlink-protocol`: STOMP frame codec, item payload, session states
//!   and the transport traits
//! - `worldlink-client`: session controller, inbound listener, item queue
//!   bridge, status notifications and the websocket/in-memory transports
//!
//! This crate adds the `worldlink` binary, its logging setup and a
//! line-based game integration.

pub mod logging;
pub mod stdio_game;

pub use worldlink_client as client;
pub use worldlink_protocol as protocol;
