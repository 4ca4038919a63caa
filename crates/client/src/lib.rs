//! # worldlink client
//!
//! Client side of the worldlink item exchange. A game integration queues
//! items for other worlds; the [`Session`] sends them to the room's STOMP
//! destination and pushes items addressed from other worlds back into the
//! integration's inbound queue.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use worldlink_client::{
//!     transport::DefaultTransport, ItemQueue, ServerConfig, Session, SessionParams, StatusSink,
//!     ClientConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClientConfig::new(1, "room1");
//!     let server = ServerConfig::new("127.0.0.1", 8080, 1, "admin", "adminPass").unwrap();
//!     let queue = Arc::new(ItemQueue::new());
//!     let interrupt = CancellationToken::new();
//!
//!     let session = Session::new(
//!         DefaultTransport::new(),
//!         server,
//!         SessionParams::from_config(&config),
//!         queue,
//!         StatusSink::log_only(),
//!         interrupt.clone(),
//!     );
//!     let outcome = session.run().await;
//!     println!("{:?}", outcome);
//! }
//! ```

pub mod bootstrap;
pub mod bridge;
pub mod config;
pub mod listener;
pub mod notify;
pub mod runtime;
pub mod session;
pub mod transport;

pub use bootstrap::{
    start_connections, BootstrapError, Connections, GameContext, GameIntegration, Signals,
};
pub use bridge::{ItemBridge, ItemQueue};
pub use config::{ClientConfig, ConfigError, ListenerShutdown, ServerConfig, SessionConfig, SetUpDto};
pub use listener::{dispatch_frame, Dispatch, InboundError, ListenerExit, ListenerHandle, ListenerOptions};
pub use notify::{status, LogNotifier, Notifier, NotifyError, StatusQueue, StatusSink};
pub use runtime::{ClientThread, ClientThreadError};
pub use session::{Session, SessionError, SessionOutcome, SessionParams, Stage};
