//! Background client thread for GUI shells
//!
//! A GUI owns its main thread, so the session runs on a separate thread with
//! its own current-thread Tokio runtime. The GUI polls [`ClientThread::status`]
//! from its frame loop and calls [`ClientThread::request_interruption`] when
//! the user disconnects.

use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use worldlink_protocol::Transport;

use crate::bootstrap::{start_connections, BootstrapError, Connections, GameIntegration, Signals};
use crate::config::{ClientConfig, ServerConfig, SetUpDto};
use crate::notify::{StatusQueue, StatusSink};

/// Name of the thread hosting the client runtime
pub const CLIENT_THREAD_NAME: &str = "worldlink-client";

#[derive(Debug, Error)]
pub enum ClientThreadError {
    #[error("Failed to start client runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error("Client thread panicked")]
    Panicked,
}

/// Session running on a background thread
pub struct ClientThread {
    signals: Signals,
    status: StatusQueue,
    handle: thread::JoinHandle<Result<Connections, ClientThreadError>>,
}

impl ClientThread {
    /// Starts [`start_connections`] on a new thread
    pub fn spawn<T, G>(
        transport: T,
        config: ClientConfig,
        server: ServerConfig,
        setup: SetUpDto,
        game: Arc<G>,
    ) -> Result<Self, ClientThreadError>
    where
        T: Transport,
        G: GameIntegration,
    {
        let signals = Signals::default();
        let status = StatusQueue::new();

        let sink = StatusSink::for_queue(&status);
        let thread_signals = signals.clone();
        let handle = thread::Builder::new()
            .name(CLIENT_THREAD_NAME.into())
            .spawn(move || -> Result<Connections, ClientThreadError> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(ClientThreadError::Runtime)?;

                let connections = runtime.block_on(start_connections(
                    transport,
                    &config,
                    server,
                    &setup,
                    game,
                    sink,
                    thread_signals,
                ))?;
                Ok(connections)
            })
            .map_err(ClientThreadError::Runtime)?;

        Ok(Self {
            signals,
            status,
            handle,
        })
    }

    /// Asks the session to disconnect cleanly
    pub fn request_interruption(&self) {
        tracing::info!("Interruption requested by client shell");
        self.signals.interrupt.cancel();
    }

    /// Status lines for the UI
    pub fn status(&self) -> &StatusQueue {
        &self.status
    }

    /// Cancelled once the session disconnected cleanly
    pub fn terminated(&self) -> CancellationToken {
        self.signals.terminate.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the session to end
    pub fn join(self) -> Result<Connections, ClientThreadError> {
        self.handle.join().map_err(|_| ClientThreadError::Panicked)?
    }
}
