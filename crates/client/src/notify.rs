//! Status notifications
//!
//! Every session transition produces one human readable status line. A
//! [`StatusSink`] delivers it to the UI when a UI notifier is attached and
//! still listening, and to the log otherwise. The choice is made on every
//! call, so a UI that goes away mid-session does not lose lines.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;

/// Log target used for status lines
pub const STATUS_TARGET: &str = "worldlink::status";

/// Status lines reported by the session
pub mod status {
    pub const CONNECTED: &str = "Successfully connected to the Server";
    pub const REJECTED: &str = "Failed to Subscribe to the Item Queue. Bad Server URL?";
    pub const CONNECTION_PROBLEM: &str =
        "Problem with Server connection, please check the status with the Server host.";
    pub const DISCONNECTED: &str = "Successfully disconnected from the Server";

    pub fn attempting(room: &str) -> String {
        format!("Attempting to Connect to {}.........", room)
    }

    pub fn timed_out(stage: impl std::fmt::Display) -> String {
        format!("Timed out waiting for the Server during {}.", stage)
    }

    pub fn disconnect_failed(error: impl std::fmt::Display) -> String {
        format!("Error disconnecting from server:\n{}", error)
    }

    pub fn invalid_config(error: impl std::fmt::Display) -> String {
        format!("Invalid client configuration:\n{}", error)
    }

    pub fn game_start_failed(error: impl std::fmt::Display) -> String {
        format!("Failed to start the game connection:\n{}", error)
    }
}

/// Something that can display a status line
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("Status receiver is gone")]
    Detached,
}

/// Writes status lines to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) -> Result<(), NotifyError> {
        tracing::info!(target: STATUS_TARGET, "{}", message);
        Ok(())
    }
}

/// Queue of status lines for a UI thread to poll
///
/// The UI drains it from its own frame loop without blocking; the session
/// side pushes through [`StatusQueue::notifier`].
pub struct StatusQueue {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    tx: mpsc::UnboundedSender<String>,
}

impl StatusQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rx: Arc::new(Mutex::new(rx)),
            tx,
        }
    }

    /// Notifier feeding this queue
    ///
    /// It fails with [`NotifyError::Detached`] once every `StatusQueue`
    /// handle has been dropped.
    pub fn notifier(&self) -> QueueNotifier {
        QueueNotifier {
            tx: self.tx.downgrade(),
        }
    }

    /// Try to receive a line (non-blocking)
    pub fn try_recv(&self) -> Option<String> {
        self.rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv()
            .ok()
    }

    /// Drain all pending lines
    pub fn drain(&self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.try_recv() {
            lines.push(line);
        }
        lines
    }
}

impl Default for StatusQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StatusQueue {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
            tx: self.tx.clone(),
        }
    }
}

/// UI-bound notifier handed out by [`StatusQueue::notifier`]
#[derive(Clone)]
pub struct QueueNotifier {
    tx: mpsc::WeakUnboundedSender<String>,
}

impl Notifier for QueueNotifier {
    fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let tx = self.tx.upgrade().ok_or(NotifyError::Detached)?;
        tx.send(message.to_string()).map_err(|_| NotifyError::Detached)
    }
}

/// Routes status lines to the UI notifier or, failing that, the log
#[derive(Clone)]
pub struct StatusSink {
    ui: Option<Arc<dyn Notifier>>,
    fallback: Arc<dyn Notifier>,
}

impl Default for StatusSink {
    fn default() -> Self {
        Self {
            ui: None,
            fallback: Arc::new(LogNotifier),
        }
    }
}

impl StatusSink {
    /// Sink that only logs
    pub fn log_only() -> Self {
        Self::default()
    }

    pub fn with_ui(ui: Arc<dyn Notifier>) -> Self {
        Self {
            ui: Some(ui),
            ..Self::default()
        }
    }

    /// Replaces the log fallback used when no UI is listening
    pub fn with_fallback(mut self, fallback: Arc<dyn Notifier>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sink feeding a [`StatusQueue`]
    pub fn for_queue(queue: &StatusQueue) -> Self {
        Self::with_ui(Arc::new(queue.notifier()))
    }

    pub fn log(&self, message: &str) {
        if let Some(ui) = &self.ui {
            match ui.notify(message) {
                Ok(()) => return,
                Err(e) => tracing::debug!(error = %e, "UI notifier unavailable, logging status"),
            }
        }
        if let Err(e) = self.fallback.notify(message) {
            tracing::warn!(error = %e, status = message, "Status line dropped");
        }
    }
}

impl std::fmt::Debug for StatusSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusSink")
            .field("ui", &self.ui.is_some())
            .finish()
    }
}
