//! Inbound listener
//!
//! Reads frames from the transport and hands each one to its own handler
//! task, so slow handling never stalls the receive loop. Handlers run in a
//! [`JoinSet`] bounded by a semaphore; when the session stops the listener,
//! in-flight handlers are drained or aborted according to
//! [`ListenerShutdown`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use worldlink_protocol::{
    classify, Frame, FrameClass, FrameError, FrameStream, ItemDto, ProtocolError,
    TransportError, WorldId,
};

use crate::bridge::ItemBridge;
use crate::config::ListenerShutdown;

/// What a handler did with one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Item pushed to the game side
    Delivered,

    /// Item came from this world and was dropped
    SelfEcho,

    /// Not a MESSAGE frame
    Ignored,
}

/// Failure handling a single inbound frame
#[derive(Debug, Error)]
pub enum InboundError {
    #[error("Malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Undecodable item: {0}")]
    Item(#[from] ProtocolError),
}

/// Why the listener stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    /// Stopped by the session
    Stopped,

    /// The server closed the connection
    Closed,

    /// Receive failed
    Failed(TransportError),

    /// Nothing arrived within the receive timeout
    Idle(Duration),
}

/// Listener settings
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub local_world: WorldId,
    pub max_inflight: usize,
    pub receive_timeout: Option<Duration>,
    pub shutdown: ListenerShutdown,
}

/// Decodes one inbound frame and routes the item it carries.
///
/// Only MESSAGE frames are decoded. Items whose source world is
/// `local_world` are dropped; everything else goes to the bridge.
pub fn dispatch_frame(
    text: &str,
    local_world: WorldId,
    bridge: &dyn ItemBridge,
) -> Result<Dispatch, InboundError> {
    match classify(text) {
        FrameClass::Message => {}
        FrameClass::Error => {
            let frame = Frame::parse(text).ok();
            tracing::warn!(
                reason = frame.as_ref().and_then(|f| f.header("message")).unwrap_or(""),
                "Server sent ERROR frame"
            );
            return Ok(Dispatch::Ignored);
        }
        FrameClass::Unrecognized => {
            tracing::trace!(len = text.len(), "Ignoring unrecognized frame");
            return Ok(Dispatch::Ignored);
        }
    }

    let frame = Frame::parse(text)?;
    let item = ItemDto::from_json(frame.body.trim_end())?;
    if item.source_player_world_id == local_world {
        tracing::trace!(item_id = item.item_id, "Dropping item from own world");
        return Ok(Dispatch::SelfEcho);
    }

    tracing::debug!(
        source = item.source_player_world_id,
        item_id = item.item_id,
        destination = frame.header("destination").unwrap_or(""),
        "Received item"
    );
    bridge.push_item_to_process(item);
    Ok(Dispatch::Delivered)
}

/// Handle to a running listener
pub struct ListenerHandle {
    task: JoinHandle<ListenerExit>,
    stop: CancellationToken,
}

impl ListenerHandle {
    /// Starts the listener on the current runtime
    pub fn spawn<S: FrameStream>(
        stream: S,
        bridge: Arc<dyn ItemBridge>,
        options: ListenerOptions,
    ) -> Self {
        let stop = CancellationToken::new();
        let task = tokio::spawn(listen(stream, bridge, options, stop.clone()));
        Self { task, stop }
    }

    /// Waits for the listener to stop on its own
    ///
    /// Cancel safe; may be polled repeatedly from `select!`.
    pub async fn finished(&mut self) -> ListenerExit {
        join_exit(&mut self.task).await
    }

    /// Stops the listener and waits for it to wind down
    pub async fn shutdown(mut self) -> ListenerExit {
        self.stop.cancel();
        join_exit(&mut self.task).await
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn join_exit(task: &mut JoinHandle<ListenerExit>) -> ListenerExit {
    match task.await {
        Ok(exit) => exit,
        Err(e) => {
            tracing::error!(error = %e, "Listener task failed");
            ListenerExit::Failed(TransportError::Receive(e.to_string()))
        }
    }
}

async fn listen<S: FrameStream>(
    mut stream: S,
    bridge: Arc<dyn ItemBridge>,
    options: ListenerOptions,
    stop: CancellationToken,
) -> ListenerExit {
    let permits = Arc::new(Semaphore::new(options.max_inflight.max(1)));
    let mut handlers: JoinSet<Result<Dispatch, InboundError>> = JoinSet::new();

    // Reset only when a frame arrives; finished handlers do not extend it.
    let mut idle_deadline = options.receive_timeout.map(|limit| Instant::now() + limit);

    let exit = loop {
        tokio::select! {
            _ = stop.cancelled() => break ListenerExit::Stopped,

            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                log_handler_result(joined);
            }

            _ = sleep_until_deadline(idle_deadline), if idle_deadline.is_some() => {
                let idle = options.receive_timeout.unwrap_or_default();
                tracing::warn!(idle_ms = idle.as_millis() as u64, "No frames within receive timeout");
                break ListenerExit::Idle(idle);
            }

            next = stream.next_text() => {
                idle_deadline = options.receive_timeout.map(|limit| Instant::now() + limit);

                match next {
                    Some(Ok(text)) => {
                        let permit = tokio::select! {
                            _ = stop.cancelled() => break ListenerExit::Stopped,
                            permit = Arc::clone(&permits).acquire_owned() => permit,
                        };
                        let Ok(permit) = permit else {
                            break ListenerExit::Stopped;
                        };

                        let bridge = Arc::clone(&bridge);
                        let local_world = options.local_world;
                        handlers.spawn(async move {
                            let _permit = permit;
                            dispatch_frame(&text, local_world, bridge.as_ref())
                        });
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Receive failed");
                        break ListenerExit::Failed(e);
                    }
                    None => {
                        tracing::info!("Server closed the item connection");
                        break ListenerExit::Closed;
                    }
                }
            }
        }
    };

    match options.shutdown {
        ListenerShutdown::Drain => {
            while let Some(joined) = handlers.join_next().await {
                log_handler_result(joined);
            }
        }
        ListenerShutdown::Abort => {
            let pending = handlers.len();
            handlers.shutdown().await;
            if pending > 0 {
                tracing::debug!(pending, "Aborted in-flight message handlers");
            }
        }
    }

    exit
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn log_handler_result(joined: Result<Result<Dispatch, InboundError>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Dropping inbound frame"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::error!(error = %e, "Message handler panicked"),
    }
}
