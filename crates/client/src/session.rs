//! Session controller
//!
//! One [`Session`] owns one broker connection for its whole life:
//!
//! 1. open the transport and send CONNECT,
//! 2. wait for exactly one reply; an `ERROR` reply rejects the session,
//! 3. SUBSCRIBE to the room topic and start the inbound listener,
//! 4. pump queued items out as SEND frames until interrupted,
//! 5. send DISCONNECT, close the transport and signal termination.
//!
//! Every transition reports one status line through the [`StatusSink`].
//! Failures end the session; there is no automatic reconnect.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use worldlink_protocol::{
    classify, item_destination, item_topic, Frame, FrameBuilder, FrameClass, FrameError,
    FrameSink, FrameStream, ProtocolError, SessionState, Transport, TransportError, WorldId,
};

use crate::bridge::ItemBridge;
use crate::config::{ClientConfig, ServerConfig, SessionConfig};
use crate::listener::{ListenerExit, ListenerHandle, ListenerOptions};
use crate::notify::{status, StatusSink};

/// Network operation a timeout fired in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Handshake,
    Send,
    Disconnect,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Connect => write!(f, "connect"),
            Stage::Handshake => write!(f, "handshake"),
            Stage::Send => write!(f, "send"),
            Stage::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Server rejected the handshake: {0}")]
    Rejected(String),

    #[error("Timed out during {0}")]
    Timeout(Stage),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Item listener stopped: {0:?}")]
    ListenerStopped(ListenerExit),
}

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Interrupted and torn down; `clean` is false when DISCONNECT or
    /// closing the transport failed
    Closed { clean: bool },

    /// Ended by a failure before or while running
    Aborted(SessionError),
}

impl SessionOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, SessionOutcome::Closed { clean: true })
    }
}

/// Values a session takes from the client configuration
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub world_id: WorldId,
    pub game_room: String,
    pub settings: SessionConfig,
}

impl SessionParams {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            world_id: config.world_id,
            game_room: config.game_room.clone(),
            settings: config.session.clone(),
        }
    }
}

/// Session controller over a transport `T`
pub struct Session<T: Transport> {
    transport: T,
    server: ServerConfig,
    params: SessionParams,
    bridge: Arc<dyn ItemBridge>,
    status: StatusSink,

    /// Interruption flag, polled between pump iterations
    interrupt: CancellationToken,

    /// Cancelled after a clean disconnect
    terminate: CancellationToken,

    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    frames: FrameBuilder,
}

impl<T: Transport> Session<T> {
    pub fn new(
        transport: T,
        server: ServerConfig,
        params: SessionParams,
        bridge: Arc<dyn ItemBridge>,
        status: StatusSink,
        interrupt: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let frames = FrameBuilder::new(server.host());

        Self {
            transport,
            server,
            params,
            bridge,
            status,
            interrupt,
            terminate: CancellationToken::new(),
            state: SessionState::Idle,
            state_tx,
            frames,
        }
    }

    /// Uses `token` as the termination signal
    pub fn with_terminate(mut self, token: CancellationToken) -> Self {
        self.terminate = token;
        self
    }

    /// Token cancelled once the session disconnected cleanly
    pub fn terminate_token(&self) -> CancellationToken {
        self.terminate.clone()
    }

    /// Follows state changes
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session to completion
    pub async fn run(mut self) -> SessionOutcome {
        tracing::info!(
            url = %self.server.ws_url(),
            room = %self.params.game_room,
            world_id = self.params.world_id,
            "Starting item session"
        );

        let (mut sink, mut listener) = match self.establish().await {
            Ok(parts) => parts,
            Err(e) => return self.abort(e),
        };

        match self.pump(&mut sink, &mut listener).await {
            Ok(()) => self.teardown(sink, listener).await,
            Err(e) => {
                drop(listener);
                let limit = self.params.settings.send_timeout();
                let _ = tokio::time::timeout(limit, sink.close()).await;
                self.abort(e)
            }
        }
    }

    /// Connect, handshake and subscribe
    async fn establish(&mut self) -> Result<(T::Sink, ListenerHandle), SessionError> {
        let settings = self.params.settings.clone();

        self.transition(SessionState::Connecting);
        let url = self.server.ws_url();
        let (mut sink, mut stream) =
            within(settings.connect_timeout(), Stage::Connect, self.transport.connect(&url)).await??;

        self.transition(SessionState::AwaitingHandshake);
        self.status.log(&status::attempting(&self.params.game_room));

        let connect = self.frames.connect(self.server.connect_login())?;
        within(settings.send_timeout(), Stage::Send, sink.send_text(connect)).await??;

        let reply = match within(settings.handshake_timeout(), Stage::Handshake, stream.next_text()).await? {
            Some(reply) => reply?,
            None => return Err(TransportError::Closed.into()),
        };

        if classify(&reply) == FrameClass::Error {
            let reason = Frame::parse(&reply)
                .ok()
                .and_then(|frame| frame.header("message").map(str::to_owned))
                .unwrap_or_else(|| "ERROR".to_string());
            let _ = within(settings.send_timeout(), Stage::Disconnect, sink.close()).await;
            return Err(SessionError::Rejected(reason));
        }
        tracing::debug!(reply_len = reply.len(), "Handshake accepted");

        let subscribe = self.frames.subscribe(&item_topic(&self.params.game_room))?;
        within(settings.send_timeout(), Stage::Send, sink.send_text(subscribe)).await??;

        let listener = ListenerHandle::spawn(
            stream,
            Arc::clone(&self.bridge),
            ListenerOptions {
                local_world: self.params.world_id,
                max_inflight: settings.max_inflight_messages,
                receive_timeout: settings.receive_timeout(),
                shutdown: settings.listener_shutdown,
            },
        );

        self.transition(SessionState::Running);
        self.status.log(status::CONNECTED);
        Ok((sink, listener))
    }

    /// Sends queued items until the interruption flag is observed
    async fn pump(&self, sink: &mut T::Sink, listener: &mut ListenerHandle) -> Result<(), SessionError> {
        let destination = item_destination(&self.params.game_room);
        let poll_interval = self.params.settings.poll_interval();

        loop {
            if self.interrupt.is_cancelled() {
                break;
            }

            self.drain_outbound(sink, &destination).await?;

            if self.interrupt.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = self.interrupt.cancelled() => {}
                _ = tokio::time::sleep(poll_interval) => {}
                exit = listener.finished() => {
                    return Err(SessionError::ListenerStopped(exit));
                }
            }
        }

        tracing::info!("Interruption requested, disconnecting");
        Ok(())
    }

    /// Sends one SEND frame per queued item, in queue order.
    ///
    /// An item leaves the queue only after its frame was written; a failed
    /// write leaves it queued for a later session.
    async fn drain_outbound(&self, sink: &mut T::Sink, destination: &str) -> Result<usize, SessionError> {
        let send_timeout = self.params.settings.send_timeout();
        let mut sent = 0;

        for item in self.bridge.items_to_send() {
            let frame = self.frames.send(destination, &item.to_json()?)?;
            within(send_timeout, Stage::Send, sink.send_text(frame)).await??;
            self.bridge.remove_item_to_send(&item);
            sent += 1;

            tracing::debug!(
                item_id = item.item_id,
                target = item.target_player_world_id,
                "Sent item"
            );
        }

        Ok(sent)
    }

    async fn teardown(mut self, mut sink: T::Sink, listener: ListenerHandle) -> SessionOutcome {
        self.transition(SessionState::Disconnecting);

        let exit = listener.shutdown().await;
        tracing::debug!(exit = ?exit, "Listener stopped");

        let result = self.disconnect(&mut sink).await;
        self.transition(SessionState::Closed);

        match result {
            Ok(()) => {
                self.status.log(status::DISCONNECTED);
                self.terminate.cancel();
                SessionOutcome::Closed { clean: true }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Disconnect failed");
                self.status.log(&status::disconnect_failed(&e));
                SessionOutcome::Closed { clean: false }
            }
        }
    }

    async fn disconnect(&self, sink: &mut T::Sink) -> Result<(), SessionError> {
        let limit = self.params.settings.send_timeout();
        let frame = self
            .frames
            .disconnect(self.params.settings.disconnect_receipt.as_deref());

        within(limit, Stage::Disconnect, sink.send_text(frame)).await??;
        within(limit, Stage::Disconnect, sink.close()).await??;
        Ok(())
    }

    fn abort(mut self, error: SessionError) -> SessionOutcome {
        self.transition(SessionState::Aborted);

        let line = match &error {
            SessionError::Rejected(_) => status::REJECTED.to_string(),
            SessionError::Timeout(stage) => status::timed_out(stage),
            _ => status::CONNECTION_PROBLEM.to_string(),
        };
        tracing::error!(error = %error, "Session aborted");
        self.status.log(&line);

        SessionOutcome::Aborted(error)
    }

    fn transition(&mut self, next: SessionState) {
        match self.state.transition_to(next) {
            Ok(()) => {
                tracing::debug!(state = %next, "Session state changed");
                self.state_tx.send_replace(next);
            }
            Err(e) => tracing::error!(error = %e, "Rejected session state change"),
        }
    }
}

async fn within<F: Future>(limit: Duration, stage: Stage, fut: F) -> Result<F::Output, SessionError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| SessionError::Timeout(stage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ItemQueue;
    use crate::notify::StatusQueue;
    use crate::transport::memory::{MemoryPeer, MemorySink, MemoryStream, MemoryTransport};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use worldlink_protocol::{Command, ItemDto};

    const CONNECTED: &str = "CONNECTED\nversion:1.2\n\n\0";

    struct Harness {
        queue: Arc<ItemQueue>,
        status: StatusQueue,
        interrupt: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            let _ = tracing_subscriber::fmt().with_test_writer().try_init();
            Self {
                queue: Arc::new(ItemQueue::new()),
                status: StatusQueue::new(),
                interrupt: CancellationToken::new(),
            }
        }

        fn params(&self) -> SessionParams {
            SessionParams {
                world_id: 1,
                game_room: "room1".into(),
                settings: SessionConfig {
                    poll_interval_ms: 5,
                    handshake_timeout_ms: 200,
                    ..SessionConfig::default()
                },
            }
        }

        fn session<T: Transport>(&self, transport: T) -> Session<T> {
            Session::new(
                transport,
                ServerConfig::new("10.0.0.5", 8080, 1, "admin", "adminPass").unwrap(),
                self.params(),
                self.queue.clone(),
                StatusSink::for_queue(&self.status),
                self.interrupt.clone(),
            )
        }
    }

    async fn next_frame(peer: &mut MemoryPeer) -> Frame {
        let text = timeout(Duration::from_secs(1), peer.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("client closed the connection");
        Frame::parse(&text).unwrap()
    }

    async fn outcome(handle: JoinHandle<SessionOutcome>) -> SessionOutcome {
        timeout(Duration::from_secs(2), handle)
            .await
            .expect("session did not finish")
            .unwrap()
    }

    async fn handshake(peer: &mut MemoryPeer) {
        assert_eq!(next_frame(peer).await.command, Command::Connect);
        peer.send(CONNECTED).await.unwrap();
        assert_eq!(next_frame(peer).await.command, Command::Subscribe);
    }

    #[tokio::test]
    async fn test_connect_subscribe_and_disconnect() {
        let (transport, mut peer) = MemoryTransport::create_pair(16);
        let h = Harness::new();
        let session = h.session(transport);
        let terminate = session.terminate_token();
        let state = session.state_watch();
        let handle = tokio::spawn(session.run());

        let connect = next_frame(&mut peer).await;
        assert_eq!(connect.command, Command::Connect);
        assert_eq!(connect.header("login"), Some("10.0.0.5"));

        peer.send(CONNECTED).await.unwrap();

        let subscribe = next_frame(&mut peer).await;
        assert_eq!(subscribe.command, Command::Subscribe);
        assert_eq!(subscribe.header("destination"), Some("/topic/item/room1"));

        h.interrupt.cancel();
        let result = outcome(handle).await;

        assert!(result.is_clean());
        assert_eq!(next_frame(&mut peer).await.command, Command::Disconnect);
        assert_eq!(peer.recv().await, None);
        assert!(terminate.is_cancelled());
        assert_eq!(*state.borrow(), SessionState::Closed);
        assert_eq!(
            h.status.drain(),
            vec![
                status::attempting("room1"),
                status::CONNECTED.to_string(),
                status::DISCONNECTED.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_error_reply_rejects_session() {
        let (transport, mut peer) = MemoryTransport::create_pair(16);
        let h = Harness::new();
        h.queue.queue_item_to_send(ItemDto::new(1, 2, 3));
        let session = h.session(transport);
        let terminate = session.terminate_token();
        let handle = tokio::spawn(session.run());

        assert_eq!(next_frame(&mut peer).await.command, Command::Connect);
        peer.send("ERROR\nmessage:bad\n\n\0").await.unwrap();

        let result = outcome(handle).await;

        assert!(matches!(result, SessionOutcome::Aborted(SessionError::Rejected(ref m)) if m == "bad"));
        // no SUBSCRIBE, SEND or DISCONNECT
        assert_eq!(peer.recv().await, None);
        assert!(!terminate.is_cancelled());
        assert_eq!(h.queue.pending_to_send(), 1);
        assert_eq!(
            h.status.drain(),
            vec![status::attempting("room1"), status::REJECTED.to_string()]
        );
    }

    #[tokio::test]
    async fn test_connect_failure_aborts() {
        let h = Harness::new();
        let session = h.session(MemoryTransport::refusing("connection refused"));
        let state = session.state_watch();

        let result = session.run().await;

        assert!(matches!(
            result,
            SessionOutcome::Aborted(SessionError::Transport(TransportError::Connect(_)))
        ));
        assert_eq!(*state.borrow(), SessionState::Aborted);
        assert_eq!(h.status.drain(), vec![status::CONNECTION_PROBLEM.to_string()]);
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (transport, _peer) = MemoryTransport::create_pair(16);
        let h = Harness::new();

        let result = h.session(transport).run().await;

        assert!(matches!(
            result,
            SessionOutcome::Aborted(SessionError::Timeout(Stage::Handshake))
        ));
        assert_eq!(
            h.status.drain(),
            vec![status::attempting("room1"), status::timed_out(Stage::Handshake)]
        );
    }

    #[tokio::test]
    async fn test_failed_send_keeps_item_queued() {
        // CONNECT and SUBSCRIBE go through, the first SEND fails
        let (transport, mut peer) = MemoryTransport::create_pair(16);
        let transport = transport.with_send_limit(2);
        let h = Harness::new();
        let item = ItemDto::new(1, 2, 77);
        h.queue.queue_item_to_send(item.clone());
        let session = h.session(transport);
        let terminate = session.terminate_token();
        let handle = tokio::spawn(session.run());

        handshake(&mut peer).await;
        let result = outcome(handle).await;

        assert!(matches!(
            result,
            SessionOutcome::Aborted(SessionError::Transport(TransportError::Send(_)))
        ));
        assert_eq!(h.queue.items_to_send(), vec![item]);
        assert!(!terminate.is_cancelled());
        assert_eq!(
            h.status.drain().last().map(String::as_str),
            Some(status::CONNECTION_PROBLEM)
        );
    }

    #[tokio::test]
    async fn test_items_after_interrupt_are_not_sent() {
        let (transport, mut peer) = MemoryTransport::create_pair(16);
        let h = Harness::new();
        let handle = tokio::spawn(h.session(transport).run());

        handshake(&mut peer).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        h.interrupt.cancel();
        h.queue.queue_item_to_send(ItemDto::new(1, 2, 5));

        assert!(outcome(handle).await.is_clean());
        assert_eq!(next_frame(&mut peer).await.command, Command::Disconnect);
        assert_eq!(h.queue.pending_to_send(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_failure_still_closes() {
        let (transport, mut peer) = MemoryTransport::create_pair(16);
        let h = Harness::new();
        let session = h.session(transport.with_failing_close());
        let terminate = session.terminate_token();
        let state = session.state_watch();
        let handle = tokio::spawn(session.run());

        handshake(&mut peer).await;
        h.interrupt.cancel();
        let result = outcome(handle).await;

        assert!(matches!(result, SessionOutcome::Closed { clean: false }));
        assert!(!terminate.is_cancelled());
        assert_eq!(*state.borrow(), SessionState::Closed);
        let last = h.status.drain().pop().unwrap();
        assert!(last.starts_with("Error disconnecting from server:\n"), "{}", last);
    }

    #[tokio::test]
    async fn test_server_hang_up_aborts_running_session() {
        let (transport, mut peer) = MemoryTransport::create_pair(16);
        let h = Harness::new();
        let handle = tokio::spawn(h.session(transport).run());

        handshake(&mut peer).await;
        peer.hang_up();
        let result = outcome(handle).await;

        assert!(matches!(
            result,
            SessionOutcome::Aborted(SessionError::ListenerStopped(ListenerExit::Closed))
        ));
        // no DISCONNECT after the server went away
        assert_eq!(peer.recv().await, None);
        assert_eq!(
            h.status.drain().last().map(String::as_str),
            Some(status::CONNECTION_PROBLEM)
        );
    }

    #[tokio::test]
    async fn test_inbound_items_filter_own_world() {
        let (transport, mut peer) = MemoryTransport::create_pair(16);
        let h = Harness::new();
        let handle = tokio::spawn(h.session(transport).run());

        handshake(&mut peer).await;
        peer.send("MESSAGE\ndestination:/topic/item/room1\n\n{\"sourcePlayerWorldId\":1,\"targetPlayerWorldId\":2,\"itemId\":1}\0")
            .await
            .unwrap();
        peer.send("MESSAGE\ndestination:/topic/item/room1\n\n{\"sourcePlayerWorldId\":2,\"targetPlayerWorldId\":1,\"itemId\":8}\0")
            .await
            .unwrap();

        let mut received = Vec::new();
        timeout(Duration::from_secs(1), async {
            while received.is_empty() {
                received.extend(h.queue.drain_received());
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        h.interrupt.cancel();
        assert!(outcome(handle).await.is_clean());

        received.extend(h.queue.drain_received());
        assert_eq!(received, vec![ItemDto::new(2, 1, 8)]);
    }

    type EventLog = Arc<Mutex<Vec<String>>>;

    struct LoggedBridge {
        inner: ItemQueue,
        log: EventLog,
    }

    impl ItemBridge for LoggedBridge {
        fn items_to_send(&self) -> Vec<ItemDto> {
            self.inner.items_to_send()
        }

        fn remove_item_to_send(&self, item: &ItemDto) {
            self.log.lock().unwrap().push(format!("remove {}", item.item_id));
            self.inner.remove_item_to_send(item);
        }

        fn push_item_to_process(&self, item: ItemDto) {
            self.inner.push_item_to_process(item);
        }
    }

    struct LoggedTransport {
        inner: MemoryTransport,
        log: EventLog,
    }

    struct LoggedSink {
        inner: MemorySink,
        log: EventLog,
    }

    #[async_trait]
    impl Transport for LoggedTransport {
        type Sink = LoggedSink;
        type Stream = MemoryStream;

        async fn connect(&self, url: &str) -> Result<(LoggedSink, MemoryStream), TransportError> {
            let (sink, stream) = self.inner.connect(url).await?;
            let sink = LoggedSink {
                inner: sink,
                log: self.log.clone(),
            };
            Ok((sink, stream))
        }
    }

    #[async_trait]
    impl FrameSink for LoggedSink {
        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            let frame = Frame::parse(&text).unwrap();
            let label = match frame.command {
                Command::Send => format!("send {}", ItemDto::from_json(&frame.body).unwrap().item_id),
                other => other.to_string(),
            };
            self.inner.send_text(text).await?;
            self.log.lock().unwrap().push(label);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn test_items_sent_in_order_and_removed_after_send() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let bridge = Arc::new(LoggedBridge {
            inner: ItemQueue::new(),
            log: log.clone(),
        });
        for id in [1, 2, 3] {
            bridge.inner.queue_item_to_send(ItemDto::new(1, 2, id));
        }

        let (memory, mut peer) = MemoryTransport::create_pair(16);
        let transport = LoggedTransport {
            inner: memory,
            log: log.clone(),
        };
        let h = Harness::new();
        let session = Session::new(
            transport,
            ServerConfig::new("10.0.0.5", 8080, 1, "admin", "adminPass").unwrap(),
            h.params(),
            bridge.clone(),
            StatusSink::for_queue(&h.status),
            h.interrupt.clone(),
        );
        let handle = tokio::spawn(session.run());

        handshake(&mut peer).await;
        for id in [1, 2, 3] {
            let frame = next_frame(&mut peer).await;
            assert_eq!(frame.command, Command::Send);
            assert_eq!(frame.header("destination"), Some("/app/item/room1"));
            assert_eq!(ItemDto::from_json(&frame.body).unwrap().item_id, id);
        }

        h.interrupt.cancel();
        assert!(outcome(handle).await.is_clean());
        assert_eq!(bridge.inner.pending_to_send(), 0);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "CONNECT", "SUBSCRIBE", "send 1", "remove 1", "send 2", "remove 2", "send 3",
                "remove 3", "DISCONNECT",
            ]
        );
    }
}
