//! The session connection: one duplex connection per room view.
//!
//! [`SessionConnection`] is a handle to a background owner task. The task runs
//! the [`Connector`], then multiplexes outbound commands, inbound frames and the
//! shutdown signal with `tokio::select!`. Inbound frames are decoded into
//! [`ServerCommand`]s and delivered in order on the event channel returned from
//! [`SessionConnection::open`].
//!
//! ```text
//!   Idle ──open()──▶ Connecting ──connect ok──▶ Open
//!                        │                        │
//!                        └──── error / close ─────┴──▶ Closed (terminal)
//! ```
//!
//! There is no reconnect loop. Any transport failure moves the connection to
//! `Closed` and it stays there.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut connection = SessionConnection::new("weekly-contest", &SessionConfig::default());
//! let verdict = gate.evaluate("weekly-contest").await;
//! if let Some(mut events) = connection.open(&verdict, connector) {
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SessionEvent::Connected => connection.send(ClientCommand::BeginRound),
//!             SessionEvent::Command(command) => { /* reduce into the store */ }
//!             SessionEvent::Disconnected { .. } => break,
//!         }
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::RoomError;
use crate::event::SessionEvent;
use crate::gate::GateVerdict;
use crate::protocol::{ClientCommand, ServerCommand};
use crate::session::SessionConfig;
use crate::transport::{Connector, Transport};

// ── State machine ───────────────────────────────────────────────────

/// Lifecycle of a [`SessionConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Constructed; no connection has been attempted.
    Idle,
    /// The connector is running.
    Connecting,
    /// The transport is connected; commands may be sent.
    Open,
    /// Terminal. Reached on teardown, far-end close or any transport error.
    Closed,
}

impl ConnectionState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{Closed, Connecting, Idle, Open};
        matches!(
            (self, next),
            (Idle, Connecting) | (Idle | Connecting | Open, Closed) | (Connecting, Open)
        )
    }

    /// Returns `true` only for [`ConnectionState::Open`].
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    /// Returns `true` only for [`ConnectionState::Closed`].
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

/// Apply a transition if it is legal. Returns whether the state changed.
fn transition(state: &watch::Sender<ConnectionState>, next: ConnectionState) -> bool {
    state.send_if_modified(|current| {
        if current.can_transition_to(next) {
            *current = next;
            true
        } else {
            false
        }
    })
}

// ── Command sender ──────────────────────────────────────────────────

/// Cloneable, non-blocking outbound path of a [`SessionConnection`].
///
/// Sending is fire-and-forget. While the connection is not `Open` the call is a
/// silent no-op, and a full command channel drops the command with a warning.
#[derive(Debug, Clone)]
pub struct CommandSender {
    id: Uuid,
    cmd_tx: mpsc::Sender<ClientCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl CommandSender {
    /// Queue `command` for the owner task. Returns `true` if it was queued.
    pub fn send(&self, command: ClientCommand) -> bool {
        if !self.state.borrow().is_open() {
            debug!(connection = %self.id, tag = command.tag(), "connection not open; command discarded");
            return false;
        }
        match self.cmd_tx.try_send(command) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(connection = %self.id, tag = dropped.tag(), "command channel full, dropping command");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection = %self.id, "command channel closed");
                false
            }
        }
    }
}

// ── Connection handle ───────────────────────────────────────────────

/// Handle to the single connection of one room view.
pub struct SessionConnection {
    id: Uuid,
    room: String,
    state: Arc<watch::Sender<ConnectionState>>,
    sender: CommandSender,
    /// Taken by the owner task on `open`.
    cmd_rx: Option<mpsc::Receiver<ClientCommand>>,
    /// Set before teardown so the owner task stops emitting events.
    detached: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    event_channel_capacity: usize,
    shutdown_timeout: Duration,
    connect_timeout: Duration,
}

impl SessionConnection {
    /// Create an `Idle` connection for `room`.
    pub fn new(room: impl Into<String>, config: &SessionConfig) -> Self {
        let id = Uuid::new_v4();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_channel_capacity.max(1));
        Self {
            id,
            room: room.into(),
            state: Arc::new(state_tx),
            sender: CommandSender {
                id,
                cmd_tx,
                state: state_rx,
            },
            cmd_rx: Some(cmd_rx),
            detached: watch::channel(false).0,
            task: None,
            shutdown_tx: None,
            event_channel_capacity: config.event_channel_capacity.max(1),
            shutdown_timeout: config.shutdown_timeout,
            connect_timeout: config.connect_timeout,
        }
    }

    /// Start connecting if `verdict` is [`GateVerdict::Allowed`] and no
    /// connection has been started yet.
    ///
    /// Returns the event receiver on the first successful call and `None` on
    /// every other call. The receiver yields [`SessionEvent::Connected`], then
    /// inbound commands in transport order, then one final
    /// [`SessionEvent::Disconnected`] unless the connection was closed locally.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn open<C: Connector>(
        &mut self,
        verdict: &GateVerdict,
        connector: C,
    ) -> Option<mpsc::Receiver<SessionEvent>> {
        if !verdict.is_allowed() {
            debug!(connection = %self.id, room = %self.room, ?verdict, "gate has not allowed this room; not connecting");
            return None;
        }
        if *self.state.borrow() != ConnectionState::Idle {
            debug!(connection = %self.id, room = %self.room, "connection already started; open ignored");
            return None;
        }
        let cmd_rx = self.cmd_rx.take()?;
        transition(&self.state, ConnectionState::Connecting);

        let (event_tx, event_rx) = mpsc::channel(self.event_channel_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let context = LoopContext {
            id: self.id,
            room: self.room.clone(),
            state: Arc::clone(&self.state),
            events: event_tx,
            detached: self.detached.subscribe(),
            connect_timeout: self.connect_timeout,
        };
        info!(connection = %self.id, room = %self.room, "opening session connection");
        self.task = Some(tokio::spawn(session_loop(
            connector,
            context,
            cmd_rx,
            shutdown_rx,
        )));
        self.shutdown_tx = Some(shutdown_tx);

        Some(event_rx)
    }

    /// Send `command` if the connection is `Open`. See [`CommandSender::send`].
    pub fn send(&self, command: ClientCommand) -> bool {
        self.sender.send(command)
    }

    /// A cloneable sender for tasks that outlive a borrow of this handle.
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe lifecycle changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Returns `true` while the connection is `Open`.
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Identifier attached to this connection's log records.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Room this connection belongs to.
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Tear the connection down.
    ///
    /// The event channel is detached first, so no event is delivered once this
    /// is called. The owner task is then given the shutdown timeout to close the
    /// transport and is aborted if it does not finish. Safe to call repeatedly.
    pub async fn close(&mut self) {
        debug!(connection = %self.id, room = %self.room, "close requested");
        self.detached.send_replace(true);

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!(connection = %self.id, "owner task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!(connection = %self.id, "owner task did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!(connection = %self.id, "owner task aborted: {join_err}");
                    }
                }
            }
        }

        self.cmd_rx = None;
        transition(&self.state, ConnectionState::Closed);
    }
}

impl std::fmt::Debug for SessionConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConnection")
            .field("id", &self.id)
            .field("room", &self.room)
            .field("state", &self.state())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for SessionConnection {
    fn drop(&mut self) {
        // No executor to drive a graceful close here; abort instead.
        self.detached.send_replace(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        transition(&self.state, ConnectionState::Closed);
    }
}

// ── Owner task ──────────────────────────────────────────────────────

struct LoopContext {
    id: Uuid,
    room: String,
    state: Arc<watch::Sender<ConnectionState>>,
    events: mpsc::Sender<SessionEvent>,
    detached: watch::Receiver<bool>,
    connect_timeout: Duration,
}

impl LoopContext {
    /// Deliver an event in order. Waits for capacity rather than dropping,
    /// unless the listeners are detached while waiting.
    async fn emit(&self, event: SessionEvent) {
        let mut detached = self.detached.clone();
        tokio::select! {
            biased;
            _ = detached.wait_for(|detached| *detached) => {
                debug!(connection = %self.id, "listeners detached; event discarded");
            }
            sent = self.events.send(event) => {
                if sent.is_err() {
                    debug!(connection = %self.id, "event channel closed, receiver dropped");
                }
            }
        }
    }

    /// Move to `Closed` and emit the final `Disconnected` event.
    async fn disconnected(&self, reason: Option<String>) {
        transition(&self.state, ConnectionState::Closed);
        info!(connection = %self.id, room = %self.room, reason = reason.as_deref().unwrap_or("closed by server"), "session connection closed");
        self.emit(SessionEvent::Disconnected { reason }).await;
    }
}

/// Connect, then pump commands and frames until shutdown or a transport error.
async fn session_loop<C: Connector>(
    connector: C,
    context: LoopContext,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(connection = %context.id, room = %context.room, "owner task started");

    let connect = tokio::time::timeout(context.connect_timeout, connector.connect(&context.room));
    let mut transport = tokio::select! {
        biased;
        _ = &mut shutdown_rx => {
            debug!(connection = %context.id, "shutdown before connect completed");
            transition(&context.state, ConnectionState::Closed);
            return;
        }
        result = connect => match result {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                error!(connection = %context.id, room = %context.room, "connect failed: {e}");
                context.disconnected(Some(format!("connect failed: {e}"))).await;
                return;
            }
            Err(_) => {
                let e = RoomError::Timeout;
                error!(connection = %context.id, room = %context.room, "connect failed: {e}");
                context.disconnected(Some(format!("connect failed: {e}"))).await;
                return;
            }
        }
    };

    if !transition(&context.state, ConnectionState::Open) {
        // Closed by the handle while the connector was finishing.
        let _ = transport.close().await;
        return;
    }
    info!(connection = %context.id, room = %context.room, "session connection open");
    context.emit(SessionEvent::Connected).await;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                debug!(connection = %context.id, "shutdown signal received");
                if let Err(e) = transport.close().await {
                    debug!(connection = %context.id, "transport close failed: {e}");
                }
                transition(&context.state, ConnectionState::Closed);
                break;
            }

            cmd = cmd_rx.recv() => match cmd {
                Some(command) => {
                    debug!(connection = %context.id, tag = command.tag(), "sending client command");
                    match command.to_frame() {
                        Ok(frame) => {
                            if let Err(e) = transport.send(frame).await {
                                error!(connection = %context.id, "transport send error: {e}");
                                context.disconnected(Some(format!("transport send error: {e}"))).await;
                                break;
                            }
                        }
                        Err(e) => {
                            error!(connection = %context.id, "failed to encode client command: {e}");
                        }
                    }
                }
                // Every sender is gone.
                None => {
                    debug!(connection = %context.id, "command channel closed, shutting down owner task");
                    let _ = transport.close().await;
                    context.disconnected(Some("connection handle dropped".into())).await;
                    break;
                }
            },

            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => match ServerCommand::from_frame(&text) {
                    Ok(command) => {
                        debug!(connection = %context.id, tag = command.tag(), "received server command");
                        context.emit(SessionEvent::Command(command)).await;
                    }
                    Err(e) => {
                        warn!(connection = %context.id, "dropping inbound frame: {e}");
                    }
                },
                Some(Err(e)) => {
                    error!(connection = %context.id, "transport receive error: {e}");
                    context.disconnected(Some(format!("transport receive error: {e}"))).await;
                    break;
                }
                None => {
                    debug!(connection = %context.id, "transport closed by server");
                    context.disconnected(None).await;
                    break;
                }
            },
        }
    }

    debug!(connection = %context.id, "owner task exited");
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::gate::DenialReason;
    use crate::protocol::ChatEntry;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    type Script = Vec<Option<Result<String, RoomError>>>;

    /// Records sent frames and replays scripted inbound frames.
    struct MockTransport {
        incoming: VecDeque<Option<Result<String, RoomError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, frame: String) -> Result<(), RoomError> {
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, RoomError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<(), RoomError> {
            self.closed.store(true, Ordering::Release);
            Ok(())
        }
    }

    /// Hands out one scripted transport and counts connect calls.
    struct MockConnector {
        script: StdMutex<Option<Script>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        connects: Arc<AtomicUsize>,
        fail: bool,
    }

    impl MockConnector {
        fn new(script: Script) -> Self {
            Self {
                script: StdMutex::new(Some(script)),
                sent: Arc::new(StdMutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
                connects: Arc::new(AtomicUsize::new(0)),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(&self, _room: &str) -> Result<MockTransport, RoomError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RoomError::TransportReceive("connection refused".into()));
            }
            let script = self.script.lock().unwrap().take().unwrap_or_default();
            Ok(MockTransport {
                incoming: VecDeque::from(script),
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
            })
        }
    }

    fn frame(command: &ServerCommand) -> Option<Result<String, RoomError>> {
        Some(Ok(command.to_frame().unwrap()))
    }

    fn connection() -> SessionConnection {
        SessionConnection::new("abc", &SessionConfig::default())
    }

    #[test]
    fn transitions() {
        use ConnectionState::*;
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Open));
        assert!(Open.can_transition_to(Closed));
        assert!(Idle.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Connecting));
        assert!(!Closed.can_transition_to(Open));
        assert!(!Open.can_transition_to(Connecting));
        assert!(!Idle.can_transition_to(Open));
    }

    #[tokio::test]
    async fn denied_verdict_never_connects() {
        let connector = MockConnector::new(Vec::new());
        let connects = Arc::clone(&connector.connects);
        let mut conn = connection();

        let verdict = GateVerdict::Denied(DenialReason::NotFound);
        assert!(conn.open(&verdict, connector).is_none());
        assert!(conn.open(&GateVerdict::Pending, MockConnector::new(Vec::new())).is_none());
        assert_eq!(conn.state(), ConnectionState::Idle);
        assert_eq!(connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn connected_then_commands_in_order() {
        let first = ServerCommand::ChatMessage(ChatEntry::RoundBegin);
        let second = ServerCommand::ChatMessage(ChatEntry::RoundEnd);
        let connector = MockConnector::new(vec![frame(&first), frame(&second)]);
        let mut conn = connection();

        let mut events = conn.open(&GateVerdict::Allowed, connector).unwrap();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);
        assert!(conn.is_open());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Command(first));
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Command(second));

        conn.close().await;
    }

    #[tokio::test]
    async fn second_open_is_a_noop() {
        let connector = MockConnector::new(Vec::new());
        let connects = Arc::clone(&connector.connects);
        let mut conn = connection();

        let mut events = conn.open(&GateVerdict::Allowed, connector).unwrap();
        let again = MockConnector::new(Vec::new());
        let again_connects = Arc::clone(&again.connects);
        assert!(conn.open(&GateVerdict::Allowed, again).is_none());

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(again_connects.load(Ordering::SeqCst), 0);

        conn.close().await;
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let good = ServerCommand::SetUsers(Vec::new());
        let connector = MockConnector::new(vec![
            Some(Ok("not json".into())),
            Some(Ok(r#"{"t":"Teleport","c":null}"#.into())),
            Some(Ok(r#"{"t":"SetUsers","c":"nope"}"#.into())),
            frame(&good),
        ]);
        let mut conn = connection();

        let mut events = conn.open(&GateVerdict::Allowed, connector).unwrap();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Command(good));
        assert!(conn.is_open());

        conn.close().await;
    }

    #[tokio::test]
    async fn send_is_noop_until_open() {
        let connector = MockConnector::new(Vec::new());
        let sent = Arc::clone(&connector.sent);
        let mut conn = connection();

        assert!(!conn.send(ClientCommand::BeginRound));

        let mut events = conn.open(&GateVerdict::Allowed, connector).unwrap();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);
        assert!(conn.send(ClientCommand::BeginRound));
        tokio::time::sleep(Duration::from_millis(20)).await;

        conn.close().await;
        assert!(!conn.send(ClientCommand::BeginRound));

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            ClientCommand::from_frame(&sent[0]).unwrap(),
            ClientCommand::BeginRound
        );
    }

    #[tokio::test]
    async fn transport_error_closes_without_retry() {
        let connector = MockConnector::new(vec![Some(Err(RoomError::TransportReceive("reset".into())))]);
        let connects = Arc::clone(&connector.connects);
        let mut conn = connection();
        let mut state = conn.subscribe_state();

        let mut events = conn.open(&GateVerdict::Allowed, connector).unwrap();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);
        match events.recv().await.unwrap() {
            SessionEvent::Disconnected { reason } => assert!(reason.unwrap().contains("reset")),
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert!(events.recv().await.is_none());

        state.wait_for(|s| s.is_closed()).await.unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(!conn.send(ClientCommand::BeginRound));
    }

    #[tokio::test]
    async fn connect_failure_is_terminal() {
        let mut conn = connection();
        let mut events = conn.open(&GateVerdict::Allowed, MockConnector::failing()).unwrap();

        match events.recv().await.unwrap() {
            SessionEvent::Disconnected { reason } => {
                assert!(reason.unwrap().starts_with("connect failed"));
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_is_terminal() {
        struct NeverConnects;

        #[async_trait]
        impl Connector for NeverConnects {
            type Transport = MockTransport;

            async fn connect(&self, _room: &str) -> Result<MockTransport, RoomError> {
                std::future::pending().await
            }
        }

        let config = SessionConfig::default().with_connect_timeout(Duration::from_secs(2));
        let mut conn = SessionConnection::new("abc", &config);
        let mut events = conn.open(&GateVerdict::Allowed, NeverConnects).unwrap();

        match events.recv().await.unwrap() {
            SessionEvent::Disconnected { reason } => assert!(reason.unwrap().contains("timed out")),
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn far_end_close_emits_disconnected_without_reason() {
        let connector = MockConnector::new(vec![None]);
        let mut conn = connection();
        let mut events = conn.open(&GateVerdict::Allowed, connector).unwrap();

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Disconnected { reason: None }
        );
    }

    #[tokio::test]
    async fn close_detaches_listeners_and_closes_transport() {
        let connector = MockConnector::new(Vec::new());
        let closed = Arc::clone(&connector.closed);
        let mut conn = connection();

        let mut events = conn.open(&GateVerdict::Allowed, connector).unwrap();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);

        conn.close().await;
        assert!(closed.load(Ordering::Acquire));
        assert_eq!(conn.state(), ConnectionState::Closed);
        // Detached: the channel ends without a Disconnected event.
        assert!(events.recv().await.is_none());

        conn.close().await;
    }

    #[tokio::test]
    async fn close_with_undrained_events_still_closes_transport() {
        let script = (0..4)
            .map(|_| frame(&ServerCommand::ChatMessage(ChatEntry::RoundBegin)))
            .collect();
        let connector = MockConnector::new(script);
        let closed = Arc::clone(&connector.closed);
        let config = SessionConfig::default()
            .with_event_channel_capacity(1)
            .with_shutdown_timeout(Duration::from_secs(30));
        let mut conn = SessionConnection::new("abc", &config);

        // Never drained: the owner task blocks delivering the first command.
        let _events = conn.open(&GateVerdict::Allowed, connector).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        conn.close().await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(closed.load(Ordering::Acquire));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn close_before_open_is_terminal() {
        let mut conn = connection();
        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.open(&GateVerdict::Allowed, MockConnector::new(Vec::new())).is_none());
    }

    #[tokio::test]
    async fn drop_closes_state_for_outstanding_senders() {
        let mut conn = connection();
        let sender = conn.sender();
        let mut state = conn.subscribe_state();
        let mut events = conn.open(&GateVerdict::Allowed, MockConnector::new(Vec::new())).unwrap();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);

        drop(conn);
        assert!(state.borrow_and_update().is_closed());
        assert!(!sender.send(ClientCommand::BeginRound));
    }

    #[tokio::test]
    async fn debug_impl_for_connection() {
        let conn = connection();
        let debug = format!("{conn:?}");
        assert!(debug.contains("SessionConnection"));
        assert!(debug.contains("Idle"));
    }
}
