//! Per-room-view composition of gate, connection, store and editor throttle.
//!
//! A [`RoomSession`] is created when a room view is entered and consumed by
//! [`RoomSession::leave`] when it is exited. It owns the view's
//! [`RoomStateStore`] and its single [`SessionConnection`], and runs a pump task
//! that applies every inbound command to the store in arrival order.
//!
//! # Example
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "transport-websocket", feature = "authorizer-http"))]
//! # async fn example() {
//! use radix_room_client::gate::{http::HttpAuthorizer, ConnectionGate};
//! use radix_room_client::protocol::Language;
//! use radix_room_client::{RoomSession, SessionConfig, WebSocketConnector};
//!
//! let gate = ConnectionGate::new(HttpAuthorizer::builder("http://localhost:8080").build());
//! let mut session = RoomSession::new("weekly-contest", SessionConfig::default());
//! session
//!     .connect(&gate, WebSocketConnector::new("http://localhost:8080"))
//!     .await;
//!
//! session.send_chat_message("good luck everyone");
//! session.edit_code(Language::Python, "print(input())".into());
//! session.leave().await;
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::connection::{ConnectionState, SessionConnection};
use crate::error::{Result, RoomError};
use crate::event::{RoomStatus, SessionEvent};
use crate::gate::{ConnectionGate, GateVerdict};
use crate::protocol::{ClientCommand, Language};
use crate::store::{RoomState, RoomStateStore};
use crate::throttle::ThrottledSender;
use crate::transport::Connector;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default capacity of the bounded outbound command channel.
const DEFAULT_COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default timeout for establishing the transport.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default minimum spacing of editor notifications.
const DEFAULT_EDITOR_THROTTLE: Duration = Duration::from_millis(300);

// ── Configuration ───────────────────────────────────────────────────

/// Tuning for a [`RoomSession`] and its [`SessionConnection`].
///
/// # Example
///
/// ```
/// use radix_room_client::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::default()
///     .with_event_channel_capacity(512)
///     .with_editor_throttle(Duration::from_millis(150));
/// assert_eq!(config.event_channel_capacity, 512);
/// assert_eq!(config.command_channel_capacity, 64);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the bounded event channel.
    ///
    /// Inbound events are never dropped; when the consumer falls behind, the
    /// owner task waits for room.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Capacity of the bounded outbound command channel.
    ///
    /// When it is full, further commands are dropped with a warning.
    ///
    /// Defaults to **64**. Values below 1 are clamped to 1.
    pub command_channel_capacity: usize,
    /// Time the owner task is given to close the transport on teardown before
    /// it is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Time the connector is given to establish the transport.
    ///
    /// Defaults to **10 seconds**.
    pub connect_timeout: Duration,
    /// Minimum spacing of `SetEditorContent` notifications.
    ///
    /// Defaults to **300 ms**.
    pub editor_throttle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            command_channel_capacity: DEFAULT_COMMAND_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            editor_throttle: DEFAULT_EDITOR_THROTTLE,
        }
    }
}

impl SessionConfig {
    /// Set the capacity of the bounded event channel. Clamped to at least 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the capacity of the outbound command channel. Clamped to at least 1.
    #[must_use]
    pub fn with_command_channel_capacity(mut self, capacity: usize) -> Self {
        self.command_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    ///
    /// A zero timeout aborts the owner task without waiting.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the timeout for establishing the transport.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the minimum spacing of editor notifications.
    #[must_use]
    pub fn with_editor_throttle(mut self, interval: Duration) -> Self {
        self.editor_throttle = interval;
        self
    }
}

// ── Room session ────────────────────────────────────────────────────

/// One participant's view of one room.
pub struct RoomSession {
    room: String,
    config: SessionConfig,
    store: Arc<RoomStateStore>,
    connection: SessionConnection,
    status: Arc<watch::Sender<RoomStatus>>,
    pump: Option<JoinHandle<()>>,
    editor: Option<ThrottledSender<String>>,
}

impl RoomSession {
    /// Enter the view for `room`. Nothing is requested until
    /// [`connect`](Self::connect).
    pub fn new(room: impl Into<String>, config: SessionConfig) -> Self {
        let room = room.into();
        let connection = SessionConnection::new(room.clone(), &config);
        let (status, _) = watch::channel(RoomStatus::Authorizing);
        Self {
            room,
            config,
            store: Arc::new(RoomStateStore::new()),
            connection,
            status: Arc::new(status),
            pump: None,
            editor: None,
        }
    }

    /// Authorize through `gate` and, when allowed, open the session connection.
    ///
    /// When the gate denies the room, [`RoomStatus::Denied`] is published and
    /// `connector` is never invoked. Only the first call does anything; later
    /// calls return the current status.
    pub async fn connect<C: Connector>(&mut self, gate: &ConnectionGate, connector: C) -> RoomStatus {
        if *self.status.borrow() != RoomStatus::Authorizing || self.pump.is_some() {
            debug!(room = %self.room, "connect already attempted; ignored");
            return self.status();
        }

        let verdict = gate.evaluate(&self.room).await;
        match &verdict {
            GateVerdict::Denied(reason) => {
                info!(room = %self.room, %reason, "room denied");
                publish(&self.status, RoomStatus::Denied(reason.clone()));
                return self.status();
            }
            GateVerdict::Pending => return self.status(),
            GateVerdict::Allowed => {}
        }

        let Some(events) = self.connection.open(&verdict, connector) else {
            return self.status();
        };
        publish(&self.status, RoomStatus::Connecting);

        self.pump = Some(tokio::spawn(pump_events(
            events,
            Arc::clone(&self.store),
            Arc::clone(&self.status),
        )));

        let sender = self.connection.sender();
        self.editor = Some(ThrottledSender::spawn(
            self.config.editor_throttle,
            move |content| {
                sender.send(ClientCommand::SetEditorContent { content });
            },
        ));

        self.status()
    }

    // ── Consumer actions ────────────────────────────────────────────

    /// Post a chat line. Returns `false` if the connection is not open.
    pub fn send_chat_message(&self, content: impl Into<String>) -> bool {
        self.connection.send(ClientCommand::SendChatMessage {
            content: content.into(),
        })
    }

    /// Ask the server to start the round.
    pub fn begin_round(&self) -> bool {
        self.connection.send(ClientCommand::BeginRound)
    }

    /// Record an edit of the current problem's buffer.
    ///
    /// The local buffer is written immediately. While a problem set is present,
    /// the server is notified through the editor throttle.
    pub fn edit_code(&self, language: Language, content: String) -> bool {
        let snapshot = self.store.snapshot();
        let index = snapshot.current_problem_index();
        let notify = snapshot.problems().is_some();

        let written = self.store.set_problem_code(index, language, content.clone());
        if notify {
            if let Some(editor) = &self.editor {
                editor.offer(content);
            }
        }
        written
    }

    /// Run the current problem's code against its default test cases.
    ///
    /// The latest editor contents are sent first, unthrottled, so the run sees
    /// exactly what the participant sees.
    ///
    /// # Errors
    ///
    /// - [`RoomError::RoundNotStarted`] if no problem set is present
    /// - [`RoomError::NotConnected`] if the connection is not open
    /// - [`RoomError::CommandDropped`] if the outbound queue is full
    ///
    /// The test status is left untouched on error.
    pub fn test_code(&self, language: Language) -> Result<()> {
        let snapshot = self.store.snapshot();
        let problem = snapshot.current_problem().ok_or(RoomError::RoundNotStarted)?;
        if !self.connection.is_open() {
            return Err(RoomError::NotConnected);
        }
        let content = snapshot
            .code()
            .get(snapshot.current_problem_index(), language)
            .unwrap_or_else(|| problem.boilerplate_code.for_language(language))
            .to_string();

        if !self.connection.send(ClientCommand::SetEditorContent { content }) {
            return Err(self.send_failure("SetEditorContent"));
        }
        self.request_run(ClientCommand::TestCode {
            language,
            test_cases: problem.default_test_cases.clone(),
        })
    }

    /// Submit the current problem's code for judging.
    ///
    /// # Errors
    ///
    /// Same as [`test_code`](Self::test_code).
    pub fn submit_code(&self, language: Language) -> Result<()> {
        let snapshot = self.store.snapshot();
        if snapshot.current_problem().is_none() {
            return Err(RoomError::RoundNotStarted);
        }
        if !self.connection.is_open() {
            return Err(RoomError::NotConnected);
        }

        self.request_run(ClientCommand::SubmitCode {
            problem_index: snapshot.current_problem_index(),
            language,
        })
    }

    /// Mark a run as pending and queue `command`; restore the previous test
    /// status if it could not be queued.
    fn request_run(&self, command: ClientCommand) -> Result<()> {
        let previous = self.store.snapshot().test_status().clone();
        let tag = command.tag();

        self.store.set_test_status(previous.clone().request());
        if self.connection.send(command) {
            return Ok(());
        }
        self.store.set_test_status(previous);
        Err(self.send_failure(tag))
    }

    fn send_failure(&self, tag: &'static str) -> RoomError {
        if self.connection.is_open() {
            RoomError::CommandDropped { tag }
        } else {
            RoomError::NotConnected
        }
    }

    /// Switch to another problem. Always resets the test status.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::ProblemIndexOutOfRange`] if `index` is not in the
    /// current problem set.
    pub fn select_problem(&self, index: usize) -> Result<()> {
        self.store.set_current_problem_index(index)
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn room(&self) -> &str {
        &self.room
    }

    /// The consumer-visible lifecycle status.
    pub fn status(&self) -> RoomStatus {
        self.status.borrow().clone()
    }

    /// Observe status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<RoomStatus> {
        self.status.subscribe()
    }

    /// State of the underlying connection.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The view's store.
    pub fn store(&self) -> &Arc<RoomStateStore> {
        &self.store
    }

    /// Shorthand for `store().snapshot()`.
    pub fn snapshot(&self) -> Arc<RoomState> {
        self.store.snapshot()
    }

    /// Exit the view.
    ///
    /// Pending editor notifications are discarded, the connection is closed
    /// with its listeners detached, and the pump stops. The store is dropped
    /// with the session unless a consumer still holds it.
    pub async fn leave(mut self) {
        info!(room = %self.room, "leaving room");
        if let Some(editor) = self.editor.take() {
            editor.stop();
        }
        self.connection.close().await;
        if let Some(pump) = self.pump.take() {
            pump.abort();
            if let Err(join_err) = pump.await {
                debug!(room = %self.room, "event pump stopped: {join_err}");
            }
        }
    }
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("room", &self.room)
            .field("status", &self.status())
            .field("connection", &self.connection)
            .finish()
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

// ── Event pump ──────────────────────────────────────────────────────

/// Publish `next` unless the status is already terminal.
fn publish(status: &watch::Sender<RoomStatus>, next: RoomStatus) {
    status.send_if_modified(|current| {
        if current.is_terminal() || *current == next {
            return false;
        }
        *current = next;
        true
    });
}

/// Apply session events to the store and status, in order.
async fn pump_events(
    mut events: mpsc::Receiver<SessionEvent>,
    store: Arc<RoomStateStore>,
    status: Arc<watch::Sender<RoomStatus>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Connected => publish(&status, RoomStatus::Connected),
            SessionEvent::Command(command) => store.apply(command),
            SessionEvent::Disconnected { reason } => {
                publish(&status, RoomStatus::Disconnected { reason });
            }
        }
    }
}

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

    #[test]
    fn config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.command_channel_capacity, 64);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.editor_throttle, Duration::from_millis(300));
    }

    #[test]
    fn capacities_are_clamped_to_one() {
        let config = SessionConfig::default()
            .with_event_channel_capacity(0)
            .with_command_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.command_channel_capacity, 1);
    }

    #[test]
    fn terminal_status_is_never_replaced() {
        let (status, _) = watch::channel(RoomStatus::Authorizing);
        publish(&status, RoomStatus::Denied(DenialReason::Forbidden));
        publish(&status, RoomStatus::Connected);
        assert_eq!(
            *status.borrow(),
            RoomStatus::Denied(DenialReason::Forbidden)
        );
    }

    #[tokio::test]
    async fn new_session_is_authorizing() {
        let session = RoomSession::new("abc", SessionConfig::default());
        assert_eq!(session.status(), RoomStatus::Authorizing);
        assert_eq!(session.connection_state(), ConnectionState::Idle);
        assert!(session.snapshot().chat_history().is_empty());
        assert!(!session.send_chat_message("hello"));
    }

    #[tokio::test]
    async fn actions_need_a_problem_set() {
        let session = RoomSession::new("abc", SessionConfig::default());
        assert!(matches!(
            session.test_code(Language::Python),
            Err(RoomError::RoundNotStarted)
        ));
        assert!(matches!(
            session.submit_code(Language::Javascript),
            Err(RoomError::RoundNotStarted)
        ));
        assert!(matches!(
            session.select_problem(0),
            Err(RoomError::ProblemIndexOutOfRange { index: 0, len: 0 })
        ));
        assert!(!session.edit_code(Language::Python, "x".into()));
    }
}
