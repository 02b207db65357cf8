#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Radix Room Client integration tests.
//!
//! Provides a scripted [`MockTransport`], a [`MockConnector`] that hands it out,
//! a [`StaticAuthorizer`], and fixture builders for protocol values.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use radix_room_client::gate::{AuthorizationResponse, Authorizer};
use radix_room_client::protocol::{
    BoilerplateCode, ChatEntry, ClientCommand, Problem, RoomUser, ServerCommand, TestCase,
};
use radix_room_client::{Connector, RoomError, RoomStatus, RoomSession, Transport};
use tokio::sync::mpsc;

/// One scripted `recv()` result.
pub type Scripted = Option<Result<String, RoomError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A mock transport for integration testing.
///
/// Scripted server frames are consumed in order by `recv()`. An explicit `None`
/// entry is a clean close by the server. Once the script runs out, frames
/// pushed on the live channel (if any) follow; otherwise `recv()` never
/// resolves.
pub struct MockTransport {
    incoming: VecDeque<Scripted>,
    live: Option<mpsc::UnboundedReceiver<Scripted>>,
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
        if let Some(item) = self.incoming.pop_front() {
            return item;
        }
        match &mut self.live {
            Some(live) => match live.recv().await {
                Some(item) => item,
                None => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), RoomError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Shared handles for inspecting what a [`MockConnector`] did.
#[derive(Clone, Default)]
pub struct MockHandles {
    /// Frames the client wrote.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether `close()` was called on the transport.
    pub closed: Arc<AtomicBool>,
    /// Number of `connect()` calls.
    pub connects: Arc<AtomicUsize>,
}

impl MockHandles {
    /// Decoded client commands, in send order.
    pub fn sent_commands(&self) -> Vec<ClientCommand> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|frame| ClientCommand::from_frame(frame).unwrap())
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

/// Connector that yields one scripted [`MockTransport`].
pub struct MockConnector {
    script: StdMutex<Option<Vec<Scripted>>>,
    live: StdMutex<Option<mpsc::UnboundedReceiver<Scripted>>>,
    handles: MockHandles,
    fail: bool,
}

impl MockConnector {
    /// A connector whose transport replays `script`.
    pub fn new(script: Vec<Scripted>) -> (Self, MockHandles) {
        let handles = MockHandles::default();
        let connector = Self {
            script: StdMutex::new(Some(script)),
            live: StdMutex::new(None),
            handles: handles.clone(),
            fail: false,
        };
        (connector, handles)
    }

    /// Like [`new`](Self::new), plus a channel for pushing server frames
    /// while the session runs.
    pub fn live(script: Vec<Scripted>) -> (Self, MockHandles, mpsc::UnboundedSender<Scripted>) {
        let (connector, handles) = Self::new(script);
        let (tx, rx) = mpsc::unbounded_channel();
        *connector.live.lock().unwrap() = Some(rx);
        (connector, handles, tx)
    }

    /// A connector whose `connect()` always fails.
    pub fn failing() -> (Self, MockHandles) {
        let (mut connector, handles) = Self::new(Vec::new());
        connector.fail = true;
        (connector, handles)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, _room: &str) -> Result<MockTransport, RoomError> {
        self.handles.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RoomError::TransportReceive("connection refused".into()));
        }
        let script = self
            .script
            .lock()
            .unwrap()
            .take()
            .ok_or(RoomError::TransportClosed)?;
        Ok(MockTransport {
            incoming: VecDeque::from(script),
            live: self.live.lock().unwrap().take(),
            sent: Arc::clone(&self.handles.sent),
            closed: Arc::clone(&self.handles.closed),
        })
    }
}

// ── StaticAuthorizer ────────────────────────────────────────────────

/// Authorizer with a fixed answer that counts its calls.
pub struct StaticAuthorizer {
    response: Result<AuthorizationResponse, u16>,
    pub calls: Arc<AtomicUsize>,
}

impl StaticAuthorizer {
    pub fn allowing() -> Self {
        Self::answering(Ok(AuthorizationResponse::allowed()))
    }

    pub fn denying(reason: &str) -> Self {
        Self::answering(Ok(AuthorizationResponse::denied(reason)))
    }

    /// Fails every request with the given HTTP status.
    pub fn failing(status: u16) -> Self {
        Self::answering(Err(status))
    }

    fn answering(response: Result<AuthorizationResponse, u16>) -> Self {
        Self {
            response,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn can_connect(&self, _room: &str) -> Result<AuthorizationResponse, RoomError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response
            .clone()
            .map_err(|status| RoomError::Authorization {
                status: Some(status),
                message: format!("HTTP {status}"),
            })
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub fn user(id: &str, name: &str) -> RoomUser {
    RoomUser {
        id: id.into(),
        name: name.into(),
        avatar: format!("https://avatars.example/{id}.png"),
    }
}

/// A problem with one default test case.
pub fn problem(title: &str, python: &str, javascript: &str) -> Problem {
    Problem {
        id: title.to_lowercase().replace(' ', "-"),
        title: title.into(),
        description: format!("Solve {title}."),
        boilerplate_code: BoilerplateCode {
            python: python.into(),
            javascript: javascript.into(),
        },
        default_test_cases: vec![TestCase {
            input: "1 2".into(),
            output: "3".into(),
        }],
        difficulty: None,
    }
}

pub fn connection_entry(username: &str) -> ChatEntry {
    ChatEntry::Connection {
        username: username.into(),
    }
}

/// A scripted frame carrying `command`.
pub fn frame(command: ServerCommand) -> Scripted {
    Some(Ok(command.to_frame().unwrap()))
}

/// A scripted raw text frame.
pub fn raw(text: &str) -> Scripted {
    Some(Ok(text.into()))
}

// ── Waiting ─────────────────────────────────────────────────────────

/// Wait (bounded) until the session status satisfies `pred`.
pub async fn wait_for_status(session: &RoomSession, pred: impl FnMut(&RoomStatus) -> bool) -> RoomStatus {
    let mut status = session.subscribe_status();
    let reached = tokio::time::timeout(Duration::from_secs(2), status.wait_for(pred))
        .await
        .expect("status wait timed out")
        .expect("status channel closed")
        .clone();
    reached
}

/// Wait (bounded) until the room state satisfies `pred`.
pub async fn wait_for_state(
    session: &RoomSession,
    mut pred: impl FnMut(&radix_room_client::RoomState) -> bool,
) {
    let mut state = session.store().subscribe();
    tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| pred(s)))
        .await
        .expect("state wait timed out")
        .expect("state channel closed");
}

/// Let spawned tasks run until the outbound path has flushed.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
