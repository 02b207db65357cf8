//! # Loopback Room Example
//!
//! Runs a full room session against an in-process fake room server:
//!
//! 1. A [`Connector`] that spawns the fake server and hands back a channel
//!    [`Transport`] to it
//! 2. An [`Authorizer`] that lets everyone in
//! 3. Chat, a round start, an edit and a test run, with the store observed
//!    through its watch channel
//!
//! Useful as a template for custom transports and for exercising UI code
//! without a backend.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_room
//! RUST_LOG=radix_room_client=debug cargo run --example loopback_room
//! ```

use std::time::Duration;

use async_trait::async_trait;
use radix_room_client::gate::{AuthorizationResponse, Authorizer};
use radix_room_client::protocol::{
    BoilerplateCode, ChatEntry, ClientCommand, Language, Problem, RoomConfig, RoomUser,
    ServerCommand, TestCase, TestResult,
};
use radix_room_client::{
    ConnectionGate, Connector, RoomError, RoomSession, RoomStatus, SessionConfig, Transport,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel transport and a connector that starts the server
// ─────────────────────────────────────────────────────────────────────

/// Client half of an in-process connection.
pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, frame: String) -> Result<(), RoomError> {
        self.tx
            .send(frame)
            .map_err(|e| RoomError::TransportSend(e.to_string()))
    }

    /// Cancel-safe: `UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, RoomError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), RoomError> {
        self.rx.close();
        Ok(())
    }
}

struct LoopbackConnector;

#[async_trait]
impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    async fn connect(&self, room: &str) -> Result<LoopbackTransport, RoomError> {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        tokio::spawn(fake_room_server(room.to_string(), server_rx, server_tx));
        Ok(LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        })
    }
}

struct AllowEveryone;

#[async_trait]
impl Authorizer for AllowEveryone {
    async fn can_connect(&self, _room: &str) -> Result<AuthorizationResponse, RoomError> {
        Ok(AuthorizationResponse::allowed())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: The fake room server
// ─────────────────────────────────────────────────────────────────────

fn demo_user() -> RoomUser {
    RoomUser {
        id: "u1".into(),
        name: "RustPlayer".into(),
        avatar: "https://avatars.example/u1.png".into(),
    }
}

fn demo_problem() -> Problem {
    Problem {
        id: "sum".into(),
        title: "Sum".into(),
        description: "Print the sum of two integers.".into(),
        boilerplate_code: BoilerplateCode {
            python: "a, b = map(int, input().split())\n".into(),
            javascript: "const [a, b] = require('fs').readFileSync(0, 'utf8').split(' ');\n".into(),
        },
        default_test_cases: vec![TestCase {
            input: "1 2".into(),
            output: "3".into(),
        }],
        difficulty: Some(1),
    }
}

/// Answers the way a room server would, for the handful of commands the demo sends.
async fn fake_room_server(
    room: String,
    mut rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
) {
    let push = |command: ServerCommand| {
        if let Ok(frame) = command.to_frame() {
            let _ = tx.send(frame);
        }
    };

    push(ServerCommand::SetRoomConfig(RoomConfig {
        name: room,
        is_public: true,
        owner: demo_user(),
    }));
    push(ServerCommand::SetUsers(vec![demo_user()]));
    push(ServerCommand::ChatHistory(vec![ChatEntry::Connection {
        username: demo_user().name,
    }]));

    while let Some(frame) = rx.recv().await {
        let Ok(command) = ClientCommand::from_frame(&frame) else {
            tracing::warn!("fake server: unreadable frame {frame}");
            continue;
        };
        tracing::info!("fake server received {}", command.tag());
        match command {
            ClientCommand::SendChatMessage { content } => {
                push(ServerCommand::ChatMessage(ChatEntry::UserChat {
                    author: demo_user(),
                    content,
                }));
            }
            ClientCommand::BeginRound => {
                push(ServerCommand::SetProblems(Some(vec![demo_problem()])));
                push(ServerCommand::ChatMessage(ChatEntry::RoundBegin));
            }
            ClientCommand::TestCode { .. } => {
                push(ServerCommand::SetTestResponse(TestResult::AllTestsPassed {
                    runtime_ms: 42,
                }));
            }
            ClientCommand::SubmitCode { .. } | ClientCommand::SetEditorContent { .. } => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Drive a session
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let gate = ConnectionGate::new(AllowEveryone);
    let mut session = RoomSession::new("loopback", SessionConfig::default());

    let mut status = session.subscribe_status();
    session.connect(&gate, LoopbackConnector).await;
    status.wait_for(|s| *s == RoomStatus::Connected).await?;
    tracing::info!("connected");

    let mut state = session.store().subscribe();

    session.send_chat_message("hello from the loopback demo");
    session.begin_round();
    state.wait_for(|s| s.problems().is_some()).await?;

    session.edit_code(Language::Python, "a, b = map(int, input().split())\nprint(a + b)\n".into());
    session.test_code(Language::Python)?;
    state.wait_for(|s| s.test_status().result().is_some()).await?;

    let snapshot = session.snapshot();
    tracing::info!(
        "room {:?}: {} chat entries, {} participant(s), test status {:?}",
        snapshot.config().map(|c| c.name.as_str()),
        snapshot.chat_history().len(),
        snapshot.roster().len(),
        snapshot.test_status()
    );

    // Let the trailing editor notification go out before leaving.
    tokio::time::sleep(Duration::from_millis(350)).await;
    session.leave().await;
    tracing::info!("left room");
    Ok(())
}
