//! # Join Room Example
//!
//! Joins a room on a running backend: the HTTP pre-flight check, then the
//! WebSocket session. Prints status changes and new chat lines until Ctrl+C.
//!
//! ## Running
//!
//! ```sh
//! RADIX_BACKEND_URL=http://localhost:8080 RADIX_ROOM=weekly \
//!     cargo run --example join_room --features authorizer-http
//! ```
//!
//! Set `RADIX_TOKEN` to send a bearer token with both requests.

use radix_room_client::gate::http::HttpAuthorizer;
use radix_room_client::protocol::ChatEntry;
use radix_room_client::{ConnectionGate, RoomSession, RoomStatus, SessionConfig, WebSocketConnector};

fn describe(entry: &ChatEntry) -> String {
    match entry {
        ChatEntry::UserChat { author, content } => format!("<{}> {content}", author.name),
        ChatEntry::Connection { username } => format!("* {username} joined"),
        ChatEntry::Disconnection { username } => format!("* {username} left"),
        ChatEntry::RoundBegin => "* round started".into(),
        ChatEntry::RoundEnd => "* round over".into(),
        ChatEntry::UserSubmitted { username } => format!("* {username} submitted"),
        ChatEntry::UserProblemCompletion {
            username,
            problem_index,
        } => format!("* {username} solved problem {}", problem_index + 1),
        ChatEntry::UserFinished { username, place } => format!("* {username} finished #{place}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let backend =
        std::env::var("RADIX_BACKEND_URL").unwrap_or_else(|_| "http://localhost:8080".into());
    let room = std::env::var("RADIX_ROOM").unwrap_or_else(|_| "lobby".into());
    let token = std::env::var("RADIX_TOKEN").ok();

    let mut authorizer = HttpAuthorizer::builder(backend.clone());
    let mut connector = WebSocketConnector::new(backend);
    if let Some(token) = token {
        authorizer = authorizer.bearer_token(token.clone());
        connector = connector.with_bearer_token(token);
    }
    let gate = ConnectionGate::new(authorizer.build());

    let mut session = RoomSession::new(room.clone(), SessionConfig::default());
    let mut status = session.subscribe_status();
    let mut state = session.store().subscribe();

    match session.connect(&gate, connector).await {
        RoomStatus::Denied(reason) => {
            tracing::error!("cannot join {room}: {reason}");
            return Ok(());
        }
        other => tracing::info!("joining {room}: {other:?}"),
    }

    let mut printed = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving room");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                tracing::info!("status: {current:?}");
                if matches!(current, RoomStatus::Disconnected { .. }) {
                    break;
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                let history = snapshot.chat_history();
                // History replacement can shrink the log; start over.
                if history.len() < printed {
                    printed = 0;
                }
                for entry in history.iter().skip(printed) {
                    println!("{}", describe(entry));
                }
                printed = history.len();
            }
        }
    }

    session.leave().await;
    Ok(())
}
