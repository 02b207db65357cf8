//! # Radix Room Client
//!
//! Session layer for collaborative competitive-programming rooms.
//!
//! Participants in a room share a problem set, write code, run tests and chat
//! over one persistent duplex connection each. This crate implements the client
//! side of that connection: the `{t, c}` command protocol, the pre-flight
//! connection gate, the connection lifecycle, and the room state store every
//! inbound command is reduced into.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **WebSocket built-in**: default `transport-websocket` feature provides [`WebSocketConnector`]
//! - **HTTP pre-flight**: `authorizer-http` feature provides [`gate::http::HttpAuthorizer`]
//! - **Snapshot state**: consumers read immutable [`RoomState`] snapshots and subscribe to changes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! let gate = ConnectionGate::new(authorizer);
//! let mut session = RoomSession::new("weekly-contest", SessionConfig::default());
//!
//! match session.connect(&gate, WebSocketConnector::new(backend_url)).await {
//!     RoomStatus::Denied(reason) => eprintln!("cannot join: {reason}"),
//!     _ => {
//!         let mut state = session.store().subscribe();
//!         while state.changed().await.is_ok() {
//!             render(&state.borrow_and_update());
//!         }
//!     }
//! }
//! ```

pub mod connection;
pub mod error;
pub mod event;
pub mod gate;
pub mod protocol;
pub mod session;
pub mod store;
pub mod test_status;
pub mod throttle;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use connection::{CommandSender, ConnectionState, SessionConnection};
pub use error::RoomError;
pub use event::{RoomStatus, SessionEvent};
pub use gate::{ConnectionGate, DenialReason, GateVerdict};
pub use protocol::{ClientCommand, ServerCommand};
pub use session::{RoomSession, SessionConfig};
pub use store::{RoomState, RoomStateStore};
pub use test_status::TestStatus;
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
