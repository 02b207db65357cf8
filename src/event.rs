//! Events emitted by the session connection and the room view.

use crate::gate::DenialReason;
use crate::protocol::ServerCommand;

/// Events delivered by a [`SessionConnection`](crate::connection::SessionConnection)
/// on its event channel, in transport order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transport acknowledged the connection.
    Connected,
    /// A decoded inbound command.
    Command(ServerCommand),
    /// The connection ended. Always the last event; no reconnect follows.
    Disconnected {
        /// Why the connection ended, if not a clean close by the far end.
        reason: Option<String>,
    },
}

/// The connection status of a room view, as a UI would display it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomStatus {
    /// The pre-flight authorization check is in flight.
    Authorizing,
    /// Authorized; the transport is being established.
    Connecting,
    /// The session connection is open.
    Connected,
    /// The session connection ended. Terminal for the view.
    Disconnected {
        /// Why the connection ended, if known.
        reason: Option<String>,
    },
    /// The participant may not join this room. Terminal for the view.
    Denied(DenialReason),
}

impl RoomStatus {
    /// Returns `true` for `Disconnected` and `Denied`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::Denied(_))
    }
}
