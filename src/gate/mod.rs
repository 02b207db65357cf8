//! Pre-flight authorization for room connections.
//!
//! Before a session connection may be opened, an external [`Authorizer`]
//! decides whether the participant can join the room. [`ConnectionGate`] runs
//! that check at most once per room and caches the verdict for the lifetime of
//! the room view: concurrent evaluations share the in-flight request, and once
//! a verdict exists the authorizer is never called again for that room.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example(authorizer: impl radix_room_client::gate::Authorizer) {
//! use radix_room_client::gate::{ConnectionGate, GateVerdict};
//!
//! let gate = ConnectionGate::new(authorizer);
//! match gate.evaluate("weekly-contest").await {
//!     GateVerdict::Allowed => { /* open the session connection */ }
//!     GateVerdict::Denied(reason) => println!("cannot join: {reason}"),
//!     GateVerdict::Pending => unreachable!("evaluate always resolves"),
//! }
//! # }
//! ```

#[cfg(feature = "authorizer-http")]
pub mod http;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::{Result, RoomError};

/// Reason string the authorization service uses for a missing room.
pub const ROOM_DOES_NOT_EXIST: &str = "Room does not exist.";

/// Body of the authorization pre-flight response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResponse {
    pub can_connect: bool,
    #[serde(default)]
    pub reason: String,
}

impl AuthorizationResponse {
    /// An allowing response.
    pub fn allowed() -> Self {
        Self {
            can_connect: true,
            reason: String::new(),
        }
    }

    /// A denying response with the given reason.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            can_connect: false,
            reason: reason.into(),
        }
    }
}

/// Why a participant may not join a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// The room does not exist.
    NotFound,
    /// The participant is not permitted to join.
    Forbidden,
    /// Any other denial, with the service's message.
    Message(String),
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => f.write_str("room not found"),
            Self::Forbidden => f.write_str("not permitted to join this room"),
            Self::Message(message) => f.write_str(message),
        }
    }
}

/// Tri-state outcome of the gate for one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    /// The check has not resolved yet. Nothing may be connected.
    Pending,
    /// The connection must not be attempted.
    Denied(DenialReason),
    /// A session connection may be constructed.
    Allowed,
}

impl GateVerdict {
    /// Returns `true` only for [`GateVerdict::Allowed`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Map an authorization response onto a verdict.
    pub fn from_response(response: &AuthorizationResponse) -> Self {
        if response.can_connect {
            return Self::Allowed;
        }
        let reason = match response.reason.as_str() {
            ROOM_DOES_NOT_EXIST => DenialReason::NotFound,
            "" => DenialReason::Forbidden,
            other => DenialReason::Message(other.to_string()),
        };
        Self::Denied(reason)
    }

    /// Map a failed authorization request onto a verdict.
    pub fn from_error(error: &RoomError) -> Self {
        let reason = match error {
            RoomError::Authorization {
                status: Some(404), ..
            } => DenialReason::NotFound,
            RoomError::Authorization {
                status: Some(401 | 403),
                ..
            } => DenialReason::Forbidden,
            other => DenialReason::Message(other.to_string()),
        };
        Self::Denied(reason)
    }
}

/// The external collaborator that decides whether the participant may join.
///
/// The participant's identity is already established; implementations carry
/// whatever credential they need.
#[async_trait]
pub trait Authorizer: Send + Sync + 'static {
    /// Ask whether the participant may connect to `room`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Authorization`] (or any other error) when the
    /// request itself fails. The gate turns errors into a denial.
    async fn can_connect(&self, room: &str) -> Result<AuthorizationResponse>;
}

/// Caching, idempotent pre-flight check in front of session connections.
pub struct ConnectionGate {
    authorizer: Arc<dyn Authorizer>,
    verdicts: Mutex<HashMap<String, Arc<OnceCell<GateVerdict>>>>,
}

impl ConnectionGate {
    /// Create a gate backed by `authorizer`.
    pub fn new(authorizer: impl Authorizer) -> Self {
        Self::from_arc(Arc::new(authorizer))
    }

    /// Create a gate backed by a shared authorizer.
    pub fn from_arc(authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            authorizer,
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the verdict for `room`, asking the authorizer only if no verdict
    /// exists and no request is already in flight.
    pub async fn evaluate(&self, room: &str) -> GateVerdict {
        let cell = self.cell(room);
        cell.get_or_init(|| async {
            debug!(room = %room, "requesting connection authorization");
            let verdict = match self.authorizer.can_connect(room).await {
                Ok(response) => GateVerdict::from_response(&response),
                Err(e) => {
                    warn!(room = %room, "authorization request failed: {e}");
                    GateVerdict::from_error(&e)
                }
            };
            debug!(room = %room, ?verdict, "connection authorization resolved");
            verdict
        })
        .await
        .clone()
    }

    /// The current verdict for `room` without triggering a request.
    pub fn verdict(&self, room: &str) -> GateVerdict {
        let verdicts = match self.verdicts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        verdicts
            .get(room)
            .and_then(|cell| cell.get().cloned())
            .unwrap_or(GateVerdict::Pending)
    }

    fn cell(&self, room: &str) -> Arc<OnceCell<GateVerdict>> {
        let mut verdicts = match self.verdicts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(verdicts.entry(room.to_string()).or_default())
    }
}

impl std::fmt::Debug for ConnectionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rooms = match self.verdicts.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        };
        f.debug_struct("ConnectionGate")
            .field("rooms", &rooms)
            .finish()
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
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts requests and answers after a short delay.
    struct CountingAuthorizer {
        calls: Arc<AtomicUsize>,
        response: std::result::Result<AuthorizationResponse, u16>,
    }

    #[async_trait]
    impl Authorizer for CountingAuthorizer {
        async fn can_connect(&self, _room: &str) -> Result<AuthorizationResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.response
                .clone()
                .map_err(|status| RoomError::Authorization {
                    status: Some(status),
                    message: format!("HTTP {status}"),
                })
        }
    }

    fn counting_gate(
        response: std::result::Result<AuthorizationResponse, u16>,
    ) -> (ConnectionGate, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = ConnectionGate::new(CountingAuthorizer {
            calls: Arc::clone(&calls),
            response,
        });
        (gate, calls)
    }

    #[test]
    fn response_mapping() {
        assert_eq!(
            GateVerdict::from_response(&AuthorizationResponse::allowed()),
            GateVerdict::Allowed
        );
        assert_eq!(
            GateVerdict::from_response(&AuthorizationResponse::denied(ROOM_DOES_NOT_EXIST)),
            GateVerdict::Denied(DenialReason::NotFound)
        );
        assert_eq!(
            GateVerdict::from_response(&AuthorizationResponse::denied("")),
            GateVerdict::Denied(DenialReason::Forbidden)
        );
        assert_eq!(
            GateVerdict::from_response(&AuthorizationResponse::denied(
                "You are already connected to a room."
            )),
            GateVerdict::Denied(DenialReason::Message(
                "You are already connected to a room.".into()
            ))
        );
    }

    #[test]
    fn response_wire_format() {
        let response: AuthorizationResponse =
            serde_json::from_str(r#"{"canConnect":false,"reason":"Room does not exist."}"#)
                .unwrap();
        assert_eq!(response, AuthorizationResponse::denied(ROOM_DOES_NOT_EXIST));

        let response: AuthorizationResponse = serde_json::from_str(r#"{"canConnect":true}"#).unwrap();
        assert!(response.can_connect);
    }

    #[tokio::test]
    async fn verdict_is_pending_before_evaluation() {
        let (gate, calls) = counting_gate(Ok(AuthorizationResponse::allowed()));
        assert_eq!(gate.verdict("abc"), GateVerdict::Pending);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn verdict_is_cached_after_first_evaluation() {
        let (gate, calls) = counting_gate(Ok(AuthorizationResponse::allowed()));

        assert_eq!(gate.evaluate("abc").await, GateVerdict::Allowed);
        assert_eq!(gate.evaluate("abc").await, GateVerdict::Allowed);
        assert_eq!(gate.verdict("abc"), GateVerdict::Allowed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_evaluations_share_one_request() {
        let (gate, calls) = counting_gate(Ok(AuthorizationResponse::denied(ROOM_DOES_NOT_EXIST)));

        let (a, b) = tokio::join!(gate.evaluate("abc"), gate.evaluate("abc"));
        assert_eq!(a, GateVerdict::Denied(DenialReason::NotFound));
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rooms_are_cached_independently() {
        let (gate, calls) = counting_gate(Ok(AuthorizationResponse::allowed()));

        gate.evaluate("one").await;
        gate.evaluate("two").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(gate.verdict("three"), GateVerdict::Pending);
    }

    #[tokio::test]
    async fn request_failures_become_denials() {
        let (gate, _) = counting_gate(Err(404));
        assert_eq!(
            gate.evaluate("abc").await,
            GateVerdict::Denied(DenialReason::NotFound)
        );

        let (gate, _) = gate_with_status(403);
        assert_eq!(
            gate.evaluate("abc").await,
            GateVerdict::Denied(DenialReason::Forbidden)
        );

        let (gate, _) = gate_with_status(500);
        assert!(matches!(
            gate.evaluate("abc").await,
            GateVerdict::Denied(DenialReason::Message(_))
        ));
    }

    fn gate_with_status(status: u16) -> (ConnectionGate, Arc<AtomicUsize>) {
        counting_gate(Err(status))
    }
}
