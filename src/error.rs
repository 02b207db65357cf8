//! Error types for the room session client.

use thiserror::Error;

/// Errors that can occur inside the room session layer.
///
/// Most of these never reach a UI consumer: decode failures and transport
/// failures are logged and contained by the connection task. Consumers observe
/// the outcome through [`RoomStatus`](crate::event::RoomStatus) instead.
#[derive(Debug, Error)]
pub enum RoomError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a value.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An inbound frame was not a `{t, c}` JSON envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// An inbound frame carried a tag this client does not know.
    #[error("unknown command tag `{tag}`")]
    UnknownTag {
        /// The tag found in the frame.
        tag: String,
    },

    /// A known tag carried a payload of the wrong shape.
    #[error("invalid payload for `{tag}`: {detail}")]
    InvalidPayload {
        /// The tag found in the frame.
        tag: String,
        /// Decoder message.
        detail: String,
    },

    /// The pre-flight authorization request failed.
    #[error("authorization request failed: {message}")]
    Authorization {
        /// HTTP status of the failed request, when one was received.
        status: Option<u16>,
        /// Human-readable failure description.
        message: String,
    },

    /// A problem index was outside the current problem set.
    #[error("problem index {index} out of range (problem count {len})")]
    ProblemIndexOutOfRange {
        /// The rejected index.
        index: usize,
        /// Number of problems in the current set (0 when absent).
        len: usize,
    },

    /// A code run or submission was requested before any problem set arrived.
    #[error("round has not started")]
    RoundNotStarted,

    /// The session connection is not open.
    #[error("session connection is not open")]
    NotConnected,

    /// The outbound command queue was full and the command was dropped.
    #[error("command `{tag}` dropped: outbound queue full")]
    CommandDropped {
        /// Tag of the dropped command.
        tag: &'static str,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for room session operations.
pub type Result<T> = std::result::Result<T, RoomError>;
