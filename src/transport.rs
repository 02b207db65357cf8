//! Transport abstraction for room sessions.
//!
//! The [`Transport`] trait is one ordered, bidirectional stream of text frames
//! between this client and the room server. The [`Connector`] trait establishes
//! such a stream for a named room; it runs inside the connection task while the
//! session is `Connecting`, so a slow or failing connect never blocks the caller.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use radix_room_client::error::RoomError;
//! use radix_room_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), RoomError> {
//!         // Write one JSON frame
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, RoomError>> {
//!         // Read the next JSON frame; None when the far end closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), RoomError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&self, room: &str) -> Result<MyTransport, RoomError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::RoomError;

/// A bidirectional text frame transport for one room session.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame and
/// each call to [`recv`](Transport::recv) returns one. Frames are delivered in
/// the order they were written.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because it is polled
/// inside `tokio::select!`. Channel-based implementations are naturally
/// cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::TransportSend`] if the frame could not be written.
    async fn send(&mut self, frame: String) -> Result<(), RoomError>;

    /// Receive the next JSON frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the server closed the connection cleanly
    async fn recv(&mut self) -> Option<Result<String, RoomError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources are released
    /// regardless.
    async fn close(&mut self) -> Result<(), RoomError>;
}

/// Establishes a [`Transport`] addressed by room name.
///
/// Resolving the future is the transport-level connect acknowledgement that
/// moves a session from `Connecting` to `Open`.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport this connector produces.
    type Transport: Transport;

    /// Open a session connection for `room`.
    ///
    /// # Errors
    ///
    /// Any error is terminal for the session; it is not retried.
    async fn connect(&self, room: &str) -> Result<Self::Transport, RoomError>;
}
