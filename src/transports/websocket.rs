//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries room frames over a WebSocket text stream.
//! [`WebSocketConnector`] derives the per-room endpoint from the backend base
//! URL (`http://host` becomes `ws://host/room/<name>`) and attaches the
//! participant's bearer token when one is configured.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), radix_room_client::RoomError> {
//! use radix_room_client::{Connector, Transport, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("http://localhost:8080")
//!     .with_bearer_token("participant-token");
//! let mut transport = connector.connect("weekly-contest").await?;
//!
//! if let Some(Ok(frame)) = transport.recv().await {
//!     println!("received: {frame}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::RoomError;
use crate::transport::{Connector, Transport};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe; dropping its future before
/// completion loses no frames.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to `url` (`ws://` or `wss://`).
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Io`] if the URL is invalid or the connection cannot
    /// be established. An underlying I/O error keeps its
    /// [`ErrorKind`](std::io::ErrorKind); everything else maps to `Other`.
    pub async fn connect(url: &str) -> Result<Self, RoomError> {
        Self::connect_with_token(url, None).await
    }

    /// Like [`connect`](Self::connect), sending `Authorization: Bearer <token>`
    /// on the upgrade request when `token` is set.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn connect_with_token(url: &str, token: Option<&str>) -> Result<Self, RoomError> {
        tracing::debug!(url = %url, "connecting to room WebSocket");

        let mut request = url.into_client_request().map_err(io_error)?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                RoomError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
            })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(io_error)?;

        tracing::info!(url = %url, "room WebSocket established");

        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Wrap an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

fn io_error(e: tokio_tungstenite::tungstenite::Error) -> RoomError {
    let kind = match &e {
        tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
        _ => std::io::ErrorKind::Other,
    };
    RoomError::Io(std::io::Error::new(kind, e))
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), RoomError> {
        if self.closed {
            return Err(RoomError::TransportClosed);
        }
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| RoomError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, RoomError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(RoomError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("received binary WebSocket frame, room frames are text; skipping");
                }
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), RoomError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| RoomError::TransportSend(e.to_string()))
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Builds the room endpoint from the backend base URL and connects to it.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base_url: String,
    bearer_token: Option<String>,
}

impl WebSocketConnector {
    /// Create a connector for the backend at `base_url` (`http(s)://` or `ws(s)://`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: None,
        }
    }

    /// Send the participant's token on the upgrade request.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// The WebSocket endpoint for `room`.
    pub fn room_url(&self, room: &str) -> String {
        room_socket_url(&self.base_url, room)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, room: &str) -> Result<WebSocketTransport, RoomError> {
        let url = self.room_url(room);
        WebSocketTransport::connect_with_token(&url, self.bearer_token.as_deref()).await
    }
}

/// Characters escaped in the room path segment (RFC 3986 path-segment set,
/// plus `%` and `/`).
const ROOM_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'\\')
    .add(b'^')
    .add(b'|');

/// Map an HTTP(S) backend base URL onto the room's WebSocket endpoint.
///
/// The room name is percent-encoded as a single path segment.
pub fn room_socket_url(base_url: &str, room: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/room/{}", utf8_percent_encode(room, ROOM_SEGMENT))
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

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[test]
    fn room_url_rewrites_scheme() {
        assert_eq!(
            room_socket_url("http://localhost:8080", "abc"),
            "ws://localhost:8080/room/abc"
        );
        assert_eq!(
            room_socket_url("https://radix.example/", "weekly"),
            "wss://radix.example/room/weekly"
        );
        assert_eq!(
            room_socket_url("ws://127.0.0.1:9000", "x"),
            "ws://127.0.0.1:9000/room/x"
        );
    }

    #[test]
    fn room_name_is_one_encoded_segment() {
        assert_eq!(
            room_socket_url("http://localhost:8080", "a/b?c d#e%"),
            "ws://localhost:8080/room/a%2Fb%3Fc%20d%23e%25"
        );
        assert_eq!(
            room_socket_url("http://localhost:8080", "weekly-contest_2"),
            "ws://localhost:8080/room/weekly-contest_2"
        );
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::Io(_)));
    }

    // ── Mock-server helpers ──────────────────────────────────────────────

    use tokio::net::TcpListener;

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns its `ws://` address.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn recv_receives_frames_in_order() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"t":"SetUsers","c":[]}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"t":"SetProblems","c":null}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"t":"SetUsers","c":[]}"#
        );
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"t":"SetProblems","c":null}"#
        );
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "after_binary");
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, RoomError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_reaches_room_endpoint() {
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut path = String::new();
            let mut ws = tokio_tungstenite::accept_hdr_async(
                tcp,
                |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    path = req.uri().path().to_string();
                    Ok(resp)
                },
            )
            .await
            .unwrap();
            ws.send(Message::Text("hello".into())).await.unwrap();
            ws.close(None).await.unwrap();
            path
        });

        let connector = WebSocketConnector::new(format!("http://{addr}"));
        let mut transport = connector.connect("abc").await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "hello");
        assert_eq!(server.await.unwrap(), "/room/abc");
    }
}
