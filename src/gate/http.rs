//! HTTP pre-flight authorizer backed by `reqwest`.
//!
//! Issues `GET {base_url}/room/can-connect?name=<room>` and expects an
//! [`AuthorizationResponse`] body (`{"canConnect": bool, "reason": string}`).

use std::time::Duration;

use async_trait::async_trait;

use super::{AuthorizationResponse, Authorizer};
use crate::error::{Result, RoomError};

/// Default TCP connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// [`Authorizer`] that asks the room backend over HTTP.
///
/// # Example
///
/// ```rust,no_run
/// use radix_room_client::gate::http::HttpAuthorizer;
/// use radix_room_client::gate::ConnectionGate;
///
/// let authorizer = HttpAuthorizer::builder("http://localhost:8080")
///     .bearer_token("participant-token")
///     .build();
/// let gate = ConnectionGate::new(authorizer);
/// ```
#[derive(Debug, Clone)]
pub struct HttpAuthorizer {
    base_url: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl HttpAuthorizer {
    /// Start building an authorizer for the backend at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> HttpAuthorizerBuilder {
        HttpAuthorizerBuilder {
            base_url: base_url.into(),
            bearer_token: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// The pre-flight endpoint, without the query string.
    pub fn endpoint(&self) -> String {
        format!("{}/room/can-connect", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Authorizer for HttpAuthorizer {
    async fn can_connect(&self, room: &str) -> Result<AuthorizationResponse> {
        let url = self.endpoint();
        let mut request = self.client.get(&url).query(&[("name", room)]);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| RoomError::Authorization {
            status: None,
            message: format!("{url}: {e}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RoomError::Authorization {
                status: Some(status.as_u16()),
                message: format!("{url} returned HTTP {status}"),
            });
        }

        response
            .json::<AuthorizationResponse>()
            .await
            .map_err(|e| RoomError::Authorization {
                status: Some(status.as_u16()),
                message: format!("unreadable authorization response: {e}"),
            })
    }
}

/// Builder for [`HttpAuthorizer`].
#[derive(Debug, Clone)]
pub struct HttpAuthorizerBuilder {
    base_url: String,
    bearer_token: Option<String>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl HttpAuthorizerBuilder {
    /// Authenticate requests with the participant's bearer token.
    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Override the TCP connect timeout (default 3 s).
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the per-request timeout (default 10 s).
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Construct the authorizer.
    pub fn build(self) -> HttpAuthorizer {
        // Fall back to a default client rather than failing construction.
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .unwrap_or_default();

        HttpAuthorizer {
            base_url: self.base_url,
            bearer_token: self.bearer_token,
            client,
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
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one HTTP response and return the request head.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let head = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            head
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let authorizer = HttpAuthorizer::builder("http://localhost:8080/").build();
        assert_eq!(authorizer.endpoint(), "http://localhost:8080/room/can-connect");
    }

    #[tokio::test]
    async fn parses_denial_and_sends_room_and_token() {
        let (base, server) =
            serve_once("200 OK", r#"{"canConnect":false,"reason":"Room does not exist."}"#).await;

        let authorizer = HttpAuthorizer::builder(base).bearer_token("tok").build();
        let response = authorizer.can_connect("abc").await.unwrap();
        assert_eq!(response, AuthorizationResponse::denied("Room does not exist."));

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /room/can-connect?name=abc "), "head: {head}");
        assert!(head.to_ascii_lowercase().contains("authorization: bearer tok"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_authorization_error() {
        let (base, _server) = serve_once("403 Forbidden", "{}").await;

        let authorizer = HttpAuthorizer::builder(base).build();
        let err = authorizer.can_connect("abc").await.unwrap_err();
        assert!(matches!(
            err,
            RoomError::Authorization {
                status: Some(403),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_authorization_error() {
        let authorizer = HttpAuthorizer::builder("http://127.0.0.1:1")
            .connect_timeout(Duration::from_millis(200))
            .build();
        let err = authorizer.can_connect("abc").await.unwrap_err();
        assert!(matches!(err, RoomError::Authorization { status: None, .. }));
    }
}
