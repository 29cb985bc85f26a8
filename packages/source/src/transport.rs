//! HTTP seam for the marketplace adapter.
//!
//! [`Transport`] is the only thing that touches the network. The
//! production [`HttpTransport`] wraps a `reqwest` client with its own cookie
//! jar; tests substitute a scripted double.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;

/// One outbound GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Absolute URL without query string.
    pub url: String,
    /// Query parameters in order.
    pub query: Vec<(String, String)>,
    /// Request headers in order.
    pub headers: Vec<(String, String)>,
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body decoded as text.
    pub body: String,
}

/// Network-level failures. All of them are considered transient.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request did not complete within the timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other failure while sending or reading.
    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Sends requests on behalf of a listing source.
pub trait Transport: Send {
    /// Issues a GET request and returns status and body, whatever the
    /// status code.
    fn get(
        &mut self,
        request: &HttpRequest,
    ) -> impl std::future::Future<Output = Result<RawResponse, TransportError>> + Send;

    /// Drops every stored cookie.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the underlying client cannot be rebuilt.
    fn clear_cookies(&mut self) -> Result<(), TransportError>;
}

/// `reqwest`-backed transport with a private cookie jar.
pub struct HttpTransport {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Builds a transport identifying itself as `user_agent` with a
    /// per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the client cannot be built.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(user_agent, timeout)?,
            user_agent: user_agent.to_string(),
            timeout,
        })
    }
}

fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .cookie_provider(Arc::new(Jar::default()))
        .build()
}

impl Transport for HttpTransport {
    async fn get(&mut self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self.client.get(&request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        log::trace!("GET {} -> {status} ({} bytes)", request.url, body.len());

        Ok(RawResponse { status, body })
    }

    fn clear_cookies(&mut self) -> Result<(), TransportError> {
        // The jar has no clear operation; a new client gets a new jar.
        self.client = build_client(&self.user_agent, self.timeout)?;
        Ok(())
    }
}
