//! The HTTP transport seam.

use crate::error::{ResilienceError, Result, TimeoutPhase, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::io;
use std::time::Duration;
use tracing::trace;

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            if err.is_connect() {
                TransportError::Timeout(TimeoutPhase::Connect)
            } else {
                TransportError::Timeout(TimeoutPhase::Read)
            }
        } else if err.is_connect() {
            TransportError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, err))
        } else if err.is_request() || err.is_body() {
            TransportError::Io(io::Error::new(io::ErrorKind::Other, err))
        } else {
            TransportError::Other(err.into())
        }
    }
}

/// Sends one request to one endpoint.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Send `request` as-is.
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// [`Transport`] over a pooled reqwest client.
///
/// Response bodies are left on the connection until read or drained.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Transport with default timeouts.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        trace!(method = %request.method(), url = %request.url(), "Sending request");

        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        Ok(HttpResponse::from_reqwest(response))
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct ReqwestTransportBuilder {
    timeout: Duration,
    connect_timeout: Duration,
    pool_max_idle_per_host: Option<usize>,
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
            pool_max_idle_per_host: None,
        }
    }
}

impl ReqwestTransportBuilder {
    /// Whole-request timeout.
    #[must_use]
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self
    }

    /// Connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }

    /// Idle connections kept per host.
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, n: usize) -> Self {
        self.pool_max_idle_per_host = Some(n);
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<ReqwestTransport> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout);
        if let Some(n) = self.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }
        let client = builder
            .build()
            .map_err(|e| ResilienceError::configuration(format!("HTTP client: {e}")))?;
        Ok(ReqwestTransport { client })
    }
}
