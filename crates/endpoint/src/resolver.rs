//! Remote endpoint lookup.
//!
//! The HTTP source serves a single `host:port` line. Resolution never
//! retries and never persists; both are the connection manager's job.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use tether_protocol::{Endpoint, EndpointError};

/// Errors from resolving the endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("config source returned status {0}")]
    Status(u16),

    #[error("config lookup timed out")]
    Timeout,

    #[error("malformed config: {0}")]
    Malformed(#[from] EndpointError),
}

/// A boxed future returned by [`ConfigResolver::resolve`].
pub type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Result<Endpoint, ResolutionError>> + Send + 'a>>;

/// Source of the endpoint to connect to.
pub trait ConfigResolver: Send + Sync + 'static {
    fn resolve(&self) -> ResolveFuture<'_>;
}

/// Fetches the endpoint with an HTTP GET of a fixed URL.
pub struct HttpResolver {
    http: reqwest::Client,
    url: String,
}

impl HttpResolver {
    /// Creates a resolver for `url`; every lookup is bounded by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ResolutionError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Endpoint, ResolutionError> {
        let resp = self.http.get(&self.url).send().await.map_err(map_http)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ResolutionError::Status(status.as_u16()));
        }

        let body = resp.text().await.map_err(map_http)?;
        let endpoint = Endpoint::parse(&body)?;
        debug!(url = %self.url, %endpoint, "endpoint fetched");
        Ok(endpoint)
    }
}

impl ConfigResolver for HttpResolver {
    fn resolve(&self) -> ResolveFuture<'_> {
        Box::pin(self.fetch())
    }
}

fn map_http(e: reqwest::Error) -> ResolutionError {
    if e.is_timeout() {
        ResolutionError::Timeout
    } else {
        ResolutionError::Http(e)
    }
}

/// Always yields the same endpoint.
pub struct StaticResolver {
    endpoint: Endpoint,
}

impl StaticResolver {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

impl ConfigResolver for StaticResolver {
    fn resolve(&self) -> ResolveFuture<'_> {
        let endpoint = self.endpoint.clone();
        Box::pin(async move { Ok(endpoint) })
    }
}
