//! Remote endpoint value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors from constructing an [`Endpoint`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("host is empty")]
    EmptyHost,

    #[error("invalid host: {0:?}")]
    InvalidHost(String),

    #[error("port must be in 1..=65535")]
    InvalidPort,

    #[error("expected a single host:port token, got {0:?}")]
    Malformed(String),
}

/// A resolved `(host, port)` pair the client connects to.
///
/// Only constructed through validating paths, so a held value always has a
/// non-empty host and a non-zero port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawEndpoint", into = "RawEndpoint")]
pub struct Endpoint {
    host: String,
    port: u16,
}

#[derive(Serialize, Deserialize)]
struct RawEndpoint {
    host: String,
    port: u32,
}

impl Endpoint {
    /// Creates an endpoint, validating host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, EndpointError> {
        let host = host.into();
        if host.is_empty() {
            return Err(EndpointError::EmptyHost);
        }
        if host.contains(':') || host.chars().any(char::is_whitespace) {
            return Err(EndpointError::InvalidHost(host));
        }
        if port == 0 {
            return Err(EndpointError::InvalidPort);
        }
        Ok(Self { host, port })
    }

    /// Parses a `host:port` token.
    ///
    /// Surrounding whitespace (including a trailing newline) is ignored. The
    /// token must contain exactly one colon.
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let token = input.trim();
        let mut parts = token.split(':');
        let (Some(host), Some(port), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(EndpointError::Malformed(token.to_string()));
        };
        let port: u16 = port
            .parse()
            .map_err(|_| EndpointError::Malformed(token.to_string()))?;
        Self::new(host, port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<RawEndpoint> for Endpoint {
    type Error = EndpointError;

    fn try_from(raw: RawEndpoint) -> Result<Self, Self::Error> {
        let port = u16::try_from(raw.port).map_err(|_| EndpointError::InvalidPort)?;
        Self::new(raw.host, port)
    }
}

impl From<Endpoint> for RawEndpoint {
    fn from(ep: Endpoint) -> Self {
        Self {
            host: ep.host,
            port: u32::from(ep.port),
        }
    }
}
