//! Public types for the connection manager.

use std::fmt;
use std::time::Duration;

use tether_protocol::constants::{BACKOFF_BASE, BACKOFF_CAP, CONNECT_TIMEOUT, HEARTBEAT_PERIOD};
use tether_protocol::{Endpoint, Outbound};

/// Lifecycle state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, no connect requested yet.
    Idle,
    /// Resolving the endpoint or opening the socket.
    Connecting,
    /// Link established; the read loop is running.
    Connected,
    /// Link lost or never established; waiting for backoff or a trigger.
    Disconnected,
    /// Terminal.
    ShuttingDown,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::ShuttingDown => "ShuttingDown",
        })
    }
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// An endpoint was picked for the next connect.
    EndpointResolved {
        endpoint: Endpoint,
        /// `true` when the lookup failed and the cached endpoint is used.
        from_cache: bool,
    },
    /// A reconnect is scheduled after `delay`.
    Reconnecting {
        /// Consecutive failed connect cycles so far.
        attempt: u32,
        delay: Duration,
    },
}

/// Exponential backoff without jitter.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay after a single failure, and after a session that ended.
    pub base: Duration,
    /// Upper bound for any delay.
    pub cap: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base: BACKOFF_BASE,
            cap: BACKOFF_CAP,
        }
    }
}

impl ReconnectConfig {
    /// Returns `min(base * 2^n, cap)`.
    pub fn delay_for_attempt(&self, n: u32) -> Duration {
        let factor = 1u32.checked_shl(n).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Connection manager tuning.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            heartbeat_interval: HEARTBEAT_PERIOD,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Client identity announced once per connection.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub name: String,
    pub version: String,
    pub platform: String,
    pub client_id: String,
}

impl ClientIdentity {
    /// Builds the identity line. Whitespace inside a field becomes `-` so
    /// the line stays four space separated tokens.
    pub fn to_outbound(&self) -> Outbound {
        let fields = [&self.name, &self.version, &self.platform, &self.client_id];
        let tokens: Vec<String> = fields.iter().map(|f| token(f)).collect();
        Outbound::Identity(tokens.join(" "))
    }
}

fn token(field: &str) -> String {
    let field = field.trim();
    if field.is_empty() {
        return "-".to_string();
    }
    field
        .chars()
        .map(|c| if c.is_whitespace() || c.is_control() { '-' } else { c })
        .collect()
}
