//! Connection lifecycle for the tether client.
//!
//! Resolves the endpoint with cache fallback, keeps one TCP link alive with
//! backoff reconnection and a heartbeat, dispatches inbound commands, and
//! drives the uploader over the same link.

pub mod dispatcher;
pub mod manager;
pub mod network;
mod pumps;
pub(crate) mod reconnection;
pub mod types;

pub use dispatcher::CommandDispatcher;
pub use manager::ConnectionManager;
pub use network::{ConnectivityProbe, InterfaceProbe, NETWORK_POLL_INTERVAL};
pub use types::{ClientIdentity, ConnectionEvent, ConnectionState, ManagerConfig, ReconnectConfig};
