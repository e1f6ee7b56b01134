//! Endpoint resolution for the tether client.
//!
//! [`ConfigResolver`] fetches a fresh `host:port` from a remote source;
//! [`ConfigStore`] keeps the last one that worked so the client can still
//! connect when the source is unreachable.

pub mod resolver;
pub mod store;

pub use resolver::{ConfigResolver, HttpResolver, ResolutionError, ResolveFuture, StaticResolver};
pub use store::{ConfigStore, FileStore, StoreError, default_cache_path};
