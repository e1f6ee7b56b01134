use std::time::Duration;

/// Time allowed to establish the TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Time allowed for the remote endpoint lookup.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed to write and flush a single line.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// How often the client sends its own keep-alive line.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

/// First reconnect delay.
pub const BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Upper bound for the reconnect delay.
pub const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// How often the uploader scans its item source.
pub const UPLOAD_INTERVAL: Duration = Duration::from_secs(60);

/// Maximum number of items sent per scan.
pub const UPLOAD_BATCH_LIMIT: usize = 5;

/// Items of this size or larger are never sent (5 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Longest inbound line accepted before the link is dropped (64 KiB).
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Keep-alive marker. Sent by the client on every heartbeat tick and
/// accepted from the server as a ping.
pub const HEARTBEAT_MARKER: &str = "[HEARTBEAT]";

/// Server ping marker.
pub const PING_MARKER: &str = "[PING]";

/// Reply to a ping or server heartbeat.
pub const PONG_MARKER: &str = "[PONG]";

pub const OK_PREFIX: &str = "[OK]";
pub const STATUS_PREFIX: &str = "[STATUS]";
pub const CLIENT_PREFIX: &str = "[CLIENT]";

pub const PHOTO_START: &str = "[PHOTO_START]";
pub const PHOTO_NAME: &str = "[PHOTO_NAME]";
pub const PHOTO_SIZE: &str = "[PHOTO_SIZE]";
pub const PHOTO_DATA: &str = "[PHOTO_DATA]";
