//! Error types for the channel.

/// Errors produced by the TCP channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection timed out")]
    Timeout,

    #[error("channel closed")]
    Closed,

    #[error("inbound line exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("outbound line contains a line break")]
    InvalidLine,
}
