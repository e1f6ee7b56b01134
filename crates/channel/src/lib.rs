//! Line-oriented TCP channel.
//!
//! A [`Channel`] owns the read half of the connection as a framed line
//! stream. Writes go through a single write pump task and are issued via
//! cheap [`ChannelWriter`] handles, so the heartbeat, the dispatcher and the
//! uploader can all write to the same socket without sharing the stream.

pub mod channel;
pub mod error;
mod pump;

pub use channel::{Channel, ChannelWriter};
pub use error::ChannelError;

#[cfg(test)]
pub(crate) mod testutil {
    use tokio::net::{TcpListener, TcpStream};

    use crate::Channel;

    /// Returns a connected client channel and the raw server-side stream.
    pub(crate) async fn pair() -> (Channel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (Channel::from_stream(client.unwrap()), server.unwrap().0)
    }
}
