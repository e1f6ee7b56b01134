//! Read loop: one inbound line at a time into the dispatcher.

use tokio_util::sync::CancellationToken;
use tracing::trace;

use tether_channel::{Channel, ChannelError};

use crate::dispatcher::CommandDispatcher;

/// Why a session ended.
#[derive(Debug, thiserror::Error)]
pub(crate) enum DisconnectReason {
    #[error("peer closed the connection")]
    Eof,

    #[error("link dropped locally")]
    Dropped,

    #[error("read failed: {0}")]
    Read(ChannelError),

    #[error("shutting down")]
    Shutdown,
}

/// Reads and dispatches lines until the link ends.
pub(crate) async fn read_loop(
    channel: &mut Channel,
    dispatcher: &CommandDispatcher,
    cancel: &CancellationToken,
) -> DisconnectReason {
    let writer = channel.writer();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return DisconnectReason::Shutdown,
            next = channel.next_line() => next,
        };

        match next {
            Ok(Some(line)) => {
                trace!(channel = writer.id(), line = %line, "received line");
                dispatcher.dispatch(&line, &writer).await;
            }
            Ok(None) => return DisconnectReason::Eof,
            Err(ChannelError::Closed) => return DisconnectReason::Dropped,
            Err(e) => return DisconnectReason::Read(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::watch;

    use tether_uploader::{ItemSource, MediaItem, Uploader, UploaderConfig};

    use super::*;
    use crate::types::ConnectionState;

    const WAIT: Duration = Duration::from_secs(5);

    struct Empty;

    impl ItemSource for Empty {
        fn items(&self) -> std::io::Result<Vec<MediaItem>> {
            Ok(Vec::new())
        }
    }

    async fn setup() -> (Channel, TcpStream, CommandDispatcher) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let uploader = Arc::new(Uploader::new(Arc::new(Empty), UploaderConfig::default()));
        let (_tx, rx) = watch::channel(ConnectionState::Connected);
        (
            Channel::from_stream(client.unwrap()),
            server.unwrap().0,
            CommandDispatcher::new(uploader, rx),
        )
    }

    #[tokio::test]
    async fn answers_until_eof() {
        let (mut channel, server, dispatcher) = setup().await;
        let cancel = CancellationToken::new();
        let (read, mut write) = server.into_split();

        write.write_all(b"[PING]\nstatus\n").await.unwrap();
        write.shutdown().await.unwrap();

        let reason = tokio::time::timeout(WAIT, read_loop(&mut channel, &dispatcher, &cancel))
            .await
            .unwrap();
        assert!(matches!(reason, DisconnectReason::Eof));

        let mut lines = BufReader::new(read).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "[PONG]");
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "[STATUS] Connected"
        );
    }

    #[tokio::test]
    async fn local_close_ends_the_loop() {
        let (mut channel, _server, dispatcher) = setup().await;
        let cancel = CancellationToken::new();
        let writer = channel.writer();

        let handle = tokio::spawn(async move {
            read_loop(&mut channel, &dispatcher, &cancel).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        writer.close();

        let reason = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(matches!(reason, DisconnectReason::Dropped));
    }

    #[tokio::test]
    async fn cancellation_ends_the_loop() {
        let (mut channel, _server, dispatcher) = setup().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let reason = tokio::time::timeout(WAIT, read_loop(&mut channel, &dispatcher, &cancel))
            .await
            .unwrap();
        assert!(matches!(reason, DisconnectReason::Shutdown));
    }
}
