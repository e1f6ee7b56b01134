//! Write pump: serialises outbound lines onto the socket.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Grace period for the half-close after the pump stops.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(1);

/// A single line to write, with a slot for the outcome.
pub(crate) struct WriteRequest {
    pub(crate) line: String,
    pub(crate) ack: oneshot::Sender<std::io::Result<()>>,
}

/// Writes queued lines until cancelled or every writer handle is gone,
/// then half-closes the socket.
pub(crate) async fn write_pump<W>(
    mut write: W,
    mut write_rx: mpsc::Receiver<WriteRequest>,
    write_wait: Duration,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            req = write_rx.recv() => {
                let Some(req) = req else { break };
                let result = match tokio::time::timeout(write_wait, write_line(&mut write, &req.line)).await {
                    Ok(r) => r,
                    Err(_) => Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "write timed out",
                    )),
                };
                match &result {
                    Ok(()) => trace!(line = %req.line, "line written"),
                    Err(e) => warn!("channel write error: {e}"),
                }
                let _ = req.ack.send(result);
            }
        }
    }

    let _ = tokio::time::timeout(SHUTDOWN_WAIT, write.shutdown()).await;
}

async fn write_line<W: AsyncWrite + Unpin>(write: &mut W, line: &str) -> std::io::Result<()> {
    write.write_all(line.as_bytes()).await?;
    write.write_all(b"\n").await?;
    write.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_pump_appends_newline_and_acks() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(write_pump(client, rx, Duration::from_secs(1), cancel.clone()));

        let (ack, done) = oneshot::channel();
        tx.send(WriteRequest {
            line: "[PONG]".into(),
            ack,
        })
        .await
        .unwrap();
        done.await.unwrap().unwrap();

        let mut buf = [0u8; 7];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut buf)
            .await
            .unwrap();
        assert_eq!(&buf, b"[PONG]\n");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }

    #[tokio::test]
    async fn write_pump_stops_when_writers_are_gone() {
        let (client, _server) = tokio::io::duplex(64);
        let (tx, rx) = mpsc::channel::<WriteRequest>(4);
        let handle = tokio::spawn(write_pump(
            client,
            rx,
            Duration::from_secs(1),
            CancellationToken::new(),
        ));

        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }
}
