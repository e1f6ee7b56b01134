//! Heartbeat pump: periodic keep-alive on the current link.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use tether_protocol::Outbound;

use crate::reconnection::LinkContext;
use crate::types::ConnectionState;

/// Sends `[HEARTBEAT]` every `period` while connected. A failed write
/// drops the link so the worker reconnects.
pub(crate) async fn heartbeat_pump(
    ctx: Arc<LinkContext>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => beat(&ctx).await,
        }
    }
}

async fn beat(ctx: &LinkContext) {
    if ctx.state() != ConnectionState::Connected {
        trace!("heartbeat skipped, not connected");
        return;
    }
    let Some(writer) = ctx.current_writer() else {
        return;
    };

    if let Err(e) = writer.send(&Outbound::Heartbeat).await {
        warn!(channel = writer.id(), "heartbeat failed: {e}");
        ctx.drop_link(Some(writer.id()));
    } else {
        trace!(channel = writer.id(), "heartbeat sent");
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    use tether_channel::Channel;

    use super::*;
    use crate::reconnection::test_support::context;

    const WAIT: Duration = Duration::from_secs(5);

    async fn channel() -> (Channel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (Channel::from_stream(client.unwrap()), server.unwrap().0)
    }

    #[tokio::test]
    async fn beats_on_the_live_link() {
        let (ctx, _triggers, _events) = context();
        let (channel, server) = channel().await;
        ctx.publish_link(channel.writer());
        ctx.set_state(ConnectionState::Connected);

        let cancel = CancellationToken::new();
        let pump = tokio::spawn(heartbeat_pump(
            ctx.clone(),
            Duration::from_millis(20),
            cancel.clone(),
        ));

        let mut lines = BufReader::new(server).lines();
        for _ in 0..2 {
            let line = tokio::time::timeout(WAIT, lines.next_line())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(line.as_deref(), Some("[HEARTBEAT]"));
        }

        cancel.cancel();
        tokio::time::timeout(WAIT, pump).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failed_beat_drops_the_link() {
        let (ctx, _triggers, _events) = context();
        let (channel, _server) = channel().await;
        let writer = channel.writer();
        ctx.publish_link(writer.clone());
        ctx.set_state(ConnectionState::Connected);

        // A closed writer still published as current fails every write.
        writer.close();
        ctx.publish_link(writer);

        beat(&ctx).await;
        assert!(ctx.current_writer().is_none());
    }

    #[tokio::test]
    async fn skipped_while_not_connected() {
        let (ctx, _triggers, _events) = context();
        let (channel, _server) = channel().await;
        let writer = channel.writer();
        ctx.publish_link(writer.clone());
        writer.close();

        beat(&ctx).await;
        assert!(ctx.current_writer().is_some());
    }
}
