//! Connection worker: resolve, connect, read, back off.
//!
//! Contains the shared [`LinkContext`] and the single worker task that owns
//! every connect attempt. Public entry points only enqueue triggers; the
//! worker is the only place a socket is opened.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use tether_channel::{Channel, ChannelWriter};
use tether_endpoint::{ConfigResolver, ConfigStore};
use tether_protocol::Endpoint;
use tether_uploader::Uploader;

use crate::dispatcher::CommandDispatcher;
use crate::pumps::read::{DisconnectReason, read_loop};
use crate::types::{ClientIdentity, ConnectionEvent, ConnectionState, ManagerConfig};

/// Why the worker was asked to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    Connect,
    NetworkAvailable,
}

/// Shared state of one manager, handed to the worker and the pumps.
pub(crate) struct LinkContext {
    pub(crate) identity: ClientIdentity,
    pub(crate) config: ManagerConfig,
    pub(crate) resolver: Arc<dyn ConfigResolver>,
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) uploader: Arc<Uploader>,
    pub(crate) state_tx: watch::Sender<ConnectionState>,
    /// Consecutive failed connect cycles.
    pub(crate) attempts: AtomicU32,
    /// Writer of the live channel. Cleared and closed under this lock.
    pub(crate) link: std::sync::Mutex<Option<ChannelWriter>>,
    pub(crate) events_tx: mpsc::Sender<ConnectionEvent>,
    pub(crate) trigger_tx: mpsc::Sender<Trigger>,
    pub(crate) cancel: CancellationToken,
}

impl LinkContext {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Publishes `next` unless it is already current or the manager is
    /// shutting down. Returns whether the state changed.
    pub(crate) fn set_state(&self, next: ConnectionState) -> bool {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == next || *current == ConnectionState::ShuttingDown {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(state = %next, "connection state changed");
            self.emit(ConnectionEvent::StateChanged(next));
        }
        changed
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            trace!("connection event dropped: {e}");
        }
    }

    /// Wakes the worker if it is idle, parked, or backing off.
    ///
    /// The state check and the enqueue happen under the watch read lock, and
    /// the worker publishes `Connecting` before draining the queue, so a
    /// trigger can never start a second attempt.
    pub(crate) fn trigger(&self, trigger: Trigger) {
        let state = self.state_tx.borrow();
        match *state {
            ConnectionState::Idle | ConnectionState::Disconnected => {
                match self.trigger_tx.try_send(trigger) {
                    Ok(()) => debug!(?trigger, "connect triggered"),
                    Err(_) => trace!(?trigger, "connect already pending"),
                }
            }
            current => trace!(?trigger, state = %current, "trigger ignored"),
        }
    }

    fn link(&self) -> MutexGuard<'_, Option<ChannelWriter>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the live writer.
    pub(crate) fn current_writer(&self) -> Option<ChannelWriter> {
        self.link().clone()
    }

    pub(crate) fn publish_link(&self, writer: ChannelWriter) {
        *self.link() = Some(writer);
    }

    /// Clears and closes the live link. With `only` set, does nothing unless
    /// the live link has that id. Returns whether a link was dropped.
    pub(crate) fn drop_link(&self, only: Option<u64>) -> bool {
        let mut link = self.link();
        let matches = match (link.as_ref(), only) {
            (Some(writer), Some(id)) => writer.id() == id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            return false;
        }
        match link.take() {
            Some(writer) => {
                writer.close();
                debug!(channel = writer.id(), "link dropped");
                true
            }
            None => false,
        }
    }

    /// Resolves the endpoint, falling back to the cache.
    ///
    /// A fresh endpoint replaces the cache. Returns `None` when neither
    /// source has one.
    async fn resolve_endpoint(&self) -> Option<Endpoint> {
        match self.resolver.resolve().await {
            Ok(endpoint) => {
                if let Err(e) = self.store.save(&endpoint) {
                    warn!(%endpoint, "failed to cache endpoint: {e}");
                }
                info!(%endpoint, "endpoint resolved");
                self.emit(ConnectionEvent::EndpointResolved {
                    endpoint: endpoint.clone(),
                    from_cache: false,
                });
                Some(endpoint)
            }
            Err(e) => {
                warn!("endpoint resolution failed: {e}");
                match self.store.load() {
                    Ok(Some(endpoint)) => {
                        info!(%endpoint, "using cached endpoint");
                        self.emit(ConnectionEvent::EndpointResolved {
                            endpoint: endpoint.clone(),
                            from_cache: true,
                        });
                        Some(endpoint)
                    }
                    Ok(None) => None,
                    Err(e) => {
                        warn!("cached endpoint unreadable: {e}");
                        None
                    }
                }
            }
        }
    }
}

/// What the worker does after a connect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    /// Wait for an external trigger.
    Park,
    /// Wait out the backoff delay, unless a trigger arrives first.
    Backoff,
}

/// The connection worker. Runs until shutdown.
pub(crate) async fn connection_worker(ctx: Arc<LinkContext>, mut triggers: mpsc::Receiver<Trigger>) {
    let dispatcher = CommandDispatcher::new(ctx.uploader.clone(), ctx.state_tx.subscribe());
    let mut next = Next::Park;

    loop {
        match next {
            Next::Park => {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    trigger = triggers.recv() => match trigger {
                        Some(trigger) => debug!(?trigger, "worker woken"),
                        None => break,
                    },
                }
            }
            Next::Backoff => {
                let attempt = ctx.attempts.load(Ordering::Acquire);
                let delay = ctx
                    .config
                    .reconnect
                    .delay_for_attempt(attempt.saturating_sub(1));
                ctx.emit(ConnectionEvent::Reconnecting { attempt, delay });
                info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting"
                );

                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                    Some(trigger) = triggers.recv() => {
                        debug!(?trigger, "backoff cut short");
                    }
                }
            }
        }

        if ctx.cancel.is_cancelled() {
            break;
        }
        next = connect_cycle(&ctx, &dispatcher, &mut triggers).await;
    }

    debug!("connection worker stopped");
}

async fn connect_cycle(
    ctx: &LinkContext,
    dispatcher: &CommandDispatcher,
    triggers: &mut mpsc::Receiver<Trigger>,
) -> Next {
    if !ctx.set_state(ConnectionState::Connecting) {
        return Next::Park;
    }
    // Triggers queued before `Connecting` was visible are stale now.
    while triggers.try_recv().is_ok() {}

    let resolved = tokio::select! {
        _ = ctx.cancel.cancelled() => return Next::Park,
        resolved = ctx.resolve_endpoint() => resolved,
    };
    let Some(endpoint) = resolved else {
        let attempt = ctx.attempts.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        warn!(attempt, "no endpoint available, waiting for a trigger");
        ctx.set_state(ConnectionState::Disconnected);
        return Next::Park;
    };

    let connected = tokio::select! {
        _ = ctx.cancel.cancelled() => return Next::Park,
        connected = Channel::connect(&endpoint, ctx.config.connect_timeout) => connected,
    };
    let channel = match connected {
        Ok(channel) => channel,
        Err(e) => {
            let attempt = ctx.attempts.fetch_add(1, Ordering::AcqRel).saturating_add(1);
            warn!(%endpoint, attempt, "connect failed: {e}");
            ctx.set_state(ConnectionState::Disconnected);
            return Next::Backoff;
        }
    };

    run_session(ctx, dispatcher, channel, &endpoint).await;
    Next::Backoff
}

/// Drives one established link until it ends, then tears it down.
///
/// The identity line goes out before the link is published, so it is
/// always the first line the server sees.
async fn run_session(
    ctx: &LinkContext,
    dispatcher: &CommandDispatcher,
    mut channel: Channel,
    endpoint: &Endpoint,
) {
    let writer = channel.writer();
    if let Err(e) = writer.send(&ctx.identity.to_outbound()).await {
        let attempt = ctx.attempts.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        warn!(%endpoint, attempt, "failed to send identity: {e}");
        channel.close();
        ctx.set_state(ConnectionState::Disconnected);
        return;
    }

    ctx.attempts.store(0, Ordering::Release);
    ctx.publish_link(writer.clone());
    if !ctx.set_state(ConnectionState::Connected) {
        ctx.drop_link(Some(channel.id()));
        return;
    }
    info!(%endpoint, channel = channel.id(), "connected");

    ctx.uploader.rebind(writer).await;
    ctx.uploader.start().await;
    let reason = read_loop(&mut channel, dispatcher, &ctx.cancel).await;

    ctx.drop_link(Some(channel.id()));
    channel.close();
    ctx.uploader.unbind().await;
    ctx.set_state(ConnectionState::Disconnected);

    match reason {
        DisconnectReason::Shutdown => debug!(channel = channel.id(), "session ended: {reason}"),
        _ => info!(%endpoint, channel = channel.id(), "disconnected: {reason}"),
    }
}
