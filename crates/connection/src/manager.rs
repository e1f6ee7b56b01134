//! Connection manager orchestrating the link lifecycle.
//!
//! Resolves the endpoint (falling back to the cached one), keeps a single
//! TCP link open, answers server commands, drives the uploader on the same
//! link, and reconnects with exponential backoff when the link drops.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_endpoint::{ConfigResolver, ConfigStore};
use tether_uploader::Uploader;

use crate::network::{ConnectivityProbe, watch_network};
use crate::pumps::heartbeat::heartbeat_pump;
use crate::reconnection::{LinkContext, Trigger, connection_worker};
use crate::types::{ClientIdentity, ConnectionEvent, ConnectionState, ManagerConfig};

/// Time `shutdown` waits for the worker to finish.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// Keeps one long-lived link to the resolved endpoint.
pub struct ConnectionManager {
    ctx: Arc<LinkContext>,
    trigger_rx: std::sync::Mutex<Option<mpsc::Receiver<Trigger>>>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
}

impl ConnectionManager {
    /// Creates a manager in [`ConnectionState::Idle`]. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(
        identity: ClientIdentity,
        config: ManagerConfig,
        resolver: Arc<dyn ConfigResolver>,
        store: Arc<dyn ConfigStore>,
        uploader: Arc<Uploader>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (events_tx, events_rx) = mpsc::channel(64);
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        Self {
            ctx: Arc::new(LinkContext {
                identity,
                config,
                resolver,
                store,
                uploader,
                state_tx,
                attempts: AtomicU32::new(0),
                link: std::sync::Mutex::new(None),
                events_tx,
                trigger_tx,
                cancel: CancellationToken::new(),
            }),
            trigger_rx: std::sync::Mutex::new(Some(trigger_rx)),
            worker: std::sync::Mutex::new(None),
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Spawns the connection worker and the heartbeat. Later calls do nothing.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self) {
        if self.ctx.cancel.is_cancelled() {
            return;
        }
        let Some(triggers) = self
            .trigger_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            debug!("connection manager already started");
            return;
        };

        let worker = tokio::spawn(connection_worker(self.ctx.clone(), triggers));
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);

        tokio::spawn(heartbeat_pump(
            self.ctx.clone(),
            self.ctx.config.heartbeat_interval,
            self.ctx.cancel.child_token(),
        ));

        info!(
            heartbeat_secs = self.ctx.config.heartbeat_interval.as_secs(),
            "connection manager started"
        );
    }

    /// Polls `probe` every `period` and calls
    /// [`notify_network_available`](Self::notify_network_available) whenever
    /// connectivity comes back. Stops on shutdown.
    pub fn watch_network(&self, probe: Arc<dyn ConnectivityProbe>, period: Duration) {
        if self.ctx.cancel.is_cancelled() {
            return;
        }
        let ctx = self.ctx.clone();
        tokio::spawn(watch_network(
            probe,
            period,
            self.ctx.cancel.child_token(),
            move || ctx.trigger(Trigger::NetworkAvailable),
        ));
    }

    /// Asks for a connect. No-op unless idle or disconnected.
    pub fn request_connect(&self) {
        self.ctx.trigger(Trigger::Connect);
    }

    /// Signals that connectivity came back. Skips any remaining backoff
    /// wait without resetting the attempt counter. No-op unless idle or
    /// disconnected.
    pub fn notify_network_available(&self) {
        self.ctx.trigger(Trigger::NetworkAvailable);
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx.lock().await.take()
    }

    pub fn state(&self) -> ConnectionState {
        self.ctx.state()
    }

    /// Returns a receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.ctx.state_tx.subscribe()
    }

    /// Consecutive failed connect cycles.
    pub fn attempts(&self) -> u32 {
        self.ctx.attempts.load(Ordering::Acquire)
    }

    /// Stops everything: backoff waits, heartbeat, network watcher,
    /// uploader and the live link. Idempotent.
    pub async fn shutdown(&self) {
        if !self.ctx.set_state(ConnectionState::ShuttingDown) {
            return;
        }
        self.ctx.cancel.cancel();
        self.ctx.drop_link(None);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker
            && tokio::time::timeout(SHUTDOWN_WAIT, worker).await.is_err()
        {
            warn!("connection worker did not stop in time");
        }

        self.ctx.uploader.stop().await;
        self.ctx.uploader.unbind().await;
        info!("connection manager shut down");
    }
}
