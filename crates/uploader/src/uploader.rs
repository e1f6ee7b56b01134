//! Scan loop and upload bookkeeping.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use tether_channel::{ChannelError, ChannelWriter};
use tether_protocol::Outbound;
use tether_protocol::constants::{MAX_UPLOAD_BYTES, UPLOAD_BATCH_LIMIT, UPLOAD_INTERVAL};

use crate::source::{ItemSource, MediaItem};

/// Errors from a scan.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to list items: {0}")]
    List(#[from] std::io::Error),

    #[error("item listing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Uploader tuning.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Time between scans.
    pub interval: Duration,
    /// Maximum items sent per scan.
    pub batch_limit: usize,
    /// Items of this size or larger are skipped.
    pub max_item_bytes: u64,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            interval: UPLOAD_INTERVAL,
            batch_limit: UPLOAD_BATCH_LIMIT,
            max_item_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

/// Periodic uploader bound to at most one channel at a time.
///
/// The connection manager rebinds it on every new connection; items that
/// fail to send on a stale channel are retried on a later scan.
pub struct Uploader {
    shared: Arc<Shared>,
}

struct Shared {
    source: Arc<dyn ItemSource>,
    config: UploaderConfig,
    state: Mutex<UploaderState>,
    /// Serialises scans so two of them never pick the same item.
    scan_lock: Mutex<()>,
}

struct UploaderState {
    writer: Option<ChannelWriter>,
    uploaded: HashSet<String>,
    cancel: Option<CancellationToken>,
}

impl Uploader {
    pub fn new(source: Arc<dyn ItemSource>, config: UploaderConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                config,
                state: Mutex::new(UploaderState {
                    writer: None,
                    uploaded: HashSet::new(),
                    cancel: None,
                }),
                scan_lock: Mutex::new(()),
            }),
        }
    }

    /// Starts the scan loop. The first scan runs immediately.
    /// Does nothing if the loop is already running.
    pub async fn start(&self) {
        let mut state = self.shared.state.lock().await;
        if state.cancel.is_some() {
            debug!("uploader already running");
            return;
        }

        let cancel = CancellationToken::new();
        state.cancel = Some(cancel.clone());

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            scan_loop(shared, cancel).await;
        });

        info!(
            interval_secs = self.shared.config.interval.as_secs(),
            "uploader started"
        );
    }

    /// Stops the scan loop. Idempotent.
    pub async fn stop(&self) {
        let mut state = self.shared.state.lock().await;
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
            info!("uploader stopped");
        }
    }

    /// Stops and starts the loop, which also triggers an immediate scan.
    pub async fn restart(&self) {
        self.stop().await;
        self.start().await;
    }

    /// Returns `true` if the scan loop is running.
    pub async fn is_running(&self) -> bool {
        self.shared.state.lock().await.cancel.is_some()
    }

    /// Points subsequent writes at a new channel.
    ///
    /// Safe during a scan: the writer is snapshotted per item, so the next
    /// item goes to the new channel.
    pub async fn rebind(&self, writer: ChannelWriter) {
        debug!(channel = writer.id(), "uploader bound to channel");
        self.shared.state.lock().await.writer = Some(writer);
    }

    /// Drops the bound channel; scans are skipped until the next rebind.
    pub async fn unbind(&self) {
        if self.shared.state.lock().await.writer.take().is_some() {
            debug!("uploader unbound");
        }
    }

    /// Forgets every uploaded item so they are sent again.
    pub async fn clear_cache(&self) {
        let mut state = self.shared.state.lock().await;
        let n = state.uploaded.len();
        state.uploaded.clear();
        info!(cleared = n, "upload cache cleared");
    }

    /// Number of items uploaded since start or the last clear.
    pub async fn uploaded_count(&self) -> usize {
        self.shared.state.lock().await.uploaded.len()
    }

    /// Runs one scan now and returns how many items were sent.
    pub async fn scan_once(&self) -> Result<usize, UploadError> {
        scan(&self.shared).await
    }
}

async fn scan_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = scan(&shared).await {
                    warn!("scan failed: {e}");
                }
            }
        }
    }
}

async fn scan(shared: &Shared) -> Result<usize, UploadError> {
    let _scan = shared.scan_lock.lock().await;

    if shared.state.lock().await.writer.is_none() {
        trace!("no channel bound, skipping scan");
        return Ok(0);
    }

    let source = Arc::clone(&shared.source);
    let items = tokio::task::spawn_blocking(move || source.items()).await??;

    let mut sent = 0;
    for item in items {
        if sent >= shared.config.batch_limit {
            break;
        }
        if item.size >= shared.config.max_item_bytes {
            trace!(item = %item.name, size = item.size, "item too large, skipping");
            continue;
        }

        let writer = {
            let state = shared.state.lock().await;
            if state.uploaded.contains(&item.id) {
                continue;
            }
            state.writer.clone()
        };
        let Some(writer) = writer else {
            debug!("channel unbound mid-scan");
            break;
        };

        match send_item(&writer, &item).await {
            Ok(()) => {
                shared.state.lock().await.uploaded.insert(item.id.clone());
                sent += 1;
                debug!(item = %item.name, size = item.size, channel = writer.id(), "item uploaded");
            }
            Err(e) => {
                warn!(item = %item.name, channel = writer.id(), "upload failed: {e}");
                break;
            }
        }
    }

    if sent > 0 {
        info!(sent, "uploaded new items");
    }
    Ok(sent)
}

async fn send_item(writer: &ChannelWriter, item: &MediaItem) -> Result<(), ChannelError> {
    for line in Outbound::item_frame(&item.name, item.size, &item.location) {
        writer.send(&line).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncBufReadExt, BufReader, Lines};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use tether_channel::Channel;

    const WAIT: Duration = Duration::from_secs(5);

    struct MemorySource {
        items: Vec<MediaItem>,
        calls: AtomicUsize,
    }

    impl MemorySource {
        fn new(items: Vec<MediaItem>) -> Arc<Self> {
            Arc::new(Self {
                items,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl ItemSource for MemorySource {
        fn items(&self) -> std::io::Result<Vec<MediaItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.items.clone())
        }
    }

    fn item(n: usize, size: u64) -> MediaItem {
        MediaItem {
            id: format!("/media/IMG_{n:04}.jpg"),
            name: format!("IMG_{n:04}.jpg"),
            size,
            location: format!("/media/IMG_{n:04}.jpg"),
        }
    }

    async fn pair() -> (Channel, Lines<BufReader<TcpStream>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (
            Channel::from_stream(client.unwrap()),
            BufReader::new(server.unwrap().0).lines(),
        )
    }

    async fn read_lines(lines: &mut Lines<BufReader<TcpStream>>, n: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let line = tokio::time::timeout(WAIT, lines.next_line())
                .await
                .expect("timed out waiting for line")
                .unwrap()
                .expect("unexpected EOF");
            out.push(line);
        }
        out
    }

    #[tokio::test]
    async fn second_scan_sends_nothing_new() {
        let source = MemorySource::new(vec![item(1, 100), item(2, 200), item(3, 300)]);
        let uploader = Uploader::new(source, UploaderConfig::default());
        let (channel, mut server) = pair().await;
        uploader.rebind(channel.writer()).await;

        assert_eq!(uploader.scan_once().await.unwrap(), 3);
        assert_eq!(uploader.scan_once().await.unwrap(), 0);
        assert_eq!(uploader.uploaded_count().await, 3);

        let lines = read_lines(&mut server, 12).await;
        assert_eq!(
            &lines[..4],
            &[
                "[PHOTO_START]",
                "[PHOTO_NAME] IMG_0001.jpg",
                "[PHOTO_SIZE] 100",
                "[PHOTO_DATA] 100 bytes from /media/IMG_0001.jpg",
            ]
        );
        assert_eq!(lines[5], "[PHOTO_NAME] IMG_0002.jpg");
        assert_eq!(lines[9], "[PHOTO_NAME] IMG_0003.jpg");
    }

    #[tokio::test]
    async fn batch_limit_spreads_items_over_scans() {
        let source = MemorySource::new((1..=7).map(|n| item(n, 10)).collect());
        let uploader = Uploader::new(source, UploaderConfig::default());
        let (channel, _server) = pair().await;
        uploader.rebind(channel.writer()).await;

        assert_eq!(uploader.scan_once().await.unwrap(), 5);
        assert_eq!(uploader.scan_once().await.unwrap(), 2);
        assert_eq!(uploader.scan_once().await.unwrap(), 0);
        assert_eq!(uploader.uploaded_count().await, 7);
    }

    #[tokio::test]
    async fn size_ceiling_is_exclusive() {
        let max = UploaderConfig::default().max_item_bytes;
        let source = MemorySource::new(vec![item(1, max), item(2, max - 1), item(3, max + 1)]);
        let uploader = Uploader::new(source, UploaderConfig::default());
        let (channel, mut server) = pair().await;
        uploader.rebind(channel.writer()).await;

        assert_eq!(uploader.scan_once().await.unwrap(), 1);
        let lines = read_lines(&mut server, 4).await;
        assert_eq!(lines[1], "[PHOTO_NAME] IMG_0002.jpg");
    }

    #[tokio::test]
    async fn unbound_scan_is_skipped() {
        let source = MemorySource::new(vec![item(1, 10)]);
        let uploader = Uploader::new(source.clone(), UploaderConfig::default());

        assert_eq!(uploader.scan_once().await.unwrap(), 0);
        assert_eq!(uploader.uploaded_count().await, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_channel_fails_harmlessly_until_rebind() {
        let source = MemorySource::new(vec![item(1, 10), item(2, 10)]);
        let uploader = Uploader::new(source, UploaderConfig::default());

        let (old, _old_server) = pair().await;
        uploader.rebind(old.writer()).await;
        old.close();

        assert_eq!(uploader.scan_once().await.unwrap(), 0);
        assert_eq!(uploader.uploaded_count().await, 0);

        let (fresh, mut server) = pair().await;
        uploader.rebind(fresh.writer()).await;
        assert_eq!(uploader.scan_once().await.unwrap(), 2);
        read_lines(&mut server, 8).await;
    }

    #[tokio::test]
    async fn unbind_stops_uploads() {
        let source = MemorySource::new(vec![item(1, 10)]);
        let uploader = Uploader::new(source, UploaderConfig::default());
        let (channel, _server) = pair().await;
        uploader.rebind(channel.writer()).await;
        uploader.unbind().await;
        uploader.unbind().await;

        assert_eq!(uploader.scan_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_cache_resends() {
        let source = MemorySource::new(vec![item(1, 10)]);
        let uploader = Uploader::new(source, UploaderConfig::default());
        let (channel, _server) = pair().await;
        uploader.rebind(channel.writer()).await;

        assert_eq!(uploader.scan_once().await.unwrap(), 1);
        uploader.clear_cache().await;
        assert_eq!(uploader.uploaded_count().await, 0);
        assert_eq!(uploader.scan_once().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn start_scans_immediately_and_stop_is_idempotent() {
        let source = MemorySource::new(vec![item(1, 10)]);
        let config = UploaderConfig {
            interval: Duration::from_secs(3600),
            ..UploaderConfig::default()
        };
        let uploader = Uploader::new(source, config);
        let (channel, mut server) = pair().await;
        uploader.rebind(channel.writer()).await;

        uploader.start().await;
        uploader.start().await;
        assert!(uploader.is_running().await);

        let lines = read_lines(&mut server, 4).await;
        assert_eq!(lines[0], "[PHOTO_START]");

        uploader.stop().await;
        uploader.stop().await;
        assert!(!uploader.is_running().await);
    }

    #[tokio::test]
    async fn listing_errors_are_reported() {
        struct Broken;
        impl ItemSource for Broken {
            fn items(&self) -> std::io::Result<Vec<MediaItem>> {
                Err(std::io::Error::other("media store offline"))
            }
        }

        let uploader = Uploader::new(Arc::new(Broken), UploaderConfig::default());
        let (channel, _server) = pair().await;
        uploader.rebind(channel.writer()).await;

        assert!(matches!(
            uploader.scan_once().await,
            Err(UploadError::List(_))
        ));
    }
}
