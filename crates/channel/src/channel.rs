//! TCP channel and its writer handles.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::BufWriter;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tether_protocol::Endpoint;
use tether_protocol::Outbound;
use tether_protocol::constants::{MAX_LINE_LENGTH, WRITE_WAIT};

use crate::error::ChannelError;
use crate::pump::{WriteRequest, write_pump};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// An established duplex link.
///
/// The owner reads lines with [`next_line`](Self::next_line); any number of
/// [`ChannelWriter`] snapshots may write concurrently.
pub struct Channel {
    lines: FramedRead<OwnedReadHalf, LinesCodec>,
    writer: ChannelWriter,
    peer: Option<SocketAddr>,
}

impl Channel {
    /// Opens a TCP connection to `endpoint`, giving up after `timeout`.
    pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Self, ChannelError> {
        let connect = TcpStream::connect((endpoint.host(), endpoint.port()));
        let stream = match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ChannelError::Timeout),
        };
        let channel = Self::from_stream(stream);
        info!(%endpoint, id = channel.id(), "channel connected");
        Ok(channel)
    }

    /// Wraps an already connected stream and spawns its write pump.
    pub fn from_stream(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        let peer = stream.peer_addr().ok();
        let (read, write) = stream.into_split();

        let cancel = CancellationToken::new();
        let (write_tx, write_rx) = mpsc::channel(64);
        tokio::spawn(write_pump(
            BufWriter::new(write),
            write_rx,
            WRITE_WAIT,
            cancel.clone(),
        ));

        let writer = ChannelWriter {
            inner: Arc::new(WriterInner {
                id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
                write_tx,
                cancel,
                closed: AtomicBool::new(false),
            }),
        };

        Self {
            lines: FramedRead::new(read, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
            writer,
            peer,
        }
    }

    /// Unique id of this channel.
    pub fn id(&self) -> u64 {
        self.writer.id()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Returns a writer handle for this channel.
    pub fn writer(&self) -> ChannelWriter {
        self.writer.clone()
    }

    /// Waits for the next inbound line.
    ///
    /// Returns `Ok(None)` when the peer closed the connection and
    /// `Err(ChannelError::Closed)` once the channel was closed locally.
    pub async fn next_line(&mut self) -> Result<Option<String>, ChannelError> {
        if self.writer.is_closed() {
            return Err(ChannelError::Closed);
        }
        tokio::select! {
            biased;
            _ = self.writer.inner.cancel.cancelled() => Err(ChannelError::Closed),
            item = self.lines.next() => match item {
                Some(Ok(line)) => Ok(Some(line)),
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    Err(ChannelError::LineTooLong { max: MAX_LINE_LENGTH })
                }
                Some(Err(LinesCodecError::Io(e))) => Err(e.into()),
                None => Ok(None),
            },
        }
    }

    /// Closes the channel. Idempotent.
    pub fn close(&self) {
        self.writer.close();
    }
}

struct WriterInner {
    id: u64,
    write_tx: mpsc::Sender<WriteRequest>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

/// Cloneable write handle onto a [`Channel`].
///
/// Handles outlive the channel harmlessly: once it is closed every write
/// fails with [`ChannelError::Closed`].
#[derive(Clone)]
pub struct ChannelWriter {
    inner: Arc<WriterInner>,
}

impl ChannelWriter {
    /// Id of the channel this handle writes to.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Writes one protocol line.
    pub async fn send(&self, msg: &Outbound) -> Result<(), ChannelError> {
        self.send_line(&msg.to_string()).await
    }

    /// Writes `line` followed by a newline and waits until it is flushed.
    pub async fn send_line(&self, line: &str) -> Result<(), ChannelError> {
        if line.contains(['\n', '\r']) {
            return Err(ChannelError::InvalidLine);
        }
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let (ack, done) = oneshot::channel();
        let request = WriteRequest {
            line: line.to_string(),
            ack,
        };
        let write = async {
            self.inner
                .write_tx
                .send(request)
                .await
                .map_err(|_| ChannelError::Closed)?;
            match done.await {
                Ok(result) => result.map_err(ChannelError::from),
                Err(_) => Err(ChannelError::Closed),
            }
        };

        match tokio::time::timeout(WRITE_WAIT, write).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout),
        }
    }

    /// Closes the underlying channel: stops the write pump, half-closes the
    /// socket and wakes the reader. Second and later calls do nothing.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.cancel.cancel();
        debug!(id = self.inner.id, "channel closed");
    }
}

impl std::fmt::Debug for ChannelWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelWriter")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
