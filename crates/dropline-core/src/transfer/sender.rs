//! Outbound endpoint: pushes one local file to a listening peer.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::{Error, ErrorKind, Result};
use crate::file::{self, format_size};
use crate::history::TransferStore;
use crate::protocol::{self, Ack, Handshake};

use super::events::TransferSink;
use super::progress::ProgressTracker;
use super::record::{Transfer, TransferDirection, TransferStatus};
use super::{configure_tcp_keepalive, persist_status, record_new};

/// Settings for the sending endpoint.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Bound on establishing the TCP connection
    pub connect_timeout: Duration,
    /// Bound on each wait for an acknowledgment
    pub read_timeout: Duration,
    /// Chunk size for reading and writing file bytes
    pub buffer_size: usize,
    /// Refuse to send files larger than this
    pub max_file_size: Option<u64>,
    /// Username announced in the handshake
    pub username: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            connect_timeout: crate::DEFAULT_CONNECT_TIMEOUT,
            read_timeout: crate::DEFAULT_READ_TIMEOUT,
            buffer_size: crate::DEFAULT_BUFFER_SIZE,
            max_file_size: Some(crate::DEFAULT_MAX_FILE_SIZE),
            username: String::from("anonymous"),
        }
    }
}

/// Result of a spawned send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// The record in its terminal state
    pub transfer: Transfer,
    /// Whether the receiver acknowledged success
    pub success: bool,
}

/// Sending endpoint.
///
/// Cloning is cheap; clones share the store and the sink.
#[derive(Clone)]
pub struct Sender {
    config: SenderConfig,
    store: Arc<dyn TransferStore>,
    sink: Arc<dyn TransferSink>,
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Sender {
    /// Create a sender reporting to `sink` and recording into `store`.
    #[must_use]
    pub fn new(
        config: SenderConfig,
        store: Arc<dyn TransferStore>,
        sink: Arc<dyn TransferSink>,
    ) -> Self {
        Self {
            config,
            store,
            sink,
        }
    }

    /// Sender configuration.
    #[must_use]
    pub const fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Send `path` to `host:port`, driving `transfer` to a terminal status.
    ///
    /// `transfer` must be `Pending` and declare the size of `path`. The host
    /// is resolved before the record is first written, so the stored entry
    /// carries the peer address. Every failure is reported through the sink;
    /// the return value only says whether the receiver answered `SUCCESS`.
    /// `on_transfer_complete` fires exactly once either way.
    pub async fn send(&self, path: &Path, host: &str, port: u16, transfer: &mut Transfer) -> bool {
        self.sink
            .on_log_line(&format!("Connecting to peer: {host}:{port}"));
        self.sink.on_progress(0, "Connecting to peer...");

        let resolved = resolve(host, port, self.config.connect_timeout).await;
        if let (Ok(peer), None) = (&resolved, transfer.peer_ip()) {
            if let Some(first) = peer.first() {
                transfer.set_peer_ip(first.ip());
            }
        }
        if transfer.id().is_none() {
            record_new(self.store.as_ref(), transfer);
        }

        let result = self.try_send(path, resolved, transfer).await;

        let success = match &result {
            Ok(()) => {
                tracing::info!(file = transfer.file_name(), %host, port, "File sent");
                self.sink
                    .on_log_line(&format!("File sent successfully: {}", transfer.file_name()));
                true
            }
            Err(e) => {
                tracing::warn!(file = transfer.file_name(), %host, port, error = %e, "Send failed");
                self.sink.on_log_line(&describe_failure(e, host, port));
                false
            }
        };

        let terminal = if success {
            TransferStatus::Completed
        } else {
            TransferStatus::Failed
        };
        if let Err(e) = transfer.transition(terminal) {
            tracing::warn!(error = %e, "Cannot finalize transfer record");
        }
        persist_status(self.store.as_ref(), transfer);

        self.sink.on_transfer_complete(transfer, success);
        success
    }

    /// Run [`send`](Self::send) on its own task.
    ///
    /// The returned handle can be awaited for the outcome or dropped to
    /// let the send finish in the background.
    pub fn spawn_send(
        &self,
        path: PathBuf,
        host: String,
        port: u16,
        mut transfer: Transfer,
    ) -> JoinHandle<SendOutcome> {
        let sender = self.clone();
        tokio::spawn(async move {
            let success = sender.send(&path, &host, port, &mut transfer).await;
            SendOutcome { transfer, success }
        })
    }

    async fn try_send(
        &self,
        path: &Path,
        resolved: Result<ResolvedPeer>,
        transfer: &mut Transfer,
    ) -> Result<()> {
        if transfer.status() != TransferStatus::Pending {
            return Err(Error::InvalidInput(format!(
                "transfer must be pending, found {}",
                transfer.status()
            )));
        }

        let declared = transfer.file_size();
        let actual = file::validate_for_transfer(path, self.config.max_file_size).await?;
        if actual != declared {
            return Err(Error::SizeMismatch {
                file: path.display().to_string(),
                declared,
                actual,
            });
        }

        let mut stream = resolved?.connect(self.config.connect_timeout).await?;
        if let Err(e) = configure_tcp_keepalive(&stream) {
            tracing::debug!(error = %e, "Could not enable TCP keep-alive");
        }

        self.sink
            .on_log_line("Connected to peer, starting file transfer");

        let handshake = Handshake {
            file_name: transfer.file_name().to_string(),
            file_size: declared,
            sender_username: self.config.username.clone(),
        };
        handshake.write_to(&mut stream).await?;

        let response = match protocol::read_text_with_timeout(
            &mut stream,
            self.config.read_timeout,
            "handshake acknowledgment",
        )
        .await
        {
            Ok(token) => token,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(Error::HandshakeRejected(
                    "connection closed by peer".to_string(),
                ));
            }
            Err(e) => return Err(e),
        };
        if Ack::from_token(&response) != Some(Ack::Ready) {
            return Err(Error::HandshakeRejected(response));
        }

        transfer.transition(TransferStatus::InProgress)?;
        persist_status(self.store.as_ref(), transfer);
        self.sink.on_log_line("Peer ready, transferring file data");

        let sent = self.stream_file(&mut stream, path, declared).await?;
        self.sink
            .on_log_line(&format!("File data sent: {}", format_size(sent)));

        let verdict = protocol::read_text_with_timeout(
            &mut stream,
            self.config.read_timeout,
            "final acknowledgment",
        )
        .await?;
        match Ack::from_token(&verdict) {
            Some(Ack::Success) => Ok(()),
            _ => Err(Error::PeerFailed(verdict)),
        }
    }

    /// Copy exactly `declared` bytes of `path` into `stream`.
    async fn stream_file(&self, stream: &mut TcpStream, path: &Path, declared: u64) -> Result<u64> {
        let buffer_size = self.config.buffer_size.max(1);
        let file = File::open(path).await?;
        let mut reader = BufReader::with_capacity(buffer_size, file);
        let mut buf = vec![0u8; buffer_size];
        let mut tracker = ProgressTracker::new(TransferDirection::Sent, declared).with_emitted(0);
        let mut chunks = 0u64;

        while tracker.done() < declared {
            let remaining = declared - tracker.done();
            let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
            let n = reader.read(&mut buf[..want]).await?;
            if n == 0 {
                return Err(Error::Truncated {
                    expected: declared,
                    received: tracker.done(),
                });
            }

            stream.write_all(&buf[..n]).await?;
            if let Some(update) = tracker.advance(n as u64) {
                self.sink.on_progress(update.percent, &update.message);
            }

            chunks += 1;
            if chunks % crate::PACING_INTERVAL_BUFFERS == 0 {
                tokio::task::yield_now().await;
            }
        }

        stream.flush().await?;
        if let Some(update) = tracker.finish() {
            self.sink.on_progress(update.percent, &update.message);
        }
        Ok(tracker.done())
    }
}

/// Addresses a peer name resolved to, in lookup order.
#[derive(Debug, Clone)]
pub struct ResolvedPeer {
    label: String,
    candidates: Vec<SocketAddr>,
}

impl ResolvedPeer {
    /// First resolved address.
    #[must_use]
    pub fn first(&self) -> Option<SocketAddr> {
        self.candidates.first().copied()
    }

    /// Dial the candidates in order, bounded by `limit` overall.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if the bound elapses and
    /// `Error::ConnectionFailed` if every candidate refuses or is unreachable.
    pub async fn connect(&self, limit: Duration) -> Result<TcpStream> {
        match timeout(limit, TcpStream::connect(&self.candidates[..])).await {
            Ok(Ok(stream)) => {
                tracing::debug!(addr = %self.label, "Connected");
                Ok(stream)
            }
            Ok(Err(source)) => Err(Error::ConnectionFailed {
                addr: self.label.clone(),
                source,
            }),
            Err(_) => Err(Error::timeout("connect", limit)),
        }
    }
}

/// Resolve `host:port`, bounded by `limit`.
///
/// # Errors
///
/// Returns `Error::UnresolvedAddress` if the host yields no address and
/// `Error::Timeout` if the lookup does not finish in time.
pub async fn resolve(host: &str, port: u16, limit: Duration) -> Result<ResolvedPeer> {
    let lookup = async {
        tokio::net::lookup_host((host, port))
            .await
            .map(|addrs| addrs.collect::<Vec<SocketAddr>>())
            .map_err(|_| Error::UnresolvedAddress(host.to_string()))
    };
    let candidates = timeout(limit, lookup)
        .await
        .map_err(|_| Error::timeout("resolve", limit))??;
    if candidates.is_empty() {
        return Err(Error::UnresolvedAddress(host.to_string()));
    }

    Ok(ResolvedPeer {
        label: crate::connection::PeerAddress::new(host, port).to_string(),
        candidates,
    })
}

/// Resolve and dial `host:port`.
///
/// # Errors
///
/// See [`resolve`] and [`ResolvedPeer::connect`].
pub async fn connect(host: &str, port: u16, limit: Duration) -> Result<TcpStream> {
    resolve(host, port, limit).await?.connect(limit).await
}

fn describe_failure(error: &Error, host: &str, port: u16) -> String {
    match error.kind() {
        ErrorKind::Connection => format!(
            "Connection failed: Peer not available at {host}:{port} ({error})"
        ),
        ErrorKind::Timeout => format!("Transfer timeout: {error}"),
        ErrorKind::Interrupted => "Transfer interrupted".to_string(),
        ErrorKind::Protocol | ErrorKind::Io | ErrorKind::Other => {
            format!("Transfer error: {error}")
        }
    }
}
