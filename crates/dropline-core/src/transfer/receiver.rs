//! Inbound endpoint: accepts connections and stores one file per connection.
//!
//! The accept loop runs on its own task and spawns a handler per accepted
//! socket, so a slow peer never delays the next accept. Handlers share only
//! the storage directory; destination names are claimed with exclusive
//! creates (see [`crate::file::create_unique_file`]). Handlers are tracked
//! so a caller can wait for them with [`ReceiverHandle::drain`].

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};
use crate::file::{self, format_size};
use crate::history::TransferStore;
use crate::protocol::{self, Ack, Handshake};

use super::events::TransferSink;
use super::progress::ProgressTracker;
use super::record::{Transfer, TransferDirection, TransferStatus};
use super::{configure_tcp_keepalive, persist_status, record_new};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Settings for the receiving endpoint.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Address to listen on; port 0 picks an ephemeral port
    pub bind_addr: SocketAddr,
    /// Directory where received files land
    pub storage_dir: PathBuf,
    /// Bound on each read from a peer
    pub read_timeout: Duration,
    /// Chunk size for reading and writing file bytes
    pub buffer_size: usize,
    /// Reject handshakes declaring more than this many bytes
    pub max_file_size: Option<u64>,
    /// Upper bound on simultaneous receptions
    pub max_concurrent: Option<usize>,
    /// User owning received transfer records
    pub user_id: i64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, crate::DEFAULT_PORT)),
            storage_dir: PathBuf::from(crate::DEFAULT_STORAGE_DIR),
            read_timeout: crate::DEFAULT_READ_TIMEOUT,
            buffer_size: crate::DEFAULT_BUFFER_SIZE,
            max_file_size: Some(crate::DEFAULT_MAX_FILE_SIZE),
            max_concurrent: None,
            user_id: 0,
        }
    }
}

/// Lifecycle of a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Bound but not accepting yet
    Created,
    /// Accept loop is running
    Running,
    /// Listener has been closed
    Stopped,
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// State shared between the accept loop and connection handlers.
struct Shared {
    config: ReceiverConfig,
    store: Arc<dyn TransferStore>,
    sink: Arc<dyn TransferSink>,
    limiter: Option<Arc<Semaphore>>,
}

/// A bound receiver that has not started accepting.
pub struct Receiver {
    listener: TcpListener,
    local_addr: SocketAddr,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("local_addr", &self.local_addr)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Receiver {
    /// Create the storage directory and bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the address
    /// cannot be bound.
    pub async fn bind(
        config: ReceiverConfig,
        store: Arc<dyn TransferStore>,
        sink: Arc<dyn TransferSink>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.storage_dir).await?;

        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!(
            addr = %local_addr,
            storage = %config.storage_dir.display(),
            "Receiver bound"
        );

        let limiter = config
            .max_concurrent
            .filter(|&n| n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));

        Ok(Self {
            listener,
            local_addr,
            shared: Arc::new(Shared {
                config,
                store,
                sink,
                limiter,
            }),
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Always [`ReceiverState::Created`]; starting consumes the receiver.
    #[must_use]
    pub const fn state(&self) -> ReceiverState {
        ReceiverState::Created
    }

    /// Start the accept loop on a background task.
    #[must_use]
    pub fn start(self) -> ReceiverHandle {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (state_tx, state_rx) = watch::channel(ReceiverState::Running);
        let shutdown_rx = shutdown_tx.subscribe();
        let connections = TaskTracker::new();

        self.shared.sink.on_log_line(&format!(
            "File server started on port {}",
            self.local_addr.port()
        ));

        let task = tokio::spawn(accept_loop(
            self.listener,
            self.shared,
            shutdown_rx,
            state_tx,
            connections.clone(),
        ));

        ReceiverHandle {
            local_addr: self.local_addr,
            shutdown_tx,
            state_rx,
            connections,
            task: Some(task),
        }
    }
}

/// Handle to a running receiver.
///
/// Dropping the handle signals the accept loop to stop.
#[derive(Debug)]
pub struct ReceiverHandle {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    state_rx: watch::Receiver<ReceiverState>,
    connections: TaskTracker,
    task: Option<JoinHandle<()>>,
}

impl ReceiverHandle {
    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current state of the accept loop.
    #[must_use]
    pub fn state(&self) -> ReceiverState {
        *self.state_rx.borrow()
    }

    /// Close the listener and wait until it is released.
    ///
    /// In-flight receptions keep running to completion or timeout. Calling
    /// this more than once is harmless.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(());
        let mut state_rx = self.state_rx.clone();
        let _ = state_rx
            .wait_for(|state| *state == ReceiverState::Stopped)
            .await;
    }

    /// Number of connections still being handled.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.connections.len()
    }

    /// Stop accepting, then wait until every accepted connection has
    /// finished.
    pub async fn drain(&self) {
        self.stop().await;
        self.connections.wait().await;
    }

    /// Wait for the accept loop task to exit.
    pub async fn wait(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Receiver task panicked");
            }
        }
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
    state_tx: watch::Sender<ReceiverState>,
    connections: TaskTracker,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::debug!("Receiver received shutdown signal");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::info!(%peer, "Incoming connection");
                    shared
                        .sink
                        .on_log_line(&format!("Incoming connection from {}", peer.ip()));

                    let shared = Arc::clone(&shared);
                    connections.spawn(async move {
                        let _permit = match &shared.limiter {
                            Some(limiter) => match Arc::clone(limiter).acquire_owned().await {
                                Ok(permit) => Some(permit),
                                Err(_) => return,
                            },
                            None => None,
                        };
                        shared.handle_connection(stream, peer).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    shared.sink.on_log_line(&format!("Server error: {e}"));
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    drop(listener);
    connections.close();
    shared.sink.on_log_line("File server stopped");
    tracing::info!("Receiver stopped");
    let _ = state_tx.send(ReceiverState::Stopped);
}

impl Shared {
    async fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = configure_tcp_keepalive(&stream) {
            tracing::debug!(error = %e, "Could not enable TCP keep-alive");
        }

        let handshake =
            match Handshake::read_with_timeout(&mut stream, self.config.read_timeout).await {
                Ok(handshake) => handshake,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "Handshake failed");
                    self.sink.on_log_line(&format!("Client handling error: {e}"));
                    return;
                }
            };

        self.sink.on_log_line(&format!(
            "Receiving file: {} ({}) from {}",
            handshake.file_name,
            format_size(handshake.file_size),
            handshake.sender_username
        ));

        if let Some(limit) = self.config.max_file_size {
            if handshake.file_size > limit {
                tracing::warn!(
                    %peer,
                    size = handshake.file_size,
                    limit,
                    "Rejecting oversized file"
                );
                self.sink.on_log_line(&format!(
                    "Rejected {}: {} exceeds limit of {}",
                    handshake.file_name,
                    format_size(handshake.file_size),
                    format_size(limit)
                ));
                return;
            }
        }

        if let Err(e) = protocol::write_ack(&mut stream, Ack::Ready).await {
            tracing::warn!(%peer, error = %e, "Could not acknowledge handshake");
            self.sink.on_log_line(&format!("Client handling error: {e}"));
            return;
        }

        let requested = file::sanitize_file_name(&handshake.file_name);
        let destination = file::create_unique_file(&self.config.storage_dir, &requested).await;
        let (file_name, file_path) = match &destination {
            Ok(unique) => (unique.name.clone(), unique.path.clone()),
            Err(_) => (requested.clone(), self.config.storage_dir.join(&requested)),
        };

        let mut transfer = Transfer::new(
            self.config.user_id,
            file_name,
            handshake.file_size,
            TransferDirection::Received,
        )
        .with_peer_username(handshake.sender_username)
        .with_peer_ip(peer.ip())
        .with_file_path(file_path);

        if let Err(e) = transfer.transition(TransferStatus::InProgress) {
            tracing::warn!(error = %e, "Cannot start transfer record");
        }
        record_new(self.store.as_ref(), &mut transfer);

        let (result, created) = match destination {
            Ok(unique) => (
                self.receive_body(&mut stream, unique.file, handshake.file_size)
                    .await,
                true,
            ),
            Err(e) => (Err(e), false),
        };

        match result {
            Ok(()) => {
                if let Err(e) = protocol::write_ack(&mut stream, Ack::Success).await {
                    tracing::warn!(%peer, error = %e, "Could not deliver success acknowledgment");
                }
                if let Err(e) = transfer.transition(TransferStatus::Completed) {
                    tracing::warn!(error = %e, "Cannot complete transfer record");
                }
                tracing::info!(
                    file = transfer.file_name(),
                    size = transfer.file_size(),
                    %peer,
                    "File received"
                );
                self.sink.on_log_line(&format!(
                    "File received successfully: {}",
                    transfer.file_name()
                ));
            }
            Err(e) => {
                tracing::warn!(file = transfer.file_name(), %peer, error = %e, "Reception failed");
                self.sink.on_log_line(&format!(
                    "Failed to receive file: {}: {e}",
                    transfer.file_name()
                ));
                if let Err(e) = protocol::write_ack(&mut stream, Ack::Failed).await {
                    tracing::debug!(%peer, error = %e, "Could not deliver failure acknowledgment");
                }
                if let Err(e) = transfer.transition(TransferStatus::Failed) {
                    tracing::warn!(error = %e, "Cannot fail transfer record");
                }
                if created {
                    if let Err(e) = tokio::fs::remove_file(transfer.file_path()).await {
                        tracing::warn!(
                            path = %transfer.file_path().display(),
                            error = %e,
                            "Could not remove partial file"
                        );
                        self.sink
                            .on_log_line(&format!("Failed to clean up partial file: {e}"));
                    }
                }
            }
        }

        persist_status(self.store.as_ref(), &transfer);
        self.sink.on_file_received(&transfer);
    }

    /// Copy exactly `size` bytes from `stream` into `file`.
    async fn receive_body(&self, stream: &mut TcpStream, file: File, size: u64) -> Result<()> {
        let buffer_size = self.config.buffer_size.max(1);
        let read_timeout = self.config.read_timeout;
        let mut writer = BufWriter::with_capacity(buffer_size, file);
        let mut buf = vec![0u8; buffer_size];
        let mut tracker = ProgressTracker::new(TransferDirection::Received, size);

        while tracker.done() < size {
            let remaining = size - tracker.done();
            let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
            let n = timeout(read_timeout, stream.read(&mut buf[..want]))
                .await
                .map_err(|_| Error::timeout("file data", read_timeout))??;
            if n == 0 {
                return Err(Error::Truncated {
                    expected: size,
                    received: tracker.done(),
                });
            }

            writer.write_all(&buf[..n]).await?;
            if let Some(update) = tracker.advance(n as u64) {
                self.sink.on_progress(update.percent, &update.message);
            }
        }

        writer.flush().await?;
        writer.get_ref().sync_all().await?;

        if let Some(update) = tracker.finish() {
            self.sink.on_progress(update.percent, &update.message);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryStore;
    use crate::transfer::NullSink;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> ReceiverConfig {
        ReceiverConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            storage_dir: dir.path().join("downloads"),
            read_timeout: Duration::from_secs(2),
            ..ReceiverConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_creates_storage_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        let storage = config.storage_dir.clone();

        let receiver = Receiver::bind(config, Arc::new(MemoryStore::new()), Arc::new(NullSink))
            .await
            .unwrap();

        assert!(storage.is_dir());
        assert_ne!(receiver.local_addr().port(), 0);
        assert_eq!(receiver.state(), ReceiverState::Created);
    }

    #[tokio::test]
    async fn test_stop_releases_port() {
        let temp_dir = TempDir::new().unwrap();
        let receiver = Receiver::bind(
            test_config(&temp_dir),
            Arc::new(MemoryStore::new()),
            Arc::new(NullSink),
        )
        .await
        .unwrap();
        let addr = receiver.local_addr();

        let handle = receiver.start();
        assert_eq!(handle.state(), ReceiverState::Running);

        handle.stop().await;
        assert_eq!(handle.state(), ReceiverState::Stopped);
        handle.stop().await;

        let rebound = TcpListener::bind(addr).await;
        assert!(rebound.is_ok(), "port should be free after stop");
    }

    #[tokio::test]
    async fn test_oversized_handshake_closed_without_ready() {
        let temp_dir = TempDir::new().unwrap();
        let config = ReceiverConfig {
            max_file_size: Some(10),
            ..test_config(&temp_dir)
        };
        let store = Arc::new(MemoryStore::new());
        let receiver = Receiver::bind(config, store.clone(), Arc::new(NullSink))
            .await
            .unwrap();
        let handle = receiver.start();

        let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
        Handshake {
            file_name: "big.bin".to_string(),
            file_size: 11,
            sender_username: "bob".to_string(),
        }
        .write_to(&mut stream)
        .await
        .unwrap();

        let mut buf = Vec::new();
        let read = timeout(Duration::from_secs(2), stream.read_to_end(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read, 0, "receiver must close without READY");
        assert!(store.is_empty());

        handle.stop().await;
    }
}
