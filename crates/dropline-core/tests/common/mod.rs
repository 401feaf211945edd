//! Common test utilities for `Dropline` integration tests.
//!
//! This module provides shared functionality for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use dropline_core::history::MemoryStore;
use dropline_core::transfer::{
    ChannelSink, Receiver, ReceiverConfig, ReceiverHandle, Sender, SenderConfig, Transfer,
    TransferEvent, TransferSink,
};

/// How long a test waits for a receiver notification.
pub const EVENT_WAIT: Duration = Duration::from_secs(10);

/// Create a temporary directory for test files.
///
/// The directory will be automatically cleaned up when the returned
/// `TempDir` is dropped.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Assert that two files have identical content.
pub fn assert_files_equal(path1: &Path, path2: &Path) {
    let content1 = std::fs::read(path1).expect("Failed to read first file");
    let content2 = std::fs::read(path2).expect("Failed to read second file");
    assert_eq!(content1, content2, "File contents differ");
}

/// Names of the files currently in `dir`, sorted.
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to read directory")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// A port nothing is listening on.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe");
    let port = listener.local_addr().expect("probe addr").port();
    drop(listener);
    port
}

/// Sink that keeps every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TransferEvent>>,
}

impl RecordingSink {
    fn push(&self, event: TransferEvent) {
        self.events.lock().expect("sink lock").push(event);
    }

    pub fn events(&self) -> Vec<TransferEvent> {
        self.events.lock().expect("sink lock").clone()
    }

    pub fn progress(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TransferEvent::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TransferEvent::Log(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<(Transfer, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TransferEvent::TransferComplete { transfer, success } => Some((transfer, success)),
                _ => None,
            })
            .collect()
    }
}

impl TransferSink for RecordingSink {
    fn on_progress(&self, percent: u8, message: &str) {
        self.push(TransferEvent::Progress {
            percent,
            message: message.to_string(),
        });
    }

    fn on_log_line(&self, message: &str) {
        self.push(TransferEvent::Log(message.to_string()));
    }

    fn on_transfer_complete(&self, transfer: &Transfer, success: bool) {
        self.push(TransferEvent::TransferComplete {
            transfer: transfer.clone(),
            success,
        });
    }

    fn on_file_received(&self, transfer: &Transfer) {
        self.push(TransferEvent::FileReceived(transfer.clone()));
    }
}

/// A running receiver on an ephemeral loopback port.
pub struct TestReceiver {
    pub handle: ReceiverHandle,
    pub events: UnboundedReceiver<TransferEvent>,
    pub store: Arc<MemoryStore>,
    pub storage_dir: PathBuf,
}

impl TestReceiver {
    pub fn port(&self) -> u16 {
        self.handle.local_addr().port()
    }

    /// Wait for the next reception and return its record plus the
    /// progress values seen before it.
    pub async fn next_received(&mut self) -> (Transfer, Vec<u8>) {
        let mut progress = Vec::new();
        tokio::time::timeout(EVENT_WAIT, async {
            loop {
                match self.events.recv().await {
                    Some(TransferEvent::FileReceived(transfer)) => return (transfer, progress),
                    Some(TransferEvent::Progress { percent, .. }) => progress.push(percent),
                    Some(_) => {}
                    None => panic!("receiver sink closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for a reception")
    }
}

impl TestReceiver {
    /// Wait for the next reception and return its record plus the log
    /// lines seen before it.
    pub async fn next_received_with_logs(&mut self) -> (Transfer, Vec<String>) {
        let mut lines = Vec::new();
        tokio::time::timeout(EVENT_WAIT, async {
            loop {
                match self.events.recv().await {
                    Some(TransferEvent::FileReceived(transfer)) => return (transfer, lines),
                    Some(TransferEvent::Log(line)) => lines.push(line),
                    Some(_) => {}
                    None => panic!("receiver sink closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for a reception")
    }
}

/// Bind and start a receiver storing into `dir/downloads`.
pub async fn start_receiver(dir: &Path, tweak: impl FnOnce(&mut ReceiverConfig)) -> TestReceiver {
    let mut config = ReceiverConfig {
        bind_addr: "127.0.0.1:0".parse().expect("loopback addr"),
        storage_dir: dir.join("downloads"),
        read_timeout: Duration::from_secs(5),
        user_id: 2,
        ..ReceiverConfig::default()
    };
    tweak(&mut config);
    let storage_dir = config.storage_dir.clone();

    let store = Arc::new(MemoryStore::new());
    let (sink, events) = ChannelSink::new();
    let receiver = Receiver::bind(config, store.clone(), Arc::new(sink))
        .await
        .expect("bind receiver");

    TestReceiver {
        handle: receiver.start(),
        events,
        store,
        storage_dir,
    }
}

/// A sender with test-friendly timeouts.
pub struct TestSender {
    pub sender: Sender,
    pub sink: Arc<RecordingSink>,
    pub store: Arc<MemoryStore>,
}

impl TestSender {
    /// Send `path` to `127.0.0.1:port` with a fresh record.
    pub async fn send(&self, path: &Path, port: u16) -> (bool, Transfer) {
        let size = std::fs::metadata(path).expect("stat source").len();
        let mut transfer = Transfer::outbound(1, path, size);
        let ok = self
            .sender
            .send(path, "127.0.0.1", port, &mut transfer)
            .await;
        (ok, transfer)
    }
}

pub fn test_sender(tweak: impl FnOnce(&mut SenderConfig)) -> TestSender {
    let mut config = SenderConfig {
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(5),
        username: "tester".to_string(),
        ..SenderConfig::default()
    };
    tweak(&mut config);

    let sink = Arc::new(RecordingSink::default());
    let store = Arc::new(MemoryStore::new());
    TestSender {
        sender: Sender::new(config, store.clone(), sink.clone()),
        sink,
        store,
    }
}
