//! Transfer records persistence for Dropline.
//!
//! Endpoints write through the [`TransferStore`] trait:
//!
//! - [`MemoryStore`] keeps records for the lifetime of the process
//! - [`HistoryStore`] persists them to a JSON file, newest first
//!
//! Ids are handed out incrementally by the store on first write.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::HistoryConfig;
use crate::error::{Error, Result};
use crate::transfer::{Transfer, TransferId, TransferStatus};

/// Persistence collaborator used by both endpoints.
///
/// Calls come from concurrent workers, so implementations synchronize
/// internally.
pub trait TransferStore: Send + Sync {
    /// Write a new record and return the id assigned to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    fn record_transfer(&self, transfer: &Transfer) -> Result<TransferId>;

    /// Move the stored record `id` to `status`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unknown, the transition is illegal
    /// or the store cannot be written.
    fn update_status(&self, id: TransferId, status: TransferStatus) -> Result<()>;

    /// Make every accepted write durable before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if pending state cannot be written.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Records {
    next_id: u64,
    entries: Vec<Transfer>,
    /// Bumped on every change
    generation: u64,
}

impl Records {
    fn insert(&mut self, transfer: &Transfer) -> TransferId {
        self.generation += 1;
        self.next_id += 1;
        let id = TransferId(self.next_id);
        let mut stored = transfer.clone();
        stored.assign_id(id);
        self.entries.insert(0, stored);
        id
    }

    fn update(&mut self, id: TransferId, status: TransferStatus) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|t| t.id() == Some(id))
            .ok_or_else(|| Error::StoreError(format!("unknown transfer id {id}")))?;
        entry.transition(status)?;
        self.generation += 1;
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            generation: self.generation,
            db: HistoryDatabase {
                version: 1,
                last_id: self.next_id,
                entries: self.entries.clone(),
            },
        }
    }
}

fn lock(records: &Mutex<Records>) -> Result<MutexGuard<'_, Records>> {
    records
        .lock()
        .map_err(|_| Error::StoreError("transfer store lock poisoned".to_string()))
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored records, newest first.
    #[must_use]
    pub fn transfers(&self) -> Vec<Transfer> {
        lock(&self.records)
            .map(|r| r.entries.clone())
            .unwrap_or_default()
    }

    /// Look up a record by id.
    #[must_use]
    pub fn get(&self, id: TransferId) -> Option<Transfer> {
        lock(&self.records)
            .ok()?
            .entries
            .iter()
            .find(|t| t.id() == Some(id))
            .cloned()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.records).map_or(0, |r| r.entries.len())
    }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransferStore for MemoryStore {
    fn record_transfer(&self, transfer: &Transfer) -> Result<TransferId> {
        Ok(lock(&self.records)?.insert(transfer))
    }

    fn update_status(&self, id: TransferId, status: TransferStatus) -> Result<()> {
        lock(&self.records)?.update(id, status)
    }
}

/// Serializable wrapper for the history database.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryDatabase {
    /// Version of the history database format
    version: u32,
    /// Last id handed out
    #[serde(default)]
    last_id: u64,
    /// Transfer records, newest first
    entries: Vec<Transfer>,
}

/// History state captured under the records lock.
#[derive(Debug)]
struct Snapshot {
    generation: u64,
    db: HistoryDatabase,
}

/// Serializes writes of the database file.
#[derive(Debug)]
struct HistoryWriter {
    path: PathBuf,
    /// Generation of the last snapshot on disk
    written: Mutex<u64>,
}

impl HistoryWriter {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            written: Mutex::new(0),
        }
    }

    /// Write `snapshot` unless a newer one already reached the disk.
    fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let mut written = self
            .written
            .lock()
            .map_err(|_| Error::StoreError("history writer lock poisoned".to_string()))?;
        if snapshot.generation < *written {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::StoreError(format!(
                        "Failed to create history store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let file = fs::File::create(&self.path).map_err(|e| {
            Error::StoreError(format!(
                "Failed to create history store at {}: {}",
                self.path.display(),
                e
            ))
        })?;

        serde_json::to_writer_pretty(BufWriter::new(file), &snapshot.db).map_err(|e| {
            Error::StoreError(format!(
                "Failed to write history store at {}: {}",
                self.path.display(),
                e
            ))
        })?;

        *written = snapshot.generation;
        Ok(())
    }
}

/// JSON-backed transfer history.
///
/// Writes made through [`TransferStore`] reach the disk on the blocking pool
/// when called inside a tokio runtime; [`TransferStore::flush`] waits for the
/// latest state to be written.
#[derive(Debug)]
pub struct HistoryStore {
    /// Path to the history database file
    path: PathBuf,
    /// Records and id counter
    records: Mutex<Records>,
    /// Configuration settings
    config: HistoryConfig,
    writer: Arc<HistoryWriter>,
}

impl HistoryStore {
    /// Load the history store from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be loaded.
    pub fn load(config: HistoryConfig) -> Result<Self> {
        let path = Self::default_path().unwrap_or_else(|| PathBuf::from("history.json"));
        Self::load_from(path, config)
    }

    /// Load from a specific path. A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: PathBuf, config: HistoryConfig) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                writer: Arc::new(HistoryWriter::new(path.clone())),
                path,
                records: Mutex::new(Records::default()),
                config,
            });
        }

        let file = fs::File::open(&path).map_err(|e| {
            Error::StoreError(format!(
                "Failed to open history store at {}: {}",
                path.display(),
                e
            ))
        })?;

        let db: HistoryDatabase = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::StoreError(format!(
                "Failed to parse history store at {}: {}",
                path.display(),
                e
            ))
        })?;

        let highest = db
            .entries
            .iter()
            .filter_map(|t| t.id().map(|id| id.0))
            .max()
            .unwrap_or(0);

        let mut records = Records {
            next_id: db.last_id.max(highest),
            entries: db.entries,
            generation: 0,
        };
        apply_auto_clear(&mut records, config.auto_clear_days);

        Ok(Self {
            writer: Arc::new(HistoryWriter::new(path.clone())),
            path,
            records: Mutex::new(records),
            config,
        })
    }

    /// Get the default history store path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "dropline", "Dropline")
            .map(|dirs| dirs.data_dir().join("history.json"))
    }

    /// Get the path to the history store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List history entries, newest first.
    ///
    /// # Arguments
    ///
    /// * `limit` - Maximum number of entries to return (None for all)
    #[must_use]
    pub fn list(&self, limit: Option<usize>) -> Vec<Transfer> {
        let Ok(records) = lock(&self.records) else {
            return Vec::new();
        };
        let n = limit.map_or(records.entries.len(), |n| n.min(records.entries.len()));
        records.entries[..n].to_vec()
    }

    /// Get an entry by index (0 = most recent).
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Transfer> {
        lock(&self.records).ok()?.entries.get(index).cloned()
    }

    /// Get an entry by id.
    #[must_use]
    pub fn find_by_id(&self, id: TransferId) -> Option<Transfer> {
        lock(&self.records)
            .ok()?
            .entries
            .iter()
            .find(|t| t.id() == Some(id))
            .cloned()
    }

    /// Get the total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.records).map_or(0, |r| r.entries.len())
    }

    /// Check if the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all history entries. Ids keep counting up.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be saved.
    pub fn clear(&self) -> Result<()> {
        let snapshot = {
            let mut records = lock(&self.records)?;
            records.entries.clear();
            records.generation += 1;
            records.snapshot()
        };
        self.writer.write(&snapshot)
    }

    fn persist(&self, snapshot: Snapshot) {
        let writer = Arc::clone(&self.writer);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || {
                    if let Err(e) = writer.write(&snapshot) {
                        tracing::warn!(error = %e, "Could not save transfer history");
                    }
                });
            }
            Err(_) => {
                if let Err(e) = writer.write(&snapshot) {
                    tracing::warn!(error = %e, "Could not save transfer history");
                }
            }
        }
    }
}

impl TransferStore for HistoryStore {
    fn record_transfer(&self, transfer: &Transfer) -> Result<TransferId> {
        let (id, snapshot) = {
            let mut records = lock(&self.records)?;
            let id = records.insert(transfer);
            if records.entries.len() > self.config.max_entries {
                records.entries.truncate(self.config.max_entries);
            }
            (id, records.snapshot())
        };
        self.persist(snapshot);
        Ok(id)
    }

    fn update_status(&self, id: TransferId, status: TransferStatus) -> Result<()> {
        let snapshot = {
            let mut records = lock(&self.records)?;
            match records.update(id, status) {
                Ok(()) => records.snapshot(),
                // Pruned past max_entries while in flight.
                Err(Error::StoreError(_)) => return Ok(()),
                Err(e) => return Err(e),
            }
        };
        self.persist(snapshot);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let snapshot = lock(&self.records)?.snapshot();
        self.writer.write(&snapshot)
    }
}

fn apply_auto_clear(records: &mut Records, days: Option<u32>) {
    let Some(days) = days else {
        return;
    };
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));

    let len_before = records.entries.len();
    records.entries.retain(|t| t.created_at() >= cutoff);

    if records.entries.len() < len_before {
        tracing::debug!(
            removed = len_before - records.entries.len(),
            "Auto-cleared old history entries"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::TransferDirection;
    use tempfile::TempDir;

    fn create_test_transfer(name: &str) -> Transfer {
        Transfer::new(1, name, 1024, TransferDirection::Sent).with_peer_username("alice")
    }

    #[test]
    fn test_memory_store_assigns_incremental_ids() {
        let store = MemoryStore::new();
        let first = store.record_transfer(&create_test_transfer("a")).unwrap();
        let second = store.record_transfer(&create_test_transfer("b")).unwrap();

        assert_eq!(first, TransferId(1));
        assert_eq!(second, TransferId(2));
        assert_eq!(store.get(second).unwrap().file_name(), "b");
        assert_eq!(store.transfers()[0].file_name(), "b");
    }

    #[test]
    fn test_memory_store_enforces_transitions() {
        let store = MemoryStore::new();
        let id = store.record_transfer(&create_test_transfer("a")).unwrap();

        store.update_status(id, TransferStatus::InProgress).unwrap();
        store.update_status(id, TransferStatus::Completed).unwrap();
        assert!(matches!(
            store.update_status(id, TransferStatus::Failed),
            Err(Error::InvalidTransition { .. })
        ));
        assert_eq!(store.get(id).unwrap().status(), TransferStatus::Completed);

        assert!(matches!(
            store.update_status(TransferId(99), TransferStatus::Failed),
            Err(Error::StoreError(_))
        ));
    }

    #[test]
    fn test_history_store_save_and_load() {
        let tmp_dir = TempDir::new().unwrap();
        let history_path = tmp_dir.path().join("history.json");

        let store = HistoryStore::load_from(history_path.clone(), HistoryConfig::default()).unwrap();
        let id = store.record_transfer(&create_test_transfer("test.txt")).unwrap();
        store.update_status(id, TransferStatus::InProgress).unwrap();

        let loaded = HistoryStore::load_from(history_path, HistoryConfig::default()).unwrap();
        assert_eq!(loaded.len(), 1);
        let entry = loaded.find_by_id(id).unwrap();
        assert_eq!(entry.status(), TransferStatus::InProgress);
        assert_eq!(entry.peer_username(), Some("alice"));

        let next = loaded.record_transfer(&create_test_transfer("next.txt")).unwrap();
        assert_eq!(next, TransferId(id.0 + 1));
    }

    #[test]
    fn test_history_max_entries() {
        let tmp_dir = TempDir::new().unwrap();
        let history_path = tmp_dir.path().join("history.json");

        let config = HistoryConfig {
            enabled: true,
            max_entries: 3,
            auto_clear_days: None,
        };

        let store = HistoryStore::load_from(history_path, config).unwrap();

        for i in 0..5 {
            store
                .record_transfer(&create_test_transfer(&format!("file{i}")))
                .unwrap();
        }

        assert_eq!(store.len(), 3);
        assert_eq!(store.get(0).unwrap().file_name(), "file4");
        assert_eq!(store.get(1).unwrap().file_name(), "file3");
        assert_eq!(store.get(2).unwrap().file_name(), "file2");
        assert_eq!(store.list(Some(2)).len(), 2);
    }

    #[test]
    fn test_history_update_of_pruned_record_is_ignored() {
        let tmp_dir = TempDir::new().unwrap();
        let config = HistoryConfig {
            enabled: true,
            max_entries: 1,
            auto_clear_days: None,
        };
        let store = HistoryStore::load_from(tmp_dir.path().join("h.json"), config).unwrap();

        let old = store.record_transfer(&create_test_transfer("old")).unwrap();
        store.record_transfer(&create_test_transfer("new")).unwrap();

        assert!(store.update_status(old, TransferStatus::Failed).is_ok());
    }

    #[test]
    fn test_history_clear() {
        let tmp_dir = TempDir::new().unwrap();
        let history_path = tmp_dir.path().join("history.json");

        let store = HistoryStore::load_from(history_path.clone(), HistoryConfig::default()).unwrap();
        store.record_transfer(&create_test_transfer("a")).unwrap();
        store.record_transfer(&create_test_transfer("b")).unwrap();
        assert_eq!(store.len(), 2);

        store.clear().unwrap();
        assert!(store.is_empty());

        let id = store.record_transfer(&create_test_transfer("c")).unwrap();
        assert_eq!(id, TransferId(3));
    }

    #[tokio::test]
    async fn test_history_flush_inside_runtime() {
        let tmp_dir = TempDir::new().unwrap();
        let history_path = tmp_dir.path().join("history.json");

        let store = HistoryStore::load_from(history_path.clone(), HistoryConfig::default()).unwrap();
        let id = store.record_transfer(&create_test_transfer("bg.txt")).unwrap();
        store.update_status(id, TransferStatus::Cancelled).unwrap();
        store.flush().unwrap();

        let loaded = HistoryStore::load_from(history_path, HistoryConfig::default()).unwrap();
        assert_eq!(loaded.find_by_id(id).unwrap().status(), TransferStatus::Cancelled);
    }

    #[test]
    fn test_stale_snapshot_does_not_overwrite_newer() {
        let tmp_dir = TempDir::new().unwrap();
        let history_path = tmp_dir.path().join("history.json");
        let writer = HistoryWriter::new(history_path.clone());

        let mut records = Records::default();
        records.insert(&create_test_transfer("first"));
        let older = records.snapshot();
        records.insert(&create_test_transfer("second"));
        let newer = records.snapshot();

        writer.write(&newer).unwrap();
        writer.write(&older).unwrap();

        let loaded = HistoryStore::load_from(history_path, HistoryConfig::default()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(0).unwrap().file_name(), "second");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let tmp_dir = TempDir::new().unwrap();
        let store =
            HistoryStore::load_from(tmp_dir.path().join("missing.json"), HistoryConfig::default())
                .unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_corrupt_file() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("history.json");
        fs::write(&path, "not json").unwrap();

        let result = HistoryStore::load_from(path, HistoryConfig::default());
        assert!(matches!(result, Err(Error::StoreError(_))));
    }
}
