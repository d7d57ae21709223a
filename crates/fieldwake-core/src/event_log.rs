//! Durable append-only log of device reports.
//!
//! The log contract (ordered, durable once `append` returns) lives in
//! [`EventLog`]; how the sequence reaches disk is a [`LogStore`]. The shipped
//! [`JsonFileStore`] rewrites one JSON document per append through a
//! temp-file-then-rename swap, so readers only ever see a complete document.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::PersistenceError;
use crate::report::{DeviceReport, ReportRecord, unix_timestamp};

/// Persistence strategy behind an [`EventLog`].
///
/// Implementations are called from a blocking thread and never concurrently
/// for writes; [`EventLog`] serializes `persist` calls.
pub trait LogStore: Send + Sync {
    /// Load the full sequence. A missing or unreadable document is an empty
    /// log, not an error.
    fn load(&self) -> Result<Vec<ReportRecord>, PersistenceError>;

    /// Replace the stored sequence with `records`, atomically.
    fn persist(&self, records: &[ReportRecord]) -> Result<(), PersistenceError>;

    /// Clean up after an interrupted `persist`. Called once on open.
    fn recover(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Whole-document JSON store using write-to-temp then rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tmp_path = temp_path_for(&path);
        Self { path, tmp_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }
}

/// Sibling of `path` so the rename never crosses filesystems.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| OsString::from("events.json"), OsString::from);
    name.push(".tmp");
    path.with_file_name(name)
}

impl LogStore for JsonFileStore {
    fn load(&self) -> Result<Vec<ReportRecord>, PersistenceError> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::io(&self.path, e)),
        };
        match serde_json::from_slice(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Event log unparsable, treating as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    fn persist(&self, records: &[ReportRecord]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }

        let content = serde_json::to_vec_pretty(records)?;
        let write_tmp = || -> std::io::Result<()> {
            let mut file = File::create(&self.tmp_path)?;
            file.write_all(&content)?;
            file.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = fs::remove_file(&self.tmp_path);
            return Err(PersistenceError::io(&self.tmp_path, e));
        }

        if let Err(e) = fs::rename(&self.tmp_path, &self.path) {
            let _ = fs::remove_file(&self.tmp_path);
            return Err(PersistenceError::io(&self.path, e));
        }
        Ok(())
    }

    fn recover(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.tmp_path) {
            Ok(()) => {
                warn!(
                    path = %self.tmp_path.display(),
                    "Removed stray temp file from interrupted write"
                );
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::io(&self.tmp_path, e)),
        }
    }
}

/// Append-only report log with globally serialized writers.
pub struct EventLog {
    store: Arc<dyn LogStore>,
    write_lock: Arc<Mutex<()>>,
}

impl EventLog {
    /// Wrap `store`, running its crash recovery first.
    pub fn open(store: impl LogStore + 'static) -> Result<Self, PersistenceError> {
        store.recover()?;
        Ok(Self {
            store: Arc::new(store),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Open a [`JsonFileStore`] at `path`.
    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let store = JsonFileStore::new(path);
        info!(path = %store.path().display(), "Opening event log");
        Self::open(store)
    }

    /// Stamp `report` with the current time and append it.
    pub async fn record(
        &self,
        report: DeviceReport,
    ) -> Result<(ReportRecord, usize), PersistenceError> {
        let record = ReportRecord::new(report, unix_timestamp());
        let total = self.append(record.clone()).await?;
        Ok((record, total))
    }

    /// Append one record and return the new total count.
    ///
    /// The load, push and persist steps run as one unit under the write lock,
    /// so concurrent appends never overwrite each other.
    pub async fn append(&self, record: ReportRecord) -> Result<usize, PersistenceError> {
        let device_key = record.report.device_key.clone();
        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        let store = Arc::clone(&self.store);

        // The guard moves into the blocking task so the lock stays held even if
        // the caller is cancelled mid-write.
        let result = run_blocking(move || {
            let _guard = guard;
            let mut records = store.load()?;
            records.push(record);
            store.persist(&records)?;
            Ok(records.len())
        })
        .await;

        match &result {
            Ok(total) => info!(device_key = %device_key, total, "Report appended"),
            Err(e) => error!(device_key = %device_key, error = %e, "Failed to persist report"),
        }
        result
    }

    /// Point-in-time snapshot of every record, oldest first.
    pub async fn read_all(&self) -> Vec<ReportRecord> {
        let store = Arc::clone(&self.store);
        run_blocking(move || store.load())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to read event log, returning empty");
                Vec::new()
            })
    }

    /// Remove every record.
    pub async fn clear(&self) -> Result<(), PersistenceError> {
        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        let store = Arc::clone(&self.store);
        let result = run_blocking(move || {
            let _guard = guard;
            store.persist(&[])
        })
        .await;

        match &result {
            Ok(()) => info!("Event log cleared"),
            Err(e) => error!(error = %e, "Failed to clear event log"),
        }
        result
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, PersistenceError>
where
    F: FnOnce() -> Result<T, PersistenceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))?
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::report::ReportBody;

    fn report(key: &str, label: &str) -> DeviceReport {
        DeviceReport::from_body(
            ReportBody {
                device_key: Some(key.to_string()),
                device: Some(label.to_string()),
                status: Some("online".to_string()),
                ..Default::default()
            },
            1_700_000_000,
        )
        .unwrap()
    }

    fn log_in(dir: &tempfile::TempDir) -> (EventLog, PathBuf) {
        let path = dir.path().join("data.json");
        (EventLog::open_file(&path).unwrap(), path)
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (log, path) = log_in(&dir);
        assert!(log.read_all().await.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn record_appends_in_order_and_stamps_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let (log, _) = log_in(&dir);

        let (first, total) = log.record(report("dev-1", "esp32")).await.unwrap();
        assert_eq!(total, 1);
        assert!(first.created_at >= 1_600_000_000);

        let (_, total) = log.record(report("dev-2", "esp8266")).await.unwrap();
        assert_eq!(total, 2);

        let records = log.read_all().await;
        let keys: Vec<_> = records.iter().map(|r| r.report.device_key.as_str()).collect();
        assert_eq!(keys, ["dev-1", "dev-2"]);
        assert_eq!(records[0], first);
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (log, path) = log_in(&dir);
        log.record(report("dev-1", "esp32")).await.unwrap();
        drop(log);

        let reopened = EventLog::open_file(&path).unwrap();
        assert_eq!(reopened.read_all().await.len(), 1);
    }

    #[tokio::test]
    async fn clear_empties_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let (log, path) = log_in(&dir);
        log.record(report("dev-1", "esp32")).await.unwrap();

        log.clear().await.unwrap();
        assert!(log.read_all().await.is_empty());
        assert_eq!(fs::read_to_string(path).unwrap().trim(), "[]");

        let (_, total) = log.record(report("dev-1", "esp32")).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn interrupted_write_leaves_previous_content_intact() {
        let dir = tempfile::tempdir().unwrap();
        let (log, path) = log_in(&dir);
        log.record(report("dev-1", "esp32")).await.unwrap();
        log.record(report("dev-2", "esp32")).await.unwrap();
        drop(log);

        // Simulate a crash after the temp write but before the rename.
        let store = JsonFileStore::new(&path);
        fs::write(store.tmp_path(), b"[{\"device_key\":\"dev-3\",\"dev").unwrap();

        let reopened = EventLog::open_file(&path).unwrap();
        assert!(!store.tmp_path().exists(), "stray temp file should be removed");
        let records = reopened.read_all().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].report.device_key.as_str(), "dev-2");
    }

    #[tokio::test]
    async fn unparsable_document_reads_empty_and_heals_on_append() {
        let dir = tempfile::tempdir().unwrap();
        let (log, path) = log_in(&dir);
        fs::write(&path, b"not json").unwrap();

        assert!(log.read_all().await.is_empty());
        let (_, total) = log.record(report("dev-1", "esp32")).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(log.read_all().await.len(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_is_reported_and_lock_released() {
        let dir = tempfile::tempdir().unwrap();
        let (log, path) = log_in(&dir);
        // A directory at the canonical path makes both read and rename fail.
        fs::create_dir(&path).unwrap();

        let err = log.record(report("dev-1", "esp32")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Io { .. }), "got {err:?}");
        assert!(log.clear().await.is_err());

        fs::remove_dir(&path).unwrap();
        let (_, total) = log.record(report("dev-1", "esp32")).await.unwrap();
        assert_eq!(total, 1);
        assert!(!JsonFileStore::new(&path).tmp_path().exists());
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("data.json");
        let log = EventLog::open_file(&path).unwrap();

        log.record(report("dev-1", "esp32")).await.unwrap();
        assert!(path.exists());
    }

    async fn concurrent_appends(n: usize) {
        let dir = tempfile::tempdir().unwrap();
        let (log, _) = log_in(&dir);
        let log = Arc::new(log);

        let handles: Vec<_> = (0..n)
            .map(|i| {
                let log = Arc::clone(&log);
                tokio::spawn(async move { log.record(report("dev-1", &format!("unit-{i}"))).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let records = log.read_all().await;
        assert_eq!(records.len(), n);
        let labels: HashSet<_> = records.iter().map(|r| r.report.device_label.clone()).collect();
        assert_eq!(labels.len(), n, "no duplicates and no losses");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_append_single() {
        concurrent_appends(1).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_append_fifty() {
        concurrent_appends(50).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_append_five_hundred() {
        concurrent_appends(500).await;
    }

    #[test]
    fn temp_path_is_a_sibling() {
        let store = JsonFileStore::new("/var/lib/fieldwake/data.json");
        assert_eq!(
            store.tmp_path(),
            Path::new("/var/lib/fieldwake/data.json.tmp")
        );
    }
}
