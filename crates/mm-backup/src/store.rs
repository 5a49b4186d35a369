// SPDX-License-Identifier: MIT OR Apache-2.0
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use mm_core::{BackupId, BackupRecord, Stub};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::fs::DirEntry;

/// Version stamped into every backup file's metadata envelope.
pub const BACKUP_VERSION: &str = "1";

/// Errors surfaced by [`BackupStore`].
#[derive(Debug, Error)]
pub enum BackupError {
    /// An I/O operation failed.
    #[error("io error at {path}: {source}")]
    Io {
        /// Path the operation was acting on.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// JSON (de)serialization failed.
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The requested backup file does not exist.
    #[error("backup file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// The file parsed as JSON but not as a backup envelope.
    #[error("malformed backup file {path}: {reason}", path = .path.display())]
    Malformed {
        /// Path of the offending file.
        path: PathBuf,
        /// Human-readable reason.
        reason: String,
    },
}

fn io_err(path: &Path, source: std::io::Error) -> BackupError {
    BackupError::Io { path: path.to_path_buf(), source }
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupMetadata {
    backup_timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    count: Option<usize>,
    backup_version: String,
}

#[derive(Debug, Serialize)]
struct Envelope<'a, T: Serialize> {
    payload: &'a T,
    metadata: BackupMetadata,
}

/// A stub read back out of a backup file: a single applied stub, or every
/// stub from a batch file, in original order.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoredBackup {
    /// Restored from a single-stub backup file.
    Single(Stub),
    /// Restored from a batch backup file.
    Batch(Vec<Stub>),
}

/// Append-only, date-partitioned mirror of applied stubs.
///
/// Every write lands under `root/YYYY/MM/DD/`; nothing is ever overwritten
/// or read back except through [`BackupStore::restore`] and
/// [`BackupStore::list_backups`]. [`BackupStore::cleanup_expired`] is the
/// only operation that deletes anything, and only whole days older than the
/// retention window.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
    compress: bool,
    retention_days: u32,
}

impl BackupStore {
    /// Builds a store rooted at `root`. The directory tree is created lazily
    /// on first write, not here.
    pub fn new(root: impl Into<PathBuf>, compress: bool, retention_days: u32) -> Self {
        Self { root: root.into(), compress, retention_days }
    }

    /// The directory this store writes under, for resolving a file name
    /// returned by [`Self::list_backups`] back into a path for [`Self::restore`].
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn extension(&self) -> &'static str {
        if self.compress {
            ".json.gz"
        } else {
            ".json"
        }
    }

    fn day_dir(&self, at: DateTime<Utc>) -> PathBuf {
        self.root
            .join(format!("{:04}", at.year()))
            .join(format!("{:02}", at.month()))
            .join(format!("{:02}", at.day()))
    }

    async fn write_envelope<T: Serialize>(&self, path: &Path, payload: &T, metadata: BackupMetadata) -> Result<u64, BackupError> {
        let envelope = Envelope { payload, metadata };
        let json = serde_json::to_vec(&envelope)?;
        let bytes = if self.compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json).map_err(|err| io_err(path, err))?;
            encoder.finish().map_err(|err| io_err(path, err))?
        } else {
            json
        };
        let len = bytes.len() as u64;
        fs::write(path, bytes).await.map_err(|err| io_err(path, err))?;
        Ok(len)
    }

    /// Backs up a single applied stub. File name: `<id>_<HHMMSS_micros>.json[.gz]`.
    pub async fn backup_single(&self, stub: &Stub) -> Result<BackupRecord, BackupError> {
        let now = Utc::now();
        let dir = self.day_dir(now);
        fs::create_dir_all(&dir).await.map_err(|err| io_err(&dir, err))?;
        let filename = format!("{}_{}{}", stub.id, timestamp_suffix(now), self.extension());
        let path = dir.join(filename);
        let metadata = BackupMetadata {
            backup_timestamp: now,
            id: Some(stub.id.clone()),
            count: None,
            backup_version: BACKUP_VERSION.to_string(),
        };
        let bytes = self.write_envelope(&path, stub, metadata).await?;
        tracing::debug!(stub_id = %stub.id, path = %path.display(), bytes, "backup_single written");
        Ok(BackupRecord {
            timestamp: now,
            id: BackupId::Single(stub.id.clone()),
            bytes,
            relative_path: self.relative_path(&path),
        })
    }

    /// Backs up a batch of applied stubs as one file. File name:
    /// `batch_<HHMMSS_micros>.json[.gz]`. Returns `None` for an empty batch
    /// without writing anything.
    pub async fn backup_batch(&self, stubs: &[Stub]) -> Result<Option<BackupRecord>, BackupError> {
        if stubs.is_empty() {
            return Ok(None);
        }
        let now = Utc::now();
        let dir = self.day_dir(now);
        fs::create_dir_all(&dir).await.map_err(|err| io_err(&dir, err))?;
        let filename = format!("batch_{}{}", timestamp_suffix(now), self.extension());
        let path = dir.join(filename);
        let payload = stubs.to_vec();
        let metadata = BackupMetadata {
            backup_timestamp: now,
            id: None,
            count: Some(stubs.len()),
            backup_version: BACKUP_VERSION.to_string(),
        };
        let bytes = self.write_envelope(&path, &payload, metadata).await?;
        tracing::info!(count = stubs.len(), path = %path.display(), bytes, "backup_batch written");
        Ok(Some(BackupRecord {
            timestamp: now,
            id: BackupId::Batch(stubs.len().to_string()),
            bytes,
            relative_path: self.relative_path(&path),
        }))
    }

    /// `path` relative to this store's root, using forward slashes
    /// regardless of platform so it round-trips through a URL path segment.
    fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Reads a backup file back, decompressing if its name ends in `.gz`.
    pub async fn restore(&self, path: &Path) -> Result<RestoredBackup, BackupError> {
        let raw = fs::read(path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                BackupError::NotFound(path.to_path_buf())
            } else {
                io_err(path, err)
            }
        })?;
        let json_bytes = if path.extension().and_then(|ext| ext.to_str()) == Some("gz") {
            let mut decoder = GzDecoder::new(raw.as_slice());
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(|err| io_err(path, err))?;
            out
        } else {
            raw
        };
        let value: serde_json::Value = serde_json::from_slice(&json_bytes)?;
        let payload = value.get("payload").ok_or_else(|| BackupError::Malformed {
            path: path.to_path_buf(),
            reason: "missing `payload` field".to_string(),
        })?;
        if payload.is_array() {
            let stubs: Vec<Stub> = serde_json::from_value(payload.clone())?;
            Ok(RestoredBackup::Batch(stubs))
        } else {
            let stub: Stub = serde_json::from_value(payload.clone())?;
            Ok(RestoredBackup::Single(stub))
        }
    }

    /// Lists backup files newer than `days` ago, optionally filtered to
    /// files whose leading `<id>_` segment matches `filter_id` (batch files
    /// are never matched by an id filter). Newest first.
    pub async fn list_backups(&self, filter_id: Option<&str>, days: u32) -> Result<Vec<BackupRecord>, BackupError> {
        let cutoff = Utc::now().date_naive() - chrono::Duration::days(days as i64);
        let mut out = Vec::new();

        let mut years = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(err) => return Err(io_err(&self.root, err)),
        };
        while let Some(year_entry) = years.next_entry().await.map_err(|err| io_err(&self.root, err))? {
            let Some(year) = digits_dir_name(&year_entry).await else { continue };
            let year_path = year_entry.path();
            let mut months = fs::read_dir(&year_path).await.map_err(|err| io_err(&year_path, err))?;
            while let Some(month_entry) = months.next_entry().await.map_err(|err| io_err(&year_path, err))? {
                let Some(month) = digits_dir_name(&month_entry).await else { continue };
                let month_path = month_entry.path();
                let mut day_entries = fs::read_dir(&month_path).await.map_err(|err| io_err(&month_path, err))?;
                while let Some(day_entry) = day_entries.next_entry().await.map_err(|err| io_err(&month_path, err))? {
                    let Some(day) = digits_dir_name(&day_entry).await else { continue };
                    let Some(dir_date) = parse_ymd(&year, &month, &day) else { continue };
                    if dir_date < cutoff {
                        continue;
                    }
                    let day_path = day_entry.path();
                    let mut files = fs::read_dir(&day_path).await.map_err(|err| io_err(&day_path, err))?;
                    while let Some(file_entry) = files.next_entry().await.map_err(|err| io_err(&day_path, err))? {
                        if !file_entry.file_type().await.map(|ft| ft.is_file()).unwrap_or(false) {
                            continue;
                        }
                        let file_name = file_entry.file_name().to_string_lossy().into_owned();
                        let is_batch = file_name.starts_with("batch_");
                        if let Some(filter) = filter_id {
                            if is_batch || !file_name.starts_with(filter) {
                                continue;
                            }
                        }
                        let path = file_entry.path();
                        let meta = fs::metadata(&path).await.map_err(|err| io_err(&path, err))?;
                        let timestamp = meta.modified().ok().map(DateTime::<Utc>::from).unwrap_or_else(Utc::now);
                        let stem = strip_backup_extensions(&file_name);
                        let id = if is_batch {
                            BackupId::Batch(stem)
                        } else {
                            let mapping_id = stem.split('_').next().unwrap_or(&stem).to_string();
                            BackupId::Single(mapping_id)
                        };
                        out.push(BackupRecord { timestamp, id, bytes: meta.len(), relative_path: self.relative_path(&path) });
                    }
                }
            }
        }
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(out)
    }

    /// Deletes every backup file under a day whose directory date is older
    /// than `retention_days`, then prunes any day/month/year directory left
    /// empty. Best-effort and resumable: a failure removing one file does
    /// not stop the sweep, and a non-empty directory is simply left in place.
    pub async fn cleanup_expired(&self) -> Result<u64, BackupError> {
        if self.retention_days == 0 {
            return Ok(0);
        }
        let cutoff = Utc::now().date_naive() - chrono::Duration::days(self.retention_days as i64);
        let mut removed = 0u64;

        let mut years = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(io_err(&self.root, err)),
        };
        while let Some(year_entry) = years.next_entry().await.map_err(|err| io_err(&self.root, err))? {
            let Some(year) = digits_dir_name(&year_entry).await else { continue };
            let year_path = year_entry.path();
            let mut months = fs::read_dir(&year_path).await.map_err(|err| io_err(&year_path, err))?;
            while let Some(month_entry) = months.next_entry().await.map_err(|err| io_err(&year_path, err))? {
                let Some(month) = digits_dir_name(&month_entry).await else { continue };
                let month_path = month_entry.path();
                let mut day_entries = fs::read_dir(&month_path).await.map_err(|err| io_err(&month_path, err))?;
                while let Some(day_entry) = day_entries.next_entry().await.map_err(|err| io_err(&month_path, err))? {
                    let Some(day) = digits_dir_name(&day_entry).await else { continue };
                    let Some(dir_date) = parse_ymd(&year, &month, &day) else { continue };
                    if dir_date >= cutoff {
                        continue;
                    }
                    let day_path = day_entry.path();
                    let mut files = fs::read_dir(&day_path).await.map_err(|err| io_err(&day_path, err))?;
                    while let Some(file_entry) = files.next_entry().await.map_err(|err| io_err(&day_path, err))? {
                        if !file_entry.file_type().await.map(|ft| ft.is_file()).unwrap_or(false) {
                            continue;
                        }
                        let path = file_entry.path();
                        match fs::remove_file(&path).await {
                            Ok(()) => removed += 1,
                            Err(err) => tracing::warn!(path = %path.display(), error = %err, "cleanup_expired: failed to remove backup file"),
                        }
                    }
                    let _ = fs::remove_dir(&day_path).await;
                }
                let _ = fs::remove_dir(&month_path).await;
            }
            let _ = fs::remove_dir(&year_path).await;
        }
        if removed > 0 {
            tracing::info!(removed, retention_days = self.retention_days, "cleanup_expired: removed expired backups");
        }
        Ok(removed)
    }
}

async fn digits_dir_name(entry: &DirEntry) -> Option<String> {
    if !entry.file_type().await.map(|ft| ft.is_dir()).unwrap_or(false) {
        return None;
    }
    let name = entry.file_name().to_string_lossy().into_owned();
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) {
        Some(name)
    } else {
        None
    }
}

fn parse_ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn timestamp_suffix(at: DateTime<Utc>) -> String {
    format!("{}_{:06}", at.format("%H%M%S"), at.timestamp_subsec_micros())
}

fn strip_backup_extensions(file_name: &str) -> String {
    file_name.strip_suffix(".gz").unwrap_or(file_name).strip_suffix(".json").unwrap_or(file_name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_core::{MatchSpec, Provenance, ResponseSpec};
    use tempfile::tempdir;

    fn sample_stub(id: &str) -> Stub {
        Stub {
            id: id.to_string(),
            name: format!("GET /api/{id}"),
            match_spec: MatchSpec {
                method: "GET".into(),
                url_path: format!("/api/{id}"),
                query_parameters: None,
                headers: None,
                body_patterns: None,
            },
            response_spec: ResponseSpec { status: 200, headers: None, json_body: Some(serde_json::json!({"ok": true})), body: None },
            metadata: Provenance {
                generated_by: "mockmesh-collector".into(),
                generated_at: Utc::now(),
                request_hash: id.to_string(),
                original_path: format!("/api/{id}"),
            },
        }
    }

    #[tokio::test]
    async fn round_trips_uncompressed_single() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path(), false, 30);
        let stub = sample_stub("abc");
        let record = store.backup_single(&stub).await.unwrap();
        assert!(matches!(record.id, BackupId::Single(ref id) if id == "abc"));

        let files = store.list_backups(None, 30).await.unwrap();
        assert_eq!(files.len(), 1);

        let backups = store.list_backups(Some("abc"), 30).await.unwrap();
        assert_eq!(backups.len(), 1);
    }

    #[tokio::test]
    async fn round_trips_compressed_batch() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path(), true, 30);
        let stubs = vec![sample_stub("a"), sample_stub("b")];
        let record = store.backup_batch(&stubs).await.unwrap().unwrap();
        assert!(matches!(record.id, BackupId::Batch(ref count) if count == "2"));

        let day_dir = store.day_dir(Utc::now());
        let mut entries = fs::read_dir(&day_dir).await.unwrap();
        let entry = entries.next_entry().await.unwrap().unwrap();
        let path = entry.path();
        assert!(path.to_string_lossy().ends_with(".json.gz"));

        match store.restore(&path).await.unwrap() {
            RestoredBackup::Batch(restored) => {
                assert_eq!(restored.len(), 2);
                assert_eq!(restored[0].id, "a");
            }
            RestoredBackup::Single(_) => panic!("expected a batch restore"),
        }
    }

    #[tokio::test]
    async fn backup_batch_of_empty_slice_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path(), false, 30);
        assert!(store.backup_batch(&[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path(), false, 30);
        let err = store.restore(&dir.path().join("missing.json")).await.unwrap_err();
        assert!(matches!(err, BackupError::NotFound(_)));
    }

    #[tokio::test]
    async fn cleanup_expired_removes_old_days_and_prunes_empty_dirs() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path(), false, 1);
        let old_day = dir.path().join("2020").join("01").join("01");
        fs::create_dir_all(&old_day).await.unwrap();
        fs::write(old_day.join("stale_000000_000000.json"), b"{}").await.unwrap();

        let removed = store.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(!old_day.exists());
        assert!(!dir.path().join("2020").exists());
    }

    #[tokio::test]
    async fn cleanup_expired_is_noop_when_retention_is_zero() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path(), false, 0);
        let stub = sample_stub("abc");
        store.backup_single(&stub).await.unwrap();
        assert_eq!(store.cleanup_expired().await.unwrap(), 0);
        assert_eq!(store.list_backups(None, 9999).await.unwrap().len(), 1);
    }
}
