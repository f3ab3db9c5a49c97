//! Local filesystem storage implementation.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml           # Bot configuration
//! ├── menu_cache.json       # Verdict cache (atomic full rewrites)
//! ├── menu_cache.json.lock  # Present while a writer holds the cache
//! ├── poll_offset.txt       # Last consumed update id
//! ├── feedback.jsonl        # Feedback log
//! └── menu_data.json        # Dashboard export
//! ```
//!
//! Every JSON write goes to a temp file first and is renamed into place, so a
//! crash mid-write leaves the previous version intact.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{CacheConfig, CacheMap};
use crate::storage::{CacheStorage, FeedbackRecord, FeedbackStorage, FileLock, OffsetStorage};

/// How long a writer waits for a busy lock before giving up.
const LOCK_WAIT: Duration = Duration::from_secs(5);

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    cache_file: String,
    offset_file: String,
    feedback_file: String,
    dashboard_file: String,
    lock_stale_after: Duration,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory with default file names.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        let defaults = CacheConfig::default();
        Self {
            root_dir: root_dir.into(),
            ..Self::from_config(&defaults)
        }
    }

    /// Create a LocalStorage laid out as described by the cache configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            root_dir: config.dir.clone(),
            cache_file: config.cache_file.clone(),
            offset_file: config.offset_file.clone(),
            feedback_file: config.feedback_file.clone(),
            dashboard_file: config.dashboard_file.clone(),
            lock_stale_after: Duration::from_secs(config.lock_stale_secs),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    pub fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    pub fn dashboard_key(&self) -> &str {
        &self.dashboard_file
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data atomically.
    pub async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    pub async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn lock(&self, key: &str) -> Result<FileLock> {
        FileLock::acquire(&self.path(key), self.lock_stale_after, LOCK_WAIT).await
    }
}

#[async_trait]
impl CacheStorage for LocalStorage {
    async fn read_cache(&self) -> Result<Option<CacheMap>> {
        self.read_json(&self.cache_file).await
    }

    async fn write_cache(&self, entries: &CacheMap) -> Result<()> {
        self.write_json(&self.cache_file, entries).await?;
        log::debug!(
            "Cache: {} entries written to {}",
            entries.len(),
            self.cache_file
        );
        Ok(())
    }

    async fn lock_cache(&self) -> Result<Option<FileLock>> {
        Ok(Some(self.lock(&self.cache_file).await?))
    }
}

#[async_trait]
impl OffsetStorage for LocalStorage {
    async fn read_offset(&self) -> Result<Option<i64>> {
        let Some(bytes) = self.read_bytes(&self.offset_file).await? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes);
        let offset = text.trim().parse::<i64>().map_err(|e| {
            AppError::validation(format!("{} is not an integer: {}", self.offset_file, e))
        })?;
        Ok(Some(offset))
    }

    async fn write_offset(&self, offset: i64) -> Result<()> {
        let _guard = self.lock(&self.offset_file).await?;
        self.write_bytes(&self.offset_file, offset.to_string().as_bytes())
            .await
    }
}

#[async_trait]
impl FeedbackStorage for LocalStorage {
    async fn append_feedback(&self, record: &FeedbackRecord) -> Result<()> {
        let path = self.path(&self.feedback_file);
        self.ensure_dir(&path).await?;

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CacheEntry, DayKey, Fingerprint, VerdictPayload};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_cache() -> CacheMap {
        let mut cache = CacheMap::new();
        cache.insert(
            DayKey::from("Monday"),
            CacheEntry::new(
                Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap(),
                VerdictPayload::new(json!({
                    "day": "Monday",
                    "cafeterias": [{"name": "A La Carte", "type": "individual", "safe_options": ["라면"], "avoid": []}]
                })),
                Fingerprint::from("f1"),
            ),
        );
        cache
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write_bytes("test.txt", b"hello").await.unwrap();
        let data = storage.read_bytes("test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(storage.read_bytes("nope.txt").await.unwrap().is_none());
        assert!(storage.read_cache().await.unwrap().is_none());
        assert!(storage.read_offset().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_round_trip_is_lossless() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let cache = sample_cache();

        storage.write_cache(&cache).await.unwrap();
        let loaded = storage.read_cache().await.unwrap().unwrap();

        assert_eq!(loaded, cache);
        assert!(!tmp.path().join("menu_cache.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_an_error_at_this_layer() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("menu_cache.json"), "{ not json").unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(storage.read_cache().await.is_err());
    }

    #[tokio::test]
    async fn test_offset_is_plain_integer_text() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write_offset(815_004_221).await.unwrap();
        let raw = std::fs::read_to_string(tmp.path().join("poll_offset.txt")).unwrap();
        assert_eq!(raw, "815004221");
        assert_eq!(storage.read_offset().await.unwrap(), Some(815_004_221));
        assert!(!tmp.path().join("poll_offset.txt.lock").exists());
    }

    #[tokio::test]
    async fn test_feedback_appends_json_lines() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let record = |text: &str| FeedbackRecord {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap(),
            chat_id: 9,
            sender: Some("mina".to_string()),
            text: text.to_string(),
        };

        storage.append_feedback(&record("first")).await.unwrap();
        storage.append_feedback(&record("second")).await.unwrap();

        let raw = std::fs::read_to_string(tmp.path().join("feedback.jsonl")).unwrap();
        let lines: Vec<FeedbackRecord> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].text, "second");
    }

    #[tokio::test]
    async fn test_lock_cache_holds_sibling_file() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let guard = storage.lock_cache().await.unwrap();
        assert!(tmp.path().join("menu_cache.json.lock").exists());
        drop(guard);
        assert!(!tmp.path().join("menu_cache.json.lock").exists());
    }
}
