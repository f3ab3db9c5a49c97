//! In-memory storage backend.
//!
//! Used by tests and dry runs. Records every write so callers can assert on
//! how often the persisted state was touched.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::CacheMap;
use crate::storage::{CacheStorage, FeedbackRecord, FeedbackStorage, OffsetStorage};

#[derive(Debug, Default)]
pub struct MemoryStorage {
    cache: Mutex<Option<CacheMap>>,
    cache_writes: AtomicUsize,
    corrupt: AtomicBool,
    fail_writes: AtomicBool,
    offset: Mutex<Option<i64>>,
    offset_writes: Mutex<Vec<i64>>,
    feedback: Mutex<Vec<FeedbackRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given cache contents.
    pub fn with_cache(entries: CacheMap) -> Self {
        let storage = Self::default();
        *lock(&storage.cache) = Some(entries);
        storage
    }

    /// Start with the given poll offset.
    pub fn with_offset(offset: i64) -> Self {
        let storage = Self::default();
        *lock(&storage.offset) = Some(offset);
        storage
    }

    /// Make cache reads fail as if the persisted file were unreadable.
    pub fn set_corrupt(&self, corrupt: bool) {
        self.corrupt.store(corrupt, Ordering::SeqCst);
    }

    /// Make every write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Current cache contents.
    pub fn snapshot(&self) -> CacheMap {
        lock(&self.cache).clone().unwrap_or_default()
    }

    /// Number of successful cache writes so far.
    pub fn cache_writes(&self) -> usize {
        self.cache_writes.load(Ordering::SeqCst)
    }

    pub fn offset(&self) -> Option<i64> {
        *lock(&self.offset)
    }

    /// Every offset written, in order.
    pub fn offset_history(&self) -> Vec<i64> {
        lock(&self.offset_writes).clone()
    }

    pub fn feedback(&self) -> Vec<FeedbackRecord> {
        lock(&self.feedback).clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Io(std::io::Error::other("memory storage is read-only")));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn read_cache(&self) -> Result<Option<CacheMap>> {
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(AppError::validation("cache contents are corrupt"));
        }
        Ok(lock(&self.cache).clone())
    }

    async fn write_cache(&self, entries: &CacheMap) -> Result<()> {
        self.check_writable()?;
        *lock(&self.cache) = Some(entries.clone());
        self.corrupt.store(false, Ordering::SeqCst);
        self.cache_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl OffsetStorage for MemoryStorage {
    async fn read_offset(&self) -> Result<Option<i64>> {
        Ok(*lock(&self.offset))
    }

    async fn write_offset(&self, offset: i64) -> Result<()> {
        self.check_writable()?;
        *lock(&self.offset) = Some(offset);
        lock(&self.offset_writes).push(offset);
        Ok(())
    }
}

#[async_trait]
impl FeedbackStorage for MemoryStorage {
    async fn append_feedback(&self, record: &FeedbackRecord) -> Result<()> {
        self.check_writable()?;
        lock(&self.feedback).push(record.clone());
        Ok(())
    }
}
