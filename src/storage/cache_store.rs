//! Change-aware verdict cache.
//!
//! Owns every [`CacheEntry`]: at most one per [`DayKey`], never deleted, only
//! superseded. Mutations rewrite the whole persisted mapping.
//!
//! Writers are serialized twice: an in-process mutex orders tasks sharing one
//! store, and the backend's lock file (if any) excludes other processes for
//! the span of a read-modify-write.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{CacheEntry, CacheMap, DayKey, Fingerprint, VerdictPayload};
use crate::storage::CacheStorage;
use crate::utils::clock::{Clock, SystemClock};

pub struct CacheStore {
    backend: Arc<dyn CacheStorage>,
    clock: Arc<dyn Clock>,
    writer: Mutex<()>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheStorage>) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: Arc<dyn CacheStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            writer: Mutex::new(()),
        }
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Read the persisted mapping.
    ///
    /// Missing or unreadable state is a cold start, never an error.
    pub async fn load(&self) -> CacheMap {
        match self.backend.read_cache().await {
            Ok(Some(entries)) => entries,
            Ok(None) => CacheMap::new(),
            Err(e) => {
                log::warn!("Cache unreadable, starting empty: {}", e);
                CacheMap::new()
            }
        }
    }

    pub async fn get(&self, key: &DayKey) -> Option<CacheEntry> {
        self.load().await.remove(key)
    }

    /// Set `key` to a fresh entry and persist the whole mapping.
    pub async fn upsert(
        &self,
        key: &DayKey,
        verdict: VerdictPayload,
        fingerprint: Fingerprint,
    ) -> Result<CacheEntry> {
        let _writer = self.writer.lock().await;
        let _lock = self.backend.lock_cache().await?;

        let mut entries = self.load().await;
        let entry = CacheEntry::new(self.now(), verdict, fingerprint);
        entries.insert(key.clone(), entry.clone());
        self.backend.write_cache(&entries).await?;

        log::debug!("Cache: stored {} ({})", key, entry.fingerprint);
        Ok(entry)
    }

    /// Apply `change` to the freshly loaded mapping and persist the result.
    ///
    /// The load and the write happen under both write locks, so entries
    /// written by others since any earlier read are preserved.
    pub async fn modify<F>(&self, change: F) -> Result<CacheMap>
    where
        F: FnOnce(&mut CacheMap) + Send,
    {
        let _writer = self.writer.lock().await;
        let _lock = self.backend.lock_cache().await?;

        let mut entries = self.load().await;
        change(&mut entries);
        self.backend.write_cache(&entries).await?;
        Ok(entries)
    }

    /// Unconditionally overwrite the whole persisted mapping.
    pub async fn replace_all(&self, entries: &CacheMap) -> Result<()> {
        let _writer = self.writer.lock().await;
        let _lock = self.backend.lock_cache().await?;
        self.backend.write_cache(entries).await
    }

    /// True iff an entry exists for `key` and is younger than `max_age`.
    pub async fn is_fresh(&self, key: &DayKey, max_age: TimeDelta) -> bool {
        self.get(key)
            .await
            .is_some_and(|entry| self.now() - entry.timestamp < max_age)
    }

    /// True iff an entry exists for `key` and was computed from `fingerprint`.
    pub async fn matches_fingerprint(&self, key: &DayKey, fingerprint: &Fingerprint) -> bool {
        self.get(key)
            .await
            .is_some_and(|entry| &entry.fingerprint == fingerprint)
    }
}
