// src/pipeline/verdict.rs

//! Change-aware verdict pipeline.
//!
//! Fetches the combined menu feed, fingerprints it, and only asks the
//! generator for a new verdict when the cached one is stale or was computed
//! from a different feed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::TimeDelta;

use crate::error::Result;
use crate::models::{CacheEntry, DayKey, Fingerprint, VerdictPayload};
use crate::services::{MenuSource, VerdictGenerator};
use crate::storage::CacheStore;

/// The combined feed of every source plus its fingerprint.
#[derive(Debug, Clone)]
pub struct Feed {
    pub text: String,
    pub fingerprint: Fingerprint,
}

impl Feed {
    pub fn new(text: String) -> Self {
        Self {
            fingerprint: Fingerprint::of(&text),
            text,
        }
    }
}

pub struct VerdictPipeline {
    sources: Vec<Arc<dyn MenuSource>>,
    generator: Arc<dyn VerdictGenerator>,
    store: Arc<CacheStore>,
    freshness: TimeDelta,
}

impl VerdictPipeline {
    pub fn new(
        sources: Vec<Arc<dyn MenuSource>>,
        generator: Arc<dyn VerdictGenerator>,
        store: Arc<CacheStore>,
        freshness: TimeDelta,
    ) -> Self {
        Self {
            sources,
            generator,
            store,
            freshness,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Fetch every source and concatenate the sections in source order.
    ///
    /// A failing source contributes an error marker instead of its menu, so
    /// the fingerprint changes once the source recovers.
    pub async fn fetch_feed(&self) -> Feed {
        let mut text = String::new();
        for source in &self.sources {
            let section = match source.fetch_menu().await {
                Ok(menu) => menu,
                Err(e) => {
                    log::warn!("Failed to fetch {}: {}", source.name(), e);
                    format!("Error scraping: {}", e)
                }
            };
            text.push_str(&format!("--- {} ---\n{}\n\n", source.name(), section));
        }

        let feed = Feed::new(text);
        log::debug!(
            "Feed: {} sources, {} bytes, fingerprint {}",
            self.sources.len(),
            feed.text.len(),
            feed.fingerprint
        );
        feed
    }

    /// Verdict for a single day, regenerating only when needed.
    ///
    /// A cached entry is reused when it is fresh and its fingerprint matches
    /// the current feed, unless `force_refresh` is set. Returns `None` when
    /// generation fails; the cache is left untouched in that case.
    pub async fn run_for_day(&self, key: &DayKey, force_refresh: bool) -> Option<VerdictPayload> {
        let feed = self.fetch_feed().await;
        self.run_for_day_with_feed(key, &feed, force_refresh).await
    }

    pub async fn run_for_day_with_feed(
        &self,
        key: &DayKey,
        feed: &Feed,
        force_refresh: bool,
    ) -> Option<VerdictPayload> {
        if !force_refresh {
            if let Some(entry) = self.store.get(key).await {
                let age = self.store.now() - entry.timestamp;
                if age < self.freshness && entry.fingerprint == feed.fingerprint {
                    log::info!("Using cached verdict for {}", key);
                    return Some(entry.verdict);
                }
            }
        }

        log::info!("Generating verdict for {}", key);
        let verdict = match self.generator.generate(&feed.text, key).await {
            Ok(verdict) => verdict,
            Err(e) => {
                log::error!("Verdict generation for {} failed: {}", key, e);
                return None;
            }
        };

        if let Err(e) = self
            .store
            .upsert(key, verdict.clone(), feed.fingerprint.clone())
            .await
        {
            log::warn!("Verdict for {} not cached: {}", key, e);
        }
        Some(verdict)
    }

    /// Batch-refresh `keys` against one fetch of the feed.
    ///
    /// Age is ignored here: an entry is reused iff its fingerprint matches,
    /// and reused entries get their timestamp refreshed. Results are merged
    /// into the latest persisted mapping under the store's write locks and
    /// written once at the end. Days whose generation failed keep their
    /// previous entry and are left out of the result.
    pub async fn run_for_week(&self, keys: &[DayKey]) -> Result<BTreeMap<DayKey, VerdictPayload>> {
        let feed = self.fetch_feed().await;
        self.run_for_week_with_feed(keys, &feed).await
    }

    pub async fn run_for_week_with_feed(
        &self,
        keys: &[DayKey],
        feed: &Feed,
    ) -> Result<BTreeMap<DayKey, VerdictPayload>> {
        let snapshot = self.store.load().await;
        let mut results = BTreeMap::new();
        let mut reused_keys = Vec::new();
        let mut generated_entries = Vec::new();
        let mut failed = 0usize;

        // Generation runs without holding any lock; the merge below re-reads.
        for key in keys {
            if let Some(entry) = snapshot
                .get(key)
                .filter(|entry| entry.fingerprint == feed.fingerprint)
            {
                results.insert(key.clone(), entry.verdict.clone());
                reused_keys.push(key.clone());
                continue;
            }

            match self.generator.generate(&feed.text, key).await {
                Ok(verdict) => {
                    results.insert(key.clone(), verdict.clone());
                    generated_entries.push((key.clone(), verdict));
                }
                Err(e) => {
                    log::error!("Verdict generation for {} failed: {}", key, e);
                    failed += 1;
                }
            }
        }

        let (reused, generated) = (reused_keys.len(), generated_entries.len());
        let now = self.store.now();
        let fingerprint = feed.fingerprint.clone();
        self.store
            .modify(move |entries| {
                for key in &reused_keys {
                    if let Some(entry) = entries
                        .get_mut(key)
                        .filter(|entry| entry.fingerprint == fingerprint)
                    {
                        entry.timestamp = now;
                    }
                }
                for (key, verdict) in generated_entries {
                    entries.insert(key, CacheEntry::new(now, verdict, fingerprint.clone()));
                }
            })
            .await?;

        log::info!(
            "Week refresh: {} reused, {} generated, {} failed",
            reused,
            generated,
            failed
        );
        Ok(results)
    }
}
