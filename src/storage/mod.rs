//! Persisted state for the bot.
//!
//! Three independent resources live under the storage directory:
//!
//! ```text
//! storage/
//! ├── menu_cache.json       # Day → verdict + fingerprint + timestamp
//! ├── poll_offset.txt       # Last consumed update id
//! ├── feedback.jsonl        # Append-only user feedback
//! └── menu_data.json        # Dashboard export
//! ```
//!
//! Backends are injected behind [`CacheStorage`], [`OffsetStorage`] and
//! [`FeedbackStorage`] so the pipeline and poller can run against
//! [`MemoryStorage`] in tests.

pub mod cache_store;
pub mod local;
pub mod lock;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::CacheMap;

// Re-export for convenience
pub use cache_store::CacheStore;
pub use local::LocalStorage;
pub use lock::FileLock;
pub use memory::MemoryStorage;

/// Raw access to the persisted verdict cache.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Read the whole mapping. `Ok(None)` when nothing was ever written.
    async fn read_cache(&self) -> Result<Option<CacheMap>>;

    /// Replace the whole mapping.
    async fn write_cache(&self, entries: &CacheMap) -> Result<()>;

    /// Take the cross-process write lock, if the backend has one.
    ///
    /// The returned guard must be held across a read-modify-write.
    async fn lock_cache(&self) -> Result<Option<FileLock>> {
        Ok(None)
    }
}

/// Persisted poll offset.
#[async_trait]
pub trait OffsetStorage: Send + Sync {
    /// Last consumed update id, `Ok(None)` before the first one.
    async fn read_offset(&self) -> Result<Option<i64>>;

    async fn write_offset(&self, offset: i64) -> Result<()>;
}

/// One piece of user feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub chat_id: i64,
    #[serde(default)]
    pub sender: Option<String>,
    pub text: String,
}

/// Append-only feedback log.
#[async_trait]
pub trait FeedbackStorage: Send + Sync {
    async fn append_feedback(&self, record: &FeedbackRecord) -> Result<()>;
}
