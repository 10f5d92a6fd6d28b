//! Storage backends for the context cache.
//!
//! A backend stores opaque serialized entries and a set of monotonically
//! increasing counters. It never needs to enumerate keys.

use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;
use lru::LruCache;
use thiserror::Error;
use time::OffsetDateTime;

use super::config::CacheConfig;
use super::keys::{VersionKey, VersionStamp};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Backend and codec failures. These never escape [`super::ContextCache`].
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// JSON encoded value.
    pub payload: String,
    pub stamp: VersionStamp,
    pub expires_at: OffsetDateTime,
}

impl StoredEntry {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<StoredEntry>, CacheError>;

    async fn store(&self, key: String, entry: StoredEntry) -> Result<(), CacheError>;

    /// Current counter value; counters start at zero.
    async fn version(&self, key: &VersionKey) -> Result<u64, CacheError>;

    /// Atomically increments the counter and returns the new value.
    async fn increment(&self, key: &VersionKey) -> Result<u64, CacheError>;
}

/// In-process backend: LRU-bounded entries and per-key atomic counters.
pub struct MemoryBackend {
    entries: RwLock<LruCache<String, StoredEntry>>,
    versions: DashMap<VersionKey, u64>,
}

impl MemoryBackend {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.entry_limit_non_zero())),
            versions: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn load(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        // `peek` keeps readers on the shared lock.
        Ok(rw_read(&self.entries, SOURCE, "load").peek(key).cloned())
    }

    async fn store(&self, key: String, entry: StoredEntry) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "store").put(key, entry);
        Ok(())
    }

    async fn version(&self, key: &VersionKey) -> Result<u64, CacheError> {
        Ok(self.versions.get(key).map_or(0, |value| *value))
    }

    async fn increment(&self, key: &VersionKey) -> Result<u64, CacheError> {
        let mut slot = self.versions.entry(key.clone()).or_insert(0);
        *slot += 1;
        Ok(*slot)
    }
}
