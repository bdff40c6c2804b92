//! Result cache storage and key derivation.

use crate::{auth::AuthTier, driver::ResultSet, error::Result};
use async_trait::async_trait;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// One rendered page of typed records plus the total row count of the
/// unsliced query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub results: Vec<Value>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CacheValue {
    /// The full unsliced result of a query, re-sorted and sliced in memory.
    Window(ResultSet),
    Page(Page),
    Csv(String),
    /// The unsliced query was too large to keep as a window.
    Skip { total: u64 },
}

/// Shared key-value store behind the result cache. Writes are last-writer
/// wins and there is no cross-request locking.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Arc<CacheValue>>>;

    async fn set(&self, key: &str, value: CacheValue) -> Result<()>;
}

/// In-process store with size-bounded eviction and no TTL.
pub struct MemoryCache {
    entries: Cache<String, Arc<CacheValue>>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_capacity).build(),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Arc<CacheValue>>> {
        Ok(self.entries.get(key))
    }

    async fn set(&self, key: &str, value: CacheValue) -> Result<()> {
        self.entries.insert(key.to_string(), Arc::new(value));
        Ok(())
    }
}

/// Store used when caching is disabled.
pub struct NoCache;

#[async_trait]
impl CacheStore for NoCache {
    async fn get(&self, _key: &str) -> Result<Option<Arc<CacheValue>>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: CacheValue) -> Result<()> {
        Ok(())
    }
}

pub const JSON_TAG: &str = "json";
pub const CSV_TAG: &str = "csv";
pub const EXPORT_TAG: &str = "export";
pub const WINDOW_TAG: &str = "precached-window";
pub const SKIP_TAG: &str = "skip-window";

/// Shape of raw backend rows. Views rendering the same SQL share them.
pub const RAW_SHAPE: &str = "raw";

/// Stable key over `(purpose tag, output shape, auth tier, canonical query
/// string)`. The shape is the view name for rendered output, since two views
/// can run the same SQL and finish its rows differently.
pub fn cache_key(tag: &str, shape: &str, tier: AuthTier, canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tag.as_bytes());
    hasher.update([0u8]);
    hasher.update(shape.as_bytes());
    hasher.update([0u8]);
    hasher.update([tier.flag()]);
    hasher.update([0u8]);
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
