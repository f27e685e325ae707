//! WinCache Backend
//!
//! In-process user cache that enforces TTL itself through moka's per-entry
//! expiry, so expired records are never handed back by a lookup.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde_json::{json, Value};
use tracing::debug;

use crate::cache::{CacheBackend, CacheDriver, CacheMetadata, Clock, StoredRecord};
use crate::config::WincacheConfig;

/// Longest TTL handed to moka; larger values would overflow its `Instant` math.
const MAX_NATIVE_TTL: u64 = 100 * 365 * 24 * 3600;

// == Record Expiry ==
/// Per-entry expiry read from the stored record's TTL.
struct RecordExpiry;

impl RecordExpiry {
    fn ttl_of(record: &StoredRecord) -> Option<Duration> {
        (record.ttl > 0).then(|| Duration::from_secs(record.ttl.min(MAX_NATIVE_TTL)))
    }
}

impl Expiry<String, StoredRecord> for RecordExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredRecord,
        _created_at: Instant,
    ) -> Option<Duration> {
        Self::ttl_of(value)
    }

    // An overwrite restarts the TTL from the new record.
    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredRecord,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Self::ttl_of(value)
    }
}

// == WinCache ==
/// Cache backend over an in-process moka cache.
///
/// `delete` returns `false` when the key was not stored. `clean` only drops
/// keys carrying this instance's prefix.
pub struct WincacheCache {
    cache: Cache<String, StoredRecord>,
    enabled: bool,
    max_entries: u64,
    key_prefix: String,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl WincacheCache {
    // == Constructor ==
    pub fn new(config: &WincacheConfig, key_prefix: &str, clock: Arc<dyn Clock>) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(RecordExpiry)
            .build();

        Self {
            cache,
            enabled: config.enabled,
            max_entries: config.max_entries,
            key_prefix: key_prefix.to_string(),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    // == Lookup ==
    /// Reads a record and bumps the hit or miss counter.
    async fn lookup(&self, key: &str) -> Option<StoredRecord> {
        let found = self.cache.get(key).await;
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }
}

#[async_trait]
impl CacheBackend for WincacheCache {
    fn driver(&self) -> CacheDriver {
        CacheDriver::Wincache
    }

    // == Is Supported ==
    fn is_supported(&self) -> bool {
        if !self.enabled {
            debug!("WinCache: user cache disabled by configuration");
        }
        self.enabled
    }

    // == Get ==
    async fn get(&self, key: &str) -> Option<Value> {
        self.lookup(key).await.map(|record| record.value)
    }

    // == Save ==
    async fn save(&self, key: &str, value: Value, ttl: u64) -> bool {
        let record = StoredRecord::new(value, ttl, self.clock.now());
        self.cache.insert(key.to_string(), record).await;
        true
    }

    // == Delete ==
    async fn delete(&self, key: &str) -> bool {
        self.cache.remove(key).await.is_some()
    }

    // == Clean ==
    async fn clean(&self) -> bool {
        if self.key_prefix.is_empty() {
            self.cache.invalidate_all();
        } else {
            let doomed: Vec<Arc<String>> = self
                .cache
                .iter()
                .filter(|(key, _)| key.starts_with(&self.key_prefix))
                .map(|(key, _)| key)
                .collect();
            for key in doomed {
                self.cache.invalidate(key.as_str()).await;
            }
        }
        self.cache.run_pending_tasks().await;
        true
    }

    // == Cache Info ==
    /// `kind`: `None` for counters plus the entry list, `"summary"` for
    /// counters only.
    async fn cache_info(&self, kind: Option<&str>) -> Option<Value> {
        self.cache.run_pending_tasks().await;
        let mut info = json!({
            "total_hit_count": self.hits.load(Ordering::Relaxed),
            "total_miss_count": self.misses.load(Ordering::Relaxed),
            "total_item_count": self.cache.entry_count(),
            "max_entries": self.max_entries,
        });

        match kind {
            None => {
                let entries: Vec<Value> = self
                    .cache
                    .iter()
                    .map(|(key, record)| {
                        json!({
                            "key_name": key.as_str(),
                            "ttl_seconds": record.ttl,
                            "age_seconds": self.clock.now() - record.stored_at,
                        })
                    })
                    .collect();
                info["ucache_entries"] = Value::Array(entries);
                Some(info)
            }
            Some("summary") => Some(info),
            Some(other) => {
                debug!("WinCache: unsupported info type '{}'", other);
                None
            }
        }
    }

    // == Metadata ==
    async fn get_metadata(&self, key: &str) -> Option<CacheMetadata> {
        self.cache.get(key).await.map(|record| record.metadata())
    }
}
