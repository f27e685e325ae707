//! APC Backend
//!
//! Process-wide shared memory segment. Every facade bound to this driver in
//! the same process sees the same entries, the way every request in a PHP
//! worker shares the APC user cache.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::debug;

use crate::cache::{CacheBackend, CacheDriver, CacheMetadata, CacheStats, Clock, StoredRecord};
use crate::config::ApcConfig;

// == Shared Segment ==
/// Shared user cache holding `StoredRecord`s with native TTL enforcement.
#[derive(Debug, Default)]
pub struct ApcSegment {
    inner: Mutex<SegmentState>,
}

#[derive(Debug, Default)]
struct SegmentState {
    entries: HashMap<String, StoredRecord>,
    stats: CacheStats,
}

impl ApcSegment {
    pub fn new() -> Self {
        Self::default()
    }

    /// The segment shared by the whole process.
    pub fn global() -> Arc<ApcSegment> {
        static GLOBAL: OnceLock<Arc<ApcSegment>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ApcSegment::new())).clone()
    }

    /// Fetches a live record. The found flag comes from the map lookup, so a
    /// stored `null` is still a hit.
    fn fetch(&self, key: &str, now: i64) -> Option<StoredRecord> {
        let mut state = self.inner.lock();
        let Some(expired) = state.entries.get(key).map(|r| r.is_expired(now)) else {
            state.stats.record_miss();
            return None;
        };

        if expired {
            state.entries.remove(key);
            state.stats.record_expunge();
            state.stats.record_miss();
            let count = state.entries.len();
            state.stats.set_total_entries(count);
            return None;
        }

        state.stats.record_hit();
        state.entries.get(key).cloned()
    }

    fn store(&self, key: &str, record: StoredRecord, now: i64) {
        let mut state = self.inner.lock();
        Self::purge_expired(&mut state, now);
        state.entries.insert(key.to_string(), record);
        state.stats.record_insert();
        let count = state.entries.len();
        state.stats.set_total_entries(count);
    }

    fn remove(&self, key: &str) -> bool {
        let mut state = self.inner.lock();
        let removed = state.entries.remove(key).is_some();
        let count = state.entries.len();
        state.stats.set_total_entries(count);
        removed
    }

    // == Expunge ==
    /// Drops every record whose TTL has elapsed, counting each as an expunge.
    fn purge_expired(state: &mut SegmentState, now: i64) {
        let before = state.entries.len();
        state.entries.retain(|_, record| !record.is_expired(now));
        let expunged = before - state.entries.len();
        if expunged == 0 {
            return;
        }
        state.stats.record_expunges(expunged);
        let count = state.entries.len();
        state.stats.set_total_entries(count);
        debug!("APC cache: expunged {} expired entries", expunged);
    }

    /// Drops every key starting with `prefix`; an empty prefix clears all.
    fn clear(&self, prefix: &str) {
        let mut state = self.inner.lock();
        state.entries.retain(|key, _| !key.starts_with(prefix));
        let count = state.entries.len();
        state.stats.set_total_entries(count);
    }

    fn info(&self, with_list: bool, now: i64) -> Value {
        let mut state = self.inner.lock();
        Self::purge_expired(&mut state, now);
        let mut info = json!({
            "num_hits": state.stats.hits,
            "num_misses": state.stats.misses,
            "num_inserts": state.stats.inserts,
            "expunges": state.stats.expunges,
            "num_entries": state.entries.len(),
            "hit_rate": state.stats.hit_rate(),
        });
        if with_list {
            let list: Vec<Value> = state
                .entries
                .iter()
                .map(|(key, record)| {
                    json!({
                        "key": key,
                        "creation_time": record.stored_at,
                        "ttl": record.ttl,
                    })
                })
                .collect();
            info["cache_list"] = Value::Array(list);
        }
        info
    }
}

// == APC Cache ==
/// Cache backend over an [`ApcSegment`].
///
/// `delete` returns `false` when the key was not stored. `clean` only drops
/// keys carrying this instance's prefix.
#[derive(Debug)]
pub struct ApcCache {
    segment: Arc<ApcSegment>,
    enabled: bool,
    key_prefix: String,
    clock: Arc<dyn Clock>,
}

impl ApcCache {
    pub fn new(config: &ApcConfig, key_prefix: &str, clock: Arc<dyn Clock>) -> Self {
        Self::with_segment(ApcSegment::global(), config, key_prefix, clock)
    }

    pub fn with_segment(
        segment: Arc<ApcSegment>,
        config: &ApcConfig,
        key_prefix: &str,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            segment,
            enabled: config.enabled,
            key_prefix: key_prefix.to_string(),
            clock,
        }
    }
}

#[async_trait]
impl CacheBackend for ApcCache {
    fn driver(&self) -> CacheDriver {
        CacheDriver::Apc
    }

    fn is_supported(&self) -> bool {
        if !self.enabled {
            debug!("APC cache: shared segment disabled by configuration");
        }
        self.enabled
    }

    async fn get(&self, key: &str) -> Option<Value> {
        self.segment
            .fetch(key, self.clock.now())
            .map(|record| record.value)
    }

    async fn save(&self, key: &str, value: Value, ttl: u64) -> bool {
        let now = self.clock.now();
        self.segment.store(key, StoredRecord::new(value, ttl, now), now);
        true
    }

    async fn delete(&self, key: &str) -> bool {
        self.segment.remove(key)
    }

    async fn clean(&self) -> bool {
        self.segment.clear(&self.key_prefix);
        true
    }

    /// `kind`: `None` or `"user"` for counters plus the entry list,
    /// `"summary"` for counters only.
    async fn cache_info(&self, kind: Option<&str>) -> Option<Value> {
        match kind {
            None | Some("user") => Some(self.segment.info(true, self.clock.now())),
            Some("summary") => Some(self.segment.info(false, self.clock.now())),
            Some(other) => {
                debug!("APC cache: unsupported info type '{}'", other);
                None
            }
        }
    }

    async fn get_metadata(&self, key: &str) -> Option<CacheMetadata> {
        self.segment
            .fetch(key, self.clock.now())
            .map(|record| record.metadata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;

    const START: i64 = 1_700_000_000;

    fn apc_cache(prefix: &str) -> (ApcCache, Arc<ManualClock>, Arc<ApcSegment>) {
        let clock = Arc::new(ManualClock::new(START));
        let segment = Arc::new(ApcSegment::new());
        let cache = ApcCache::with_segment(
            segment.clone(),
            &ApcConfig::default(),
            prefix,
            clock.clone(),
        );
        (cache, clock, segment)
    }

    #[tokio::test]
    async fn test_stored_null_is_found() {
        let (cache, _, _) = apc_cache("");

        assert!(cache.save("nothing", Value::Null, 0).await);
        assert_eq!(cache.get("nothing").await, Some(Value::Null));
        assert_eq!(cache.get("absent").await, None);
    }

    #[tokio::test]
    async fn test_native_ttl() {
        let (cache, clock, _) = apc_cache("");

        assert!(cache.save("short", json!(false), 5).await);
        clock.advance(5);
        assert_eq!(cache.get("short").await, Some(json!(false)));
        clock.advance(1);
        assert_eq!(cache.get("short").await, None);
    }

    #[tokio::test]
    async fn test_delete_reports_absence() {
        let (cache, _, _) = apc_cache("");

        assert!(cache.save("k", json!(1), 0).await);
        assert!(cache.delete("k").await);
        assert!(!cache.delete("k").await);
    }

    #[tokio::test]
    async fn test_clean_is_scoped_to_prefix() {
        let (cache, clock, segment) = apc_cache("site1:");
        let other = ApcCache::with_segment(segment, &ApcConfig::default(), "site2:", clock);

        assert!(cache.save("site1:a", json!(1), 0).await);
        assert!(other.save("site2:a", json!(2), 0).await);
        assert!(cache.clean().await);

        assert_eq!(cache.get("site1:a").await, None);
        assert_eq!(other.get("site2:a").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_metadata_from_record() {
        let (cache, _, _) = apc_cache("");

        assert!(cache.save("k", json!([1, 2]), 100).await);
        let meta = cache.get_metadata("k").await.unwrap();
        assert_eq!(meta.expire, Some(START + 100));
        assert_eq!(meta.mtime, Some(START));
        assert_eq!(meta.value, Some(json!([1, 2])));
        assert!(cache.get_metadata("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_info_counts() {
        let (cache, _, _) = apc_cache("");

        cache.save("k", json!(1), 0).await;
        cache.get("k").await;
        cache.get("missing").await;

        let info = cache.cache_info(None).await.unwrap();
        assert_eq!(info["num_hits"], json!(1));
        assert_eq!(info["num_misses"], json!(1));
        assert_eq!(info["num_entries"], json!(1));
        assert_eq!(info["cache_list"][0]["key"], json!("k"));

        let summary = cache.cache_info(Some("summary")).await.unwrap();
        assert!(summary.get("cache_list").is_none());
        assert!(cache.cache_info(Some("opcode")).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_expunged_without_reads() {
        let (cache, clock, _) = apc_cache("");

        for i in 0..1000 {
            assert!(cache.save(&format!("short_{i}"), json!(i), 1).await);
        }
        assert!(cache.save("kept", json!("v"), 0).await);
        clock.advance(100);

        let summary = cache.cache_info(Some("summary")).await.unwrap();
        assert_eq!(summary["num_entries"], json!(1));
        assert_eq!(summary["expunges"], json!(1000));

        let info = cache.cache_info(None).await.unwrap();
        assert_eq!(info["cache_list"].as_array().unwrap().len(), 1);
        assert_eq!(info["cache_list"][0]["key"], json!("kept"));
    }

    #[tokio::test]
    async fn test_store_sheds_expired_entries() {
        let (cache, clock, segment) = apc_cache("");

        assert!(cache.save("old", json!(1), 5).await);
        clock.advance(10);
        assert!(cache.save("new", json!(2), 5).await);

        assert_eq!(segment.inner.lock().entries.len(), 1);
        assert_eq!(cache.get("new").await, Some(json!(2)));
    }

    #[test]
    fn test_disabled_segment_is_unsupported() {
        let cache = ApcCache::new(
            &ApcConfig { enabled: false },
            "",
            Arc::new(ManualClock::new(START)),
        );
        assert!(!cache.is_supported());
    }
}
