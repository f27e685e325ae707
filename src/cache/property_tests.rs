//! Property-Based Tests for Cache Backends
//!
//! Uses proptest to check the contract every storing backend must honour.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_test::block_on;

use crate::cache::drivers::{ApcCache, ApcSegment, DummyCache, FileCache, WincacheCache};
use crate::cache::{CacheBackend, ManualClock};
use crate::config::{ApcConfig, FileConfig, WincacheConfig};

// == Test Configuration ==
const START: i64 = 1_700_000_000;

// == Strategies ==
/// Keys safe for every backend, including file names
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,64}".prop_map(|s| s)
}

/// Scalars, strings and small composites, including `null` and `false`
fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,64}".prop_map(Value::from),
        prop::collection::vec(any::<i32>(), 0..8).prop_map(|v| json!(v)),
        ("[a-z]{1,8}", any::<u16>()).prop_map(|(k, v)| json!({ k: v })),
    ]
}

fn ttl_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![Just(0u64), 1u64..100_000]
}

/// File, APC and WinCache backends sharing one manual clock.
struct Backends {
    _dir: TempDir,
    clock: Arc<ManualClock>,
    file: FileCache,
    apc: ApcCache,
    wincache: WincacheCache,
}

impl Backends {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(START));
        let file = FileCache::new(
            &FileConfig {
                cache_path: Some(dir.path().to_path_buf()),
                app_root: None,
            },
            clock.clone(),
        );
        let apc = ApcCache::with_segment(
            Arc::new(ApcSegment::new()),
            &ApcConfig::default(),
            "",
            clock.clone(),
        );
        let wincache = WincacheCache::new(&WincacheConfig::default(), "", clock.clone());
        Self {
            _dir: dir,
            clock,
            file,
            apc,
            wincache,
        }
    }

    fn all(&self) -> [&dyn CacheBackend; 3] {
        [&self.file, &self.apc, &self.wincache]
    }

    /// Backends whose expiry follows the manual clock; moka expires on real time.
    fn clock_driven(&self) -> [&dyn CacheBackend; 2] {
        [&self.file, &self.apc]
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Saving then reading before expiry returns the exact value, null included.
    #[test]
    fn prop_roundtrip_storage(
        key in key_strategy(),
        value in value_strategy(),
        ttl in ttl_strategy(),
    ) {
        let backends = Backends::new();
        for backend in backends.all() {
            let (saved, read) = block_on(async {
                let saved = backend.save(&key, value.clone(), ttl).await;
                (saved, backend.get(&key).await)
            });
            prop_assert!(saved);
            prop_assert_eq!(read, Some(value.clone()));
        }
    }

    // After delete, a read reports not found.
    #[test]
    fn prop_delete_removes_entry(key in key_strategy(), value in value_strategy()) {
        let backends = Backends::new();
        for backend in backends.all() {
            let (deleted, read) = block_on(async {
                backend.save(&key, value.clone(), 0).await;
                let deleted = backend.delete(&key).await;
                (deleted, backend.get(&key).await)
            });
            prop_assert!(deleted);
            prop_assert_eq!(read, None);
        }
    }

    // A second save replaces the first.
    #[test]
    fn prop_overwrite_semantics(
        key in key_strategy(),
        first in value_strategy(),
        second in value_strategy(),
    ) {
        let backends = Backends::new();
        for backend in backends.all() {
            let read = block_on(async {
                backend.save(&key, first.clone(), 0).await;
                backend.save(&key, second.clone(), 0).await;
                backend.get(&key).await
            });
            prop_assert_eq!(read, Some(second.clone()));
        }
    }

    // One second past stored_at + ttl the entry is gone.
    #[test]
    fn prop_expired_entries_are_never_returned(
        key in key_strategy(),
        value in value_strategy(),
        ttl in 1u64..100_000,
    ) {
        let backends = Backends::new();
        for backend in backends.clock_driven() {
            let (before, after) = block_on(async {
                backend.save(&key, value.clone(), ttl).await;
                backends.clock.set(START + ttl as i64);
                let before = backend.get(&key).await;
                backends.clock.set(START + ttl as i64 + 1);
                let after = backend.get(&key).await;
                backends.clock.set(START);
                (before, after)
            });
            prop_assert_eq!(before, Some(value.clone()));
            prop_assert_eq!(after, None);
        }
    }

    // Metadata reports expire = stored_at + ttl for saved keys and nothing otherwise.
    #[test]
    fn prop_metadata_expire(
        key in key_strategy(),
        value in value_strategy(),
        ttl in 1u64..100_000,
    ) {
        let backends = Backends::new();
        for backend in backends.all() {
            let (missing, meta) = block_on(async {
                let missing = backend.get_metadata(&key).await;
                backend.save(&key, value.clone(), ttl).await;
                (missing, backend.get_metadata(&key).await)
            });
            prop_assert!(missing.is_none());
            let meta = meta.unwrap();
            prop_assert_eq!(meta.expire, Some(START + ttl as i64));
            prop_assert_eq!(meta.mtime, Some(START));
        }
    }

    // Clean empties the backend for every key written before it.
    #[test]
    fn prop_clean_removes_everything(keys in prop::collection::hash_set(key_strategy(), 1..20)) {
        let backends = Backends::new();
        for backend in backends.all() {
            let leftovers = block_on(async {
                for key in &keys {
                    backend.save(key, json!(key), 0).await;
                }
                backend.clean().await;
                let mut leftovers = 0;
                for key in &keys {
                    if backend.get(key).await.is_some() {
                        leftovers += 1;
                    }
                }
                leftovers
            });
            prop_assert_eq!(leftovers, 0);
        }
    }

    // The dummy backend accepts every write and never returns anything.
    #[test]
    fn prop_dummy_never_stores(
        key in key_strategy(),
        value in value_strategy(),
        ttl in ttl_strategy(),
    ) {
        let cache = DummyCache;
        let (saved, read, deleted) = block_on(async {
            let saved = cache.save(&key, value, ttl).await;
            let read = cache.get(&key).await;
            (saved, read, cache.delete(&key).await)
        });
        prop_assert!(saved);
        prop_assert_eq!(read, None);
        prop_assert!(deleted);
    }
}
