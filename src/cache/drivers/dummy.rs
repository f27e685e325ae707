//! Dummy Backend
//!
//! Stores nothing. Writes succeed and reads miss, so it can stand in for any
//! backend that is unavailable.

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::{CacheBackend, CacheDriver, CacheMetadata};

/// No-op cache backend; `delete` always returns `true`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyCache;

#[async_trait]
impl CacheBackend for DummyCache {
    fn driver(&self) -> CacheDriver {
        CacheDriver::Dummy
    }

    fn is_supported(&self) -> bool {
        true
    }

    async fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn save(&self, _key: &str, _value: Value, _ttl: u64) -> bool {
        true
    }

    async fn delete(&self, _key: &str) -> bool {
        true
    }

    async fn clean(&self) -> bool {
        true
    }

    async fn cache_info(&self, _kind: Option<&str>) -> Option<Value> {
        None
    }

    async fn get_metadata(&self, _key: &str) -> Option<CacheMetadata> {
        None
    }
}
