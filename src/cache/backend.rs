//! Backend Contract
//!
//! The operation set every cache backend implements. Every operation reports
//! failure through its return value; nothing here raises.

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::{CacheDriver, CacheMetadata};

/// Uniform contract implemented by every cache backend.
///
/// Keys reach the backend already prefixed by the [`Cache`](crate::cache::Cache)
/// facade.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Which driver this backend implements.
    fn driver(&self) -> CacheDriver;

    /// Probes whether the backend can run in this environment.
    ///
    /// Must not modify any state; it may log.
    fn is_supported(&self) -> bool;

    /// Backend-specific setup run once after the support check passed.
    async fn initialize(&mut self) {}

    /// Returns the stored value, or None for missing, expired or undecodable keys.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key`, overwriting any previous entry.
    ///
    /// `ttl == 0` requests no expiration.
    async fn save(&self, key: &str, value: Value, ttl: u64) -> bool;

    /// Removes `key`. See each backend for the meaning of the result.
    async fn delete(&self, key: &str) -> bool;

    /// Removes every entry in the namespace the backend manages.
    async fn clean(&self) -> bool;

    /// Backend statistics, optionally filtered by a backend-specific `kind`.
    async fn cache_info(&self, kind: Option<&str>) -> Option<Value>;

    /// Expiration details for `key`.
    async fn get_metadata(&self, key: &str) -> Option<CacheMetadata>;
}
