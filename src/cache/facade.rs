//! Cache Facade
//!
//! Binds one backend, chosen at construction, and exposes the cache contract
//! with the key prefix and default TTL applied.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::drivers::build_backend;
use crate::cache::{CacheBackend, CacheDriver, CacheMetadata, Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Cache ==
/// Cache handle bound to a single backend for its whole lifetime.
pub struct Cache {
    backend: Box<dyn CacheBackend>,
    key_prefix: String,
    default_ttl: u64,
}

impl Cache {
    // == Construction ==
    /// Builds a cache bound to `driver`.
    ///
    /// Returns [`CacheError::Unsupported`] naming the driver to retry with when
    /// `driver` cannot run here. Selection across drivers is done by
    /// [`Cache::open`].
    pub async fn with_driver(
        driver: CacheDriver,
        config: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let backend = build_backend(driver, config, clock);
        Self::with_backend(backend, config.backup, config).await
    }

    /// Binds an already constructed backend after checking it is supported.
    pub async fn with_backend(
        mut backend: Box<dyn CacheBackend>,
        backup: Option<CacheDriver>,
        config: &CacheConfig,
    ) -> Result<Self> {
        let driver = backend.driver();
        if !backend.is_supported() {
            return Err(CacheError::Unsupported {
                driver,
                fallback: driver.fallback(backup),
            });
        }

        backend.initialize().await;
        debug!("Cache bound to '{}' driver", driver);

        Ok(Self {
            backend,
            key_prefix: config.key_prefix.clone(),
            default_ttl: config.default_ttl,
        })
    }

    /// Builds a cache for `config`, falling back to the backup driver and then
    /// to the dummy driver when a driver is unsupported.
    pub async fn open(config: &CacheConfig) -> Self {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let mut driver = config.driver;
        let mut tried: Vec<CacheDriver> = Vec::new();

        loop {
            match Self::with_driver(driver, config, clock.clone()).await {
                Ok(cache) => {
                    info!("Cache initialized with '{}' driver", driver);
                    return cache;
                }
                Err(CacheError::Unsupported { driver: failed, fallback }) => {
                    warn!(
                        "Cache driver '{}' unsupported, trying '{}'",
                        failed, fallback
                    );
                    tried.push(failed);
                    driver = if tried.contains(&fallback) {
                        CacheDriver::Dummy
                    } else {
                        fallback
                    };
                }
                Err(e) => {
                    warn!("Cache driver '{}' failed: {}, using dummy", driver, e);
                    driver = CacheDriver::Dummy;
                }
            }
        }
    }

    /// The driver actually bound after fallback.
    pub fn driver(&self) -> CacheDriver {
        self.backend.driver()
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    // == Operations ==
    /// Returns the value stored under `key`, or None when missing or expired.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.backend.get(&self.prefixed(key)).await
    }

    /// Typed [`get`](Self::get); a value of another shape reads as missing.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        serde_json::from_value(value)
            .map_err(|e| debug!("Cache value for '{}' has unexpected shape: {}", key, e))
            .ok()
    }

    /// Stores `value` for `ttl` seconds, or the default TTL when None.
    /// A TTL of 0 keeps the entry until deleted.
    pub async fn save(&self, key: &str, value: Value, ttl: Option<u64>) -> bool {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.backend.save(&self.prefixed(key), value, ttl).await
    }

    /// Typed [`save`](Self::save).
    pub async fn save_as<T: Serialize>(&self, key: &str, value: &T, ttl: Option<u64>) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => self.save(key, value, ttl).await,
            Err(e) => {
                warn!("Cache value for '{}' is not serializable: {}", key, e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.backend.delete(&self.prefixed(key)).await
    }

    pub async fn clean(&self) -> bool {
        self.backend.clean().await
    }

    pub async fn cache_info(&self, kind: Option<&str>) -> Option<Value> {
        self.backend.cache_info(kind).await
    }

    pub async fn get_metadata(&self, key: &str) -> Option<CacheMetadata> {
        self.backend.get_metadata(&self.prefixed(key)).await
    }

    pub fn is_supported(&self) -> bool {
        self.backend.is_supported()
    }
}
