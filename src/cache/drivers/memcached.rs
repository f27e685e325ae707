//! Memcached Backend
//!
//! Stores the three-field record on a memcached pool. The client is blocking,
//! so every call runs on tokio's blocking pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheBackend, CacheDriver, CacheMetadata, Clock, StoredRecord};
use crate::config::{MemcachedConfig, MemcachedServer};
use crate::error::{CacheError, Result};

/// Relative TTLs above this many seconds are read by memcached as absolute
/// Unix timestamps.
const MAX_RELATIVE_TTL: u64 = 60 * 60 * 24 * 30;

// == Memcached Cache ==
/// Cache backend over a pool of memcached servers.
///
/// `delete` returns `false` when the key was not stored. `clean` flushes every
/// configured server, whatever prefix the keys carry.
pub struct MemcachedCache {
    config: MemcachedConfig,
    clock: Arc<dyn Clock>,
    client: Option<Arc<memcache::Client>>,
}

impl MemcachedCache {
    // == Constructor ==
    pub fn new(config: &MemcachedConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: config.clone(),
            clock,
            client: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    // == Helpers ==
    /// Connection URLs, one per unit of weight so heavier servers own a
    /// larger share of the hash ring.
    fn server_urls(servers: &[MemcachedServer]) -> Vec<String> {
        servers
            .iter()
            .flat_map(|server| {
                let url = format!("memcache://{}:{}", server.host, server.port);
                std::iter::repeat(url).take(server.weight.max(1) as usize)
            })
            .collect()
    }

    /// TTL as sent on the wire: 0 keeps the entry forever, long TTLs become
    /// absolute timestamps.
    fn expiration(ttl: u64, now: i64) -> u32 {
        if ttl <= MAX_RELATIVE_TTL {
            ttl as u32
        } else {
            let absolute = now.saturating_add(ttl.min(i64::MAX as u64) as i64);
            absolute.clamp(0, u32::MAX as i64) as u32
        }
    }

    // == Connection ==
    fn connect(config: &MemcachedConfig) -> Result<memcache::Client> {
        let client = memcache::Client::connect(Self::server_urls(&config.servers))?;
        if config.timeout > 0 {
            let timeout = Some(Duration::from_secs(config.timeout));
            client.set_read_timeout(timeout)?;
            client.set_write_timeout(timeout)?;
        }
        Ok(client)
    }

    /// Runs a blocking client call off the async executor.
    async fn with_client<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&memcache::Client) -> std::result::Result<T, memcache::MemcacheError>
            + Send
            + 'static,
    {
        let client = self
            .client
            .clone()
            .ok_or(CacheError::NotConnected("memcached"))?;
        let result = tokio::task::spawn_blocking(move || op(&client)).await?;
        Ok(result?)
    }

    // == Records ==
    async fn fetch_record(&self, key: &str) -> Result<Option<StoredRecord>> {
        let key = key.to_string();
        let raw: Option<String> = self.with_client(move |c| c.get(&key)).await?;
        match raw {
            Some(raw) => Ok(Some(StoredRecord::decode(raw.as_bytes())?)),
            None => Ok(None),
        }
    }

    async fn store_record(&self, key: &str, value: Value, ttl: u64) -> Result<()> {
        let now = self.clock.now();
        let payload = StoredRecord::new(value, ttl, now).encode()?;
        let expiration = Self::expiration(ttl, now);
        let key = key.to_string();
        self.with_client(move |c| c.set(&key, payload.as_str(), expiration))
            .await
    }

    // == Stats ==
    async fn server_stats(&self, kind: Option<&str>) -> Result<Value> {
        let stats = self.with_client(|c| c.stats()).await?;
        let mut servers = Map::new();
        for (server, values) in stats {
            let entry = match kind {
                Some(name) => values
                    .get(name)
                    .map(|v| Value::String(v.clone()))
                    .unwrap_or(Value::Null),
                None => Value::Object(
                    values
                        .into_iter()
                        .map(|(k, v)| (k, Value::String(v)))
                        .collect(),
                ),
            };
            servers.insert(server, entry);
        }
        Ok(Value::Object(servers))
    }
}

#[async_trait]
impl CacheBackend for MemcachedCache {
    fn driver(&self) -> CacheDriver {
        CacheDriver::Memcached
    }

    // == Is Supported ==
    fn is_supported(&self) -> bool {
        let usable = !self.config.servers.is_empty()
            && self.config.servers.iter().all(|s| !s.host.is_empty());
        if !usable {
            debug!("Memcached cache: no usable server configured");
        }
        usable
    }

    // == Initialize ==
    async fn initialize(&mut self) {
        let config = self.config.clone();
        let connected = tokio::task::spawn_blocking(move || Self::connect(&config))
            .await
            .map_err(CacheError::from)
            .and_then(|inner| inner);

        match connected {
            Ok(client) => {
                info!(
                    "Memcached cache: connected to {} server(s)",
                    self.config.servers.len()
                );
                self.client = Some(Arc::new(client));
            }
            Err(e) => error!("Memcached cache: connection failed: {}", e),
        }
    }

    // == Get ==
    async fn get(&self, key: &str) -> Option<Value> {
        match self.fetch_record(key).await {
            Ok(record) => record.map(|r| r.value),
            Err(e) => {
                warn!("Memcached cache: get '{}' failed: {}", key, e);
                None
            }
        }
    }

    // == Save ==
    async fn save(&self, key: &str, value: Value, ttl: u64) -> bool {
        match self.store_record(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Memcached cache: save '{}' failed: {}", key, e);
                false
            }
        }
    }

    // == Delete ==
    async fn delete(&self, key: &str) -> bool {
        let owned = key.to_string();
        self.with_client(move |c| c.delete(&owned))
            .await
            .unwrap_or_else(|e| {
                warn!("Memcached cache: delete '{}' failed: {}", key, e);
                false
            })
    }

    // == Clean ==
    async fn clean(&self) -> bool {
        match self.with_client(|c| c.flush()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Memcached cache: flush failed: {}", e);
                false
            }
        }
    }

    // == Cache Info ==
    /// Per-server stats; `kind` selects a single stat name, e.g. `"curr_items"`.
    async fn cache_info(&self, kind: Option<&str>) -> Option<Value> {
        self.server_stats(kind)
            .await
            .map_err(|e| warn!("Memcached cache: stats failed: {}", e))
            .ok()
    }

    // == Get Metadata ==
    async fn get_metadata(&self, key: &str) -> Option<CacheMetadata> {
        match self.fetch_record(key).await {
            Ok(record) => record.map(|r| r.metadata()),
            Err(e) => {
                warn!("Memcached cache: metadata for '{}' failed: {}", key, e);
                None
            }
        }
    }
}
