//! Redis Backend
//!
//! Values are stored as plain JSON strings and expire through Redis's own
//! TTL, so metadata comes from the `TTL` command rather than a stored record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheBackend, CacheDriver, CacheMetadata, Clock};
use crate::config::{RedisConfig, SocketType};
use crate::error::{CacheError, Result};

/// Keys deleted per `SCAN` page when cleaning a prefix.
const SCAN_BATCH: usize = 500;

/// Longest `EX` sent to the server; Redis refuses expiries that overflow its
/// millisecond clock.
const MAX_EXPIRE_SECS: u64 = 100 * 365 * 24 * 3600;

// == Redis Cache ==
/// Cache backend over a single Redis connection.
///
/// `delete` returns `true` only when a key was removed. `clean` deletes the
/// keys under this instance's prefix, or flushes the selected database when
/// no prefix is configured.
pub struct RedisCache {
    config: RedisConfig,
    key_prefix: String,
    clock: Arc<dyn Clock>,
    conn: Option<MultiplexedConnection>,
}

impl RedisCache {
    // == Constructor ==
    pub fn new(config: &RedisConfig, key_prefix: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: config.clone(),
            key_prefix: key_prefix.to_string(),
            clock,
            conn: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    // == Connection ==
    /// Connection URL for the configured address.
    fn connection_url(config: &RedisConfig) -> Result<String> {
        match config.socket_type {
            SocketType::Tcp => Ok(format!(
                "redis://{}:{}/{}",
                config.host, config.port, config.database
            )),
            SocketType::Unix => {
                let socket = config.socket.as_ref().ok_or_else(|| {
                    CacheError::Config("redis socket_type 'unix' needs a socket path".to_string())
                })?;
                Ok(format!(
                    "redis+unix://{}?db={}",
                    socket.display(),
                    config.database
                ))
            }
        }
    }

    async fn connect(config: &RedisConfig) -> Result<MultiplexedConnection> {
        let client = redis::Client::open(Self::connection_url(config)?)?;
        let connecting = client.get_multiplexed_async_connection();

        let conn = if config.timeout > 0 {
            tokio::time::timeout(Duration::from_secs(config.timeout), connecting)
                .await
                .map_err(|_| {
                    CacheError::Backend(format!(
                        "redis connect timed out after {}s",
                        config.timeout
                    ))
                })??
        } else {
            connecting.await?
        };
        Ok(conn)
    }

    fn connection(&self) -> Result<MultiplexedConnection> {
        self.conn.clone().ok_or(CacheError::NotConnected("redis"))
    }

    // == Helpers ==
    /// Escapes glob metacharacters so the prefix matches literally in `SCAN`.
    fn scan_pattern(prefix: &str) -> String {
        let mut pattern = String::with_capacity(prefix.len() + 1);
        for c in prefix.chars() {
            if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('*');
        pattern
    }

    /// Parses `INFO` output into a flat object, skipping section headers.
    fn parse_info(raw: &str) -> Value {
        let fields: Map<String, Value> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        Value::Object(fields)
    }

    /// `EX` argument for a TTL; None leaves the key without expiry.
    fn expire_secs(ttl: u64) -> Option<u64> {
        (ttl > 0).then(|| ttl.min(MAX_EXPIRE_SECS))
    }

    // == Commands ==
    async fn fetch(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.connection()?;
        let raw: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, key: &str, value: &Value, ttl: u64) -> Result<()> {
        let mut conn = self.connection()?;
        let payload = serde_json::to_string(value)?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(payload);
        if let Some(secs) = Self::expire_secs(ttl) {
            cmd.arg("EX").arg(secs);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection()?;
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed == 1)
    }

    async fn remove_all(&self) -> Result<()> {
        let mut conn = self.connection()?;
        if self.key_prefix.is_empty() {
            let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
            return Ok(());
        }

        let pattern = Self::scan_pattern(&self.key_prefix);
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                let _: () = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
            }
            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }

    async fn info(&self, section: Option<&str>) -> Result<Value> {
        let mut conn = self.connection()?;
        let mut cmd = redis::cmd("INFO");
        if let Some(section) = section {
            cmd.arg(section);
        }
        let raw: String = cmd.query_async(&mut conn).await?;
        Ok(Self::parse_info(&raw))
    }

    // == Metadata ==
    /// An absent key is reported as None; a present key always yields
    /// metadata, even when its value is `false`, `0` or `null`.
    async fn metadata(&self, key: &str) -> Result<Option<CacheMetadata>> {
        let mut conn = self.connection()?;
        let remaining: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        if remaining == -2 {
            return Ok(None);
        }

        let Some(value) = self.fetch(key).await? else {
            return Ok(None);
        };
        let expire = (remaining >= 0).then(|| self.clock.now() + remaining);
        Ok(Some(CacheMetadata {
            expire,
            mtime: None,
            value: Some(value),
        }))
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn driver(&self) -> CacheDriver {
        CacheDriver::Redis
    }

    // == Is Supported ==
    fn is_supported(&self) -> bool {
        match Self::connection_url(&self.config) {
            Ok(_) => true,
            Err(e) => {
                debug!("Redis cache: {}", e);
                false
            }
        }
    }

    // == Initialize ==
    async fn initialize(&mut self) {
        let mut conn = match Self::connect(&self.config).await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Redis cache: connection refused: {}", e);
                return;
            }
        };
        info!("Redis cache: connected");

        if let Some(password) = &self.config.password {
            let auth: redis::RedisResult<()> =
                redis::cmd("AUTH").arg(password).query_async(&mut conn).await;
            if let Err(e) = auth {
                error!("Redis cache: authentication failed: {}", e);
            }
        }
        self.conn = Some(conn);
    }

    // == Get ==
    async fn get(&self, key: &str) -> Option<Value> {
        match self.fetch(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Redis cache: get '{}' failed: {}", key, e);
                None
            }
        }
    }

    // == Save ==
    async fn save(&self, key: &str, value: Value, ttl: u64) -> bool {
        match self.store(key, &value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Redis cache: save '{}' failed: {}", key, e);
                false
            }
        }
    }

    // == Delete ==
    async fn delete(&self, key: &str) -> bool {
        self.remove(key).await.unwrap_or_else(|e| {
            warn!("Redis cache: delete '{}' failed: {}", key, e);
            false
        })
    }

    // == Clean ==
    async fn clean(&self) -> bool {
        match self.remove_all().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Redis cache: clean failed: {}", e);
                false
            }
        }
    }

    // == Cache Info ==
    /// Parsed `INFO` output; `kind` names a section such as `"memory"`.
    async fn cache_info(&self, kind: Option<&str>) -> Option<Value> {
        self.info(kind)
            .await
            .map_err(|e| warn!("Redis cache: info failed: {}", e))
            .ok()
    }

    // == Get Metadata ==
    async fn get_metadata(&self, key: &str) -> Option<CacheMetadata> {
        self.metadata(key).await.unwrap_or_else(|e| {
            warn!("Redis cache: metadata for '{}' failed: {}", key, e);
            None
        })
    }
}

// == Drop ==
impl Drop for RedisCache {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            debug!("Redis cache: connection closed");
        }
    }
}
