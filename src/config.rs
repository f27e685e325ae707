//! Configuration Module
//!
//! Explicit configuration for the cache facade and every backend, loadable
//! from environment variables or a TOML document.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::cache::CacheDriver;
use crate::error::{CacheError, Result};

/// Cache configuration.
///
/// Unknown keys are rejected when parsing a document, so a typo in an option
/// name surfaces as an error instead of being silently ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Primary backend
    pub driver: CacheDriver,
    /// Backend to retry with when the primary is unsupported
    pub backup: Option<CacheDriver>,
    /// Prepended to every key
    pub key_prefix: String,
    /// TTL in seconds used by `Cache::save`
    pub default_ttl: u64,
    pub file: FileConfig,
    pub apc: ApcConfig,
    pub wincache: WincacheConfig,
    pub memcached: MemcachedConfig,
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::File,
            backup: None,
            key_prefix: String::new(),
            default_ttl: 60,
            file: FileConfig::default(),
            apc: ApcConfig::default(),
            wincache: WincacheConfig::default(),
            memcached: MemcachedConfig::default(),
            redis: RedisConfig::default(),
        }
    }
}

/// File backend options.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Directory holding one file per key
    pub cache_path: Option<PathBuf>,
    /// Application root used to derive the default `cache/` directory
    pub app_root: Option<PathBuf>,
}

impl FileConfig {
    /// The configured cache directory, or `<app_root>/cache`.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.cache_path {
            return path.clone();
        }
        let root = self
            .app_root
            .clone()
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        root.join("cache")
    }
}

/// Shared memory segment options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApcConfig {
    pub enabled: bool,
}

impl Default for ApcConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// In-process user cache options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WincacheConfig {
    pub enabled: bool,
    /// Upper bound on stored entries
    pub max_entries: u64,
}

impl Default for WincacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
        }
    }
}

/// A single memcached server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemcachedServer {
    pub host: String,
    pub port: u16,
    /// Relative share of the key space routed to this server
    pub weight: u32,
}

impl Default for MemcachedServer {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11211,
            weight: 1,
        }
    }
}

impl MemcachedServer {
    /// Parses `host[:port[:weight]]`.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut parts = spec.trim().split(':');
        let mut server = MemcachedServer::default();

        match parts.next() {
            Some(host) if !host.is_empty() => server.host = host.to_string(),
            _ => {
                return Err(CacheError::Config(format!(
                    "memcached server '{spec}' has no host"
                )))
            }
        }
        if let Some(port) = parts.next() {
            server.port = port
                .parse()
                .map_err(|_| CacheError::Config(format!("invalid memcached port in '{spec}'")))?;
        }
        if let Some(weight) = parts.next() {
            server.weight = weight
                .parse()
                .map_err(|_| CacheError::Config(format!("invalid memcached weight in '{spec}'")))?;
        }
        if parts.next().is_some() {
            return Err(CacheError::Config(format!(
                "memcached server '{spec}' has too many fields"
            )));
        }
        Ok(server)
    }
}

/// Memcached backend options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemcachedConfig {
    pub servers: Vec<MemcachedServer>,
    /// Socket read/write timeout in seconds, 0 = client default
    pub timeout: u64,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        Self {
            servers: vec![MemcachedServer::default()],
            timeout: 0,
        }
    }
}

/// How to reach the Redis server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketType {
    #[default]
    Tcp,
    Unix,
}

/// Redis backend options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisConfig {
    pub socket_type: SocketType,
    pub host: String,
    pub port: u16,
    /// Unix socket path, required when `socket_type` is `unix`
    pub socket: Option<PathBuf>,
    pub password: Option<String>,
    /// Connect timeout in seconds, 0 = wait for the client default
    pub timeout: u64,
    pub database: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            socket_type: SocketType::Tcp,
            host: "127.0.0.1".to_string(),
            port: 6379,
            socket: None,
            password: None,
            timeout: 0,
            database: 0,
        }
    }
}

/// Raw variable value awaiting a typed parse.
struct Parsed(Option<String>);

impl Parsed {
    fn value<T: FromStr>(self) -> Option<T> {
        self.0.and_then(|v| v.trim().parse().ok())
    }
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DRIVER` / `CACHE_BACKUP` - driver names (default: file / none)
    /// - `CACHE_KEY_PREFIX` - key prefix (default: empty)
    /// - `CACHE_DEFAULT_TTL` - TTL in seconds (default: 60)
    /// - `CACHE_PATH` / `CACHE_APP_ROOT` - file backend directory
    /// - `CACHE_APC_ENABLED` / `CACHE_WINCACHE_ENABLED` - true/false
    /// - `CACHE_WINCACHE_MAX_ENTRIES` - entry bound (default: 10000)
    /// - `CACHE_MEMCACHED_SERVERS` - comma separated `host:port:weight`
    /// - `CACHE_MEMCACHED_TIMEOUT` - seconds
    /// - `CACHE_REDIS_HOST`, `CACHE_REDIS_PORT`, `CACHE_REDIS_SOCKET`,
    ///   `CACHE_REDIS_PASSWORD`, `CACHE_REDIS_TIMEOUT`, `CACHE_REDIS_DATABASE`
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |name: &str| Parsed(lookup(name));

        let memcached_servers = lookup("CACHE_MEMCACHED_SERVERS")
            .and_then(|list| {
                list.split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(MemcachedServer::parse)
                    .collect::<Result<Vec<_>>>()
                    .ok()
            })
            .filter(|servers| !servers.is_empty())
            .unwrap_or(defaults.memcached.servers);

        let redis_socket = lookup("CACHE_REDIS_SOCKET").map(PathBuf::from);

        Self {
            driver: parsed("CACHE_DRIVER").value().unwrap_or(defaults.driver),
            backup: parsed("CACHE_BACKUP").value(),
            key_prefix: lookup("CACHE_KEY_PREFIX").unwrap_or_default(),
            default_ttl: parsed("CACHE_DEFAULT_TTL").value().unwrap_or(defaults.default_ttl),
            file: FileConfig {
                cache_path: lookup("CACHE_PATH").map(PathBuf::from),
                app_root: lookup("CACHE_APP_ROOT").map(PathBuf::from),
            },
            apc: ApcConfig {
                enabled: parsed("CACHE_APC_ENABLED").value().unwrap_or(defaults.apc.enabled),
            },
            wincache: WincacheConfig {
                enabled: parsed("CACHE_WINCACHE_ENABLED")
                    .value()
                    .unwrap_or(defaults.wincache.enabled),
                max_entries: parsed("CACHE_WINCACHE_MAX_ENTRIES")
                    .value()
                    .unwrap_or(defaults.wincache.max_entries),
            },
            memcached: MemcachedConfig {
                servers: memcached_servers,
                timeout: parsed("CACHE_MEMCACHED_TIMEOUT")
                    .value()
                    .unwrap_or(defaults.memcached.timeout),
            },
            redis: RedisConfig {
                socket_type: if redis_socket.is_some() {
                    SocketType::Unix
                } else {
                    SocketType::Tcp
                },
                host: lookup("CACHE_REDIS_HOST").unwrap_or(defaults.redis.host),
                port: parsed("CACHE_REDIS_PORT").value().unwrap_or(defaults.redis.port),
                socket: redis_socket,
                password: lookup("CACHE_REDIS_PASSWORD").filter(|p| !p.is_empty()),
                timeout: parsed("CACHE_REDIS_TIMEOUT").value().unwrap_or(defaults.redis.timeout),
                database: parsed("CACHE_REDIS_DATABASE").value().unwrap_or(defaults.redis.database),
            },
        }
    }

    /// Parses a TOML document. Unknown options are an error.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }
}
