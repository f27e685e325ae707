//! Error types for the cache subsystem
//!
//! Provides unified error handling using thiserror. Backend operations use
//! these internally and absorb them into boolean / not-found results at the
//! [`CacheBackend`](crate::cache::CacheBackend) boundary.

use thiserror::Error;

use crate::cache::CacheDriver;

// == Cache Error Enum ==
/// Unified error type for the cache subsystem.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The requested driver cannot run in this environment.
    ///
    /// Recoverable: the selector retries construction with `fallback`.
    #[error("Cache driver '{driver}' is unsupported, falling back to '{fallback}'")]
    Unsupported {
        driver: CacheDriver,
        fallback: CacheDriver,
    },

    /// Key cannot be used by the backend
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// Configuration could not be parsed or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend has no live connection
    #[error("Not connected: {0}")]
    NotConnected(&'static str),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote or in-process backend reported a failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(format!("redis: {err}"))
    }
}

impl From<memcache::MemcacheError> for CacheError {
    fn from(err: memcache::MemcacheError) -> Self {
        CacheError::Backend(format!("memcached: {err}"))
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Backend(format!("blocking task failed: {err}"))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache subsystem.
pub type Result<T> = std::result::Result<T, CacheError>;
