//! Stashpoint - pluggable cache backends
//!
//! One cache contract over file, shared memory, memcached and redis storage,
//! with primary/backup driver selection and TTL expiration.

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{Cache, CacheBackend, CacheDriver, CacheMetadata};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
