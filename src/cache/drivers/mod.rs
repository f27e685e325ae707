//! Cache Backends
//!
//! One module per storage technology, all implementing [`CacheBackend`].

mod apc;
mod dummy;
mod file;
mod memcached;
mod redis;
mod wincache;

use std::sync::Arc;

pub use self::apc::{ApcCache, ApcSegment};
pub use self::dummy::DummyCache;
pub use self::file::FileCache;
pub use self::memcached::MemcachedCache;
pub use self::redis::RedisCache;
pub use self::wincache::WincacheCache;

use crate::cache::{CacheBackend, CacheDriver, Clock};
use crate::config::CacheConfig;

/// Instantiates the backend for `driver` from its section of `config`.
///
/// No connection is made here; that happens in [`CacheBackend::initialize`].
pub fn build_backend(
    driver: CacheDriver,
    config: &CacheConfig,
    clock: Arc<dyn Clock>,
) -> Box<dyn CacheBackend> {
    let prefix = config.key_prefix.as_str();
    match driver {
        CacheDriver::Apc => Box::new(ApcCache::new(&config.apc, prefix, clock)),
        CacheDriver::File => Box::new(FileCache::new(&config.file, clock)),
        CacheDriver::Memcached => Box::new(MemcachedCache::new(&config.memcached, clock)),
        CacheDriver::Redis => Box::new(RedisCache::new(&config.redis, prefix, clock)),
        CacheDriver::Wincache => Box::new(WincacheCache::new(&config.wincache, prefix, clock)),
        CacheDriver::Dummy => Box::new(DummyCache),
    }
}
