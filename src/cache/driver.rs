//! Driver Names
//!
//! Identifies the available backends by the name used in configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

// == Cache Driver ==
/// Names of the available cache backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    /// Process-wide shared memory segment
    Apc,
    /// One file per key inside a cache directory
    #[default]
    File,
    /// Memcached server pool
    Memcached,
    /// Single Redis server
    Redis,
    /// In-process user cache with native per-entry TTL
    Wincache,
    /// No-op fallback
    Dummy,
}

impl CacheDriver {
    /// All drivers in declaration order.
    pub const ALL: [CacheDriver; 6] = [
        CacheDriver::Apc,
        CacheDriver::File,
        CacheDriver::Memcached,
        CacheDriver::Redis,
        CacheDriver::Wincache,
        CacheDriver::Dummy,
    ];

    /// Configuration name of the driver.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheDriver::Apc => "apc",
            CacheDriver::File => "file",
            CacheDriver::Memcached => "memcached",
            CacheDriver::Redis => "redis",
            CacheDriver::Wincache => "wincache",
            CacheDriver::Dummy => "dummy",
        }
    }

    /// Picks the driver to retry with after `self` reported unsupported.
    ///
    /// The backup wins when configured and different from `self`; otherwise the
    /// dummy driver is used.
    pub fn fallback(self, backup: Option<CacheDriver>) -> CacheDriver {
        match backup {
            Some(backup) if backup != self => backup,
            _ => CacheDriver::Dummy,
        }
    }
}

impl fmt::Display for CacheDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheDriver {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        CacheDriver::ALL
            .into_iter()
            .find(|driver| driver.as_str() == name)
            .ok_or_else(|| CacheError::Config(format!("unknown cache driver '{s}'")))
    }
}
