//! Cache Entry Module
//!
//! Defines the record stored by backends that pack a value together with its
//! write time and TTL, plus the clock used to judge expiration.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Stored Record ==
/// A value together with its write timestamp and TTL.
///
/// `ttl == 0` means the record never expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoredRecord {
    /// Write timestamp (Unix seconds)
    pub stored_at: i64,
    /// Time to live in seconds, 0 = no expiration
    pub ttl: u64,
    /// The stored payload
    pub value: Value,
}

impl StoredRecord {
    // == Constructor ==
    /// Creates a record written at `now`.
    pub fn new(value: Value, ttl: u64, now: i64) -> Self {
        Self {
            stored_at: now,
            ttl,
            value,
        }
    }

    // == Expires At ==
    /// Expiration timestamp, or None when the record never expires.
    ///
    /// TTLs beyond the timestamp range saturate at `i64::MAX`.
    pub fn expires_at(&self) -> Option<i64> {
        (self.ttl > 0).then(|| {
            let ttl = i64::try_from(self.ttl).unwrap_or(i64::MAX);
            self.stored_at.saturating_add(ttl)
        })
    }

    // == Is Expired ==
    /// Checks if the record has expired at `now`.
    ///
    /// A record is still live during the second it expires in and becomes
    /// stale once `now` is strictly past `stored_at + ttl`.
    pub fn is_expired(&self, now: i64) -> bool {
        match self.expires_at() {
            Some(expires) => now > expires,
            None => false,
        }
    }

    // == Metadata ==
    /// Builds the metadata view of this record.
    pub fn metadata(&self) -> CacheMetadata {
        CacheMetadata {
            expire: self.expires_at(),
            mtime: Some(self.stored_at),
            value: Some(self.value.clone()),
        }
    }

    // == Encoding ==
    /// Serializes the record for byte-oriented backends.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a record; any shape other than the three fields is an error.
    pub fn decode(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }
}

// == Cache Metadata ==
/// Expiration details for a stored key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheMetadata {
    /// Expiration timestamp (Unix seconds), None = never expires
    pub expire: Option<i64>,
    /// Write timestamp (Unix seconds), None when the backend cannot tell
    pub mtime: Option<i64>,
    /// Stored value, when cheaply available
    pub value: Option<Value>,
}

// == Clock ==
/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Clock that only moves when told to. Used to simulate TTL expiry.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Moves the clock forward by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
