//! Cache Module
//!
//! A single cache contract with interchangeable backends, selected once at
//! construction with a backup and a no-op fallback.

mod backend;
mod driver;
pub mod drivers;
mod entry;
mod facade;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use backend::CacheBackend;
pub use driver::CacheDriver;
pub use entry::{CacheMetadata, Clock, ManualClock, StoredRecord, SystemClock};
pub use facade::Cache;
pub use stats::CacheStats;
