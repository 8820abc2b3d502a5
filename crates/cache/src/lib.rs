//! # studbook-cache
//!
//! Process-local result caching for the studbook services.
//!
//! ## Features
//!
//! - **Per-consumer TTL**: every cache instance carries its own time-to-live;
//!   validity is checked on every read, so an entry that survived a sweep is
//!   never served stale
//! - **Opportunistic sweeping**: expired entries are purged on write to bound memory
//! - **Pattern invalidation**: purge groups of keys by prefix or wildcard
//! - **Stable key hashing**: order-insensitive hashes for field lists
//! - **Startup warm-up**: detached, failure-isolated warm-up jobs
//!
//! ## Quick Start
//!
//! ```rust
//! use studbook_cache::{CacheConfig, TtlCache};
//! use std::time::Duration;
//!
//! let cache: TtlCache<Vec<String>> = TtlCache::new(
//!     CacheConfig::new("integrity").with_ttl(Duration::from_secs(30)),
//! );
//!
//! cache.set("integrity:animals:7", vec!["photos".to_string()]);
//! assert_eq!(cache.get("integrity:animals:7"), Some(vec!["photos".to_string()]));
//!
//! cache.invalidate("integrity:animals:7");
//! assert_eq!(cache.get("integrity:animals:7"), None);
//! ```

use thiserror::Error;

pub mod backends;
pub mod config;
pub mod invalidation;
pub mod key;
pub mod warming;

pub use backends::*;
pub use config::*;
pub use invalidation::*;
pub use key::*;
pub use warming::*;

/// Cache operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("Cache configuration error: {0}")]
    Configuration(String),

    #[error("Warm-up task '{task}' failed: {message}")]
    Warming { task: String, message: String },

    #[error("Warm-up task '{0}' timed out")]
    Timeout(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache key type
pub type CacheKey = String;

/// Snapshot of a cache's contents and hit counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Entries currently held, valid or not
    pub total: usize,
    /// Entries younger than the TTL
    pub valid: usize,
    /// Entries past the TTL that have not been swept yet
    pub expired: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }

    /// Combine the stats of two caches
    pub fn merge(self, other: CacheStats) -> CacheStats {
        CacheStats {
            total: self.total + other.total,
            valid: self.valid + other.valid,
            expired: self.expired + other.expired,
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
        }
    }
}
