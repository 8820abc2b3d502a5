//! Cache configuration

use std::time::Duration;

use crate::{CacheError, CacheResult};

/// Configuration for a single TTL cache instance
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Name used in log lines
    pub name: String,

    /// Maximum age of a valid entry
    pub ttl: Duration,

    /// Sweep expired entries before every insertion
    pub sweep_on_set: bool,

    /// Maximum number of entries; the oldest entry is evicted when full
    pub max_entries: Option<usize>,
}

impl CacheConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_sweep_on_set(mut self, sweep: bool) -> Self {
        self.sweep_on_set = sweep;
        self
    }

    pub fn max_entries_limit(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.ttl.is_zero() {
            return Err(CacheError::Configuration(format!(
                "cache '{}' needs a non-zero TTL",
                self.name
            )));
        }
        if self.max_entries == Some(0) {
            return Err(CacheError::Configuration(format!(
                "cache '{}' needs room for at least one entry",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            ttl: Duration::from_secs(60),
            sweep_on_set: true,
            max_entries: Some(10_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.max_entries, Some(10_000));
        assert!(config.sweep_on_set);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::new("trees")
            .with_ttl(Duration::from_secs(300))
            .max_entries_limit(500)
            .with_sweep_on_set(false);

        assert_eq!(config.name, "trees");
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.max_entries, Some(500));
        assert!(!config.sweep_on_set);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = CacheConfig::new("broken").with_ttl(Duration::ZERO);
        assert!(matches!(config.validate(), Err(CacheError::Configuration(_))));
    }
}
