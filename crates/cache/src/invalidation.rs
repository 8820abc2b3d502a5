//! Cache invalidation strategies
//!
//! Key patterns used to purge groups of entries in one call.

use wildmatch::WildMatch;

/// Pattern matching strategy for cache key invalidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternStrategy {
    /// Simple wildcard matching (*, ?)
    Wildcard(String),
    /// Prefix matching
    Prefix(String),
    /// Suffix matching
    Suffix(String),
    /// Contains matching
    Contains(String),
}

impl PatternStrategy {
    /// Check if a key matches this pattern
    pub fn matches(&self, key: &str) -> bool {
        match self {
            PatternStrategy::Wildcard(pattern) => WildMatch::new(pattern).matches(key),
            PatternStrategy::Prefix(prefix) => key.starts_with(prefix.as_str()),
            PatternStrategy::Suffix(suffix) => key.ends_with(suffix.as_str()),
            PatternStrategy::Contains(substring) => key.contains(substring.as_str()),
        }
    }
}
