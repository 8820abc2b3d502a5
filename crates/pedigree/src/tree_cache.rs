//! Cache of built trees
//!
//! Keys are `tree:{kind}:{root}:{depth}:{fields}` where `fields` is the
//! order-insensitive hash of the requested field list, or `default`.

use std::time::Duration;

use studbook_cache::{fields_key_part, CacheConfig, CacheStats, PatternStrategy, TtlCache};
use tracing::debug;

use crate::types::{TreeKind, TreeResult};

/// Deterministic key of a tree request
pub fn tree_cache_key<S: AsRef<str>>(kind: TreeKind, root_id: i64, max_depth: u32, fields: Option<&[S]>) -> String {
    format!("tree:{}:{}:{}:{}", kind, root_id, max_depth, fields_key_part(fields))
}

pub struct TreeCache {
    cache: TtlCache<TreeResult>,
}

impl TreeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(CacheConfig::new("tree").with_ttl(ttl)),
        }
    }

    pub fn get<S: AsRef<str>>(&self, kind: TreeKind, root_id: i64, max_depth: u32, fields: Option<&[S]>) -> Option<TreeResult> {
        self.cache.get(&tree_cache_key(kind, root_id, max_depth, fields))
    }

    pub fn store<S: AsRef<str>>(&self, result: &TreeResult, fields: Option<&[S]>) {
        let key = tree_cache_key(result.kind, result.root_id, result.max_depth, fields);
        debug!("Caching {} tree under '{}'", result.kind, key);
        self.cache.set(key, result.clone());
    }

    /// Drop the default-field entries of `root_id` for the given depths and both kinds
    pub fn invalidate_depths(&self, root_id: i64, depths: impl IntoIterator<Item = u32> + Clone) -> usize {
        let keys: Vec<String> = TreeKind::ALL
            .iter()
            .flat_map(|kind| {
                depths
                    .clone()
                    .into_iter()
                    .map(move |depth| tree_cache_key::<&str>(*kind, root_id, depth, None))
            })
            .collect();
        self.cache.invalidate_many(&keys)
    }

    /// Drop every entry rooted at `root_id`, whatever its depth or field list
    pub fn purge_root(&self, root_id: i64) -> usize {
        TreeKind::ALL
            .iter()
            .map(|kind| {
                let prefix = format!("tree:{}:{}:", kind, root_id);
                self.cache.invalidate_matching(&PatternStrategy::Prefix(prefix))
            })
            .sum()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear(&self) {
        self.cache.clear()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
