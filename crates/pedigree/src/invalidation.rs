//! Tree cache invalidation after hierarchy changes
//!
//! Invalidation is deliberately coarse. For the changed id and its parents
//! it drops the default-field entries of depths 1 through 6 in both
//! directions. Entries at other depths, or built for an explicit field list,
//! expire with the tree TTL. [`InvalidationCoordinator::purge_ids`] removes
//! every entry of a root when that window is not acceptable.

use std::ops::RangeInclusive;
use std::sync::Arc;

use async_trait::async_trait;
use studbook_orm::{DeletedEntity, DeletionObserver};
use tracing::{debug, warn};

use crate::builder::TreeBuilder;
use crate::error::PedigreeResult;
use crate::tree_cache::TreeCache;

/// Depths purged by targeted invalidation
pub const INVALIDATED_DEPTHS: RangeInclusive<u32> = 1..=6;

pub struct InvalidationCoordinator {
    builder: Arc<TreeBuilder>,
    cache: Arc<TreeCache>,
}

impl InvalidationCoordinator {
    pub fn new(builder: Arc<TreeBuilder>) -> Self {
        let cache = builder.cache().clone();
        Self { builder, cache }
    }

    /// Purge trees rooted at `id` and at its current parents.
    ///
    /// Call after the row's links changed; its parents are read from the
    /// table, so a row that no longer exists only purges its own entries.
    pub async fn invalidate_for(&self, id: i64) -> PedigreeResult<usize> {
        let mut ids = vec![id];
        ids.extend(self.builder.parents_of(id).await?);
        Ok(self.invalidate_ids(&ids))
    }

    /// Purge trees rooted at each of `ids`, without any lookup
    pub fn invalidate_ids(&self, ids: &[i64]) -> usize {
        let removed: usize = ids
            .iter()
            .map(|id| self.cache.invalidate_depths(*id, INVALIDATED_DEPTHS))
            .sum();
        debug!("Invalidated {} tree entries for {:?}", removed, ids);
        removed
    }

    /// Purge every cached tree rooted at each of `ids`
    pub fn purge_ids(&self, ids: &[i64]) -> usize {
        ids.iter().map(|id| self.cache.purge_root(*id)).sum()
    }
}

#[async_trait]
impl DeletionObserver for InvalidationCoordinator {
    async fn entity_deleted(&self, event: &DeletedEntity) {
        if event.entity_type != self.builder.layout().table {
            return;
        }
        if event.id <= 0 {
            warn!("Ignoring deletion event with invalid id {}", event.id);
            return;
        }

        // The row is gone, so its parents come from the event
        let mut ids = vec![event.id];
        ids.extend(event.linked_ids.iter().copied().filter(|id| *id != event.id));
        self.invalidate_ids(&ids);
    }
}
