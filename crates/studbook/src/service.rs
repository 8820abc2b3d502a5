//! The request-facing service
//!
//! [`Studbook`] owns one integrity checker, one tree builder and their
//! caches. Construct it once per process and share it behind an `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use studbook_cache::CacheStats;
use studbook_orm::{
    connect_pool, DatabasePool, DatabasePoolConfig, DeletionOutcome, DeletionService,
    DeletionSummary, IntegrityChecker, IntegrityWarning, RelationshipCatalog, SchemaSource,
};
use studbook_pedigree::{
    InvalidationCoordinator, PedigreeSchema, TreeBuilder, TreeKind, TreeResult,
};
use tracing::{debug, info};

use crate::config::StudbookConfig;
use crate::error::StudbookResult;

/// Stats of both caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceCacheStats {
    pub integrity: CacheStats,
    pub trees: CacheStats,
}

impl ServiceCacheStats {
    pub fn combined(&self) -> CacheStats {
        self.integrity.merge(self.trees)
    }
}

pub struct Studbook {
    pool: Arc<dyn DatabasePool>,
    checker: Arc<IntegrityChecker>,
    deletions: DeletionService,
    trees: Arc<TreeBuilder>,
    coordinator: Arc<InvalidationCoordinator>,
}

impl Studbook {
    /// Wire the service over an existing pool with the default pedigree layout
    pub fn new(pool: Arc<dyn DatabasePool>, schema: Arc<dyn SchemaSource>, config: &StudbookConfig) -> Self {
        Self::with_layout(pool, schema, PedigreeSchema::default(), config)
    }

    pub fn with_layout(
        pool: Arc<dyn DatabasePool>,
        schema: Arc<dyn SchemaSource>,
        layout: PedigreeSchema,
        config: &StudbookConfig,
    ) -> Self {
        let catalog = Arc::new(RelationshipCatalog::new(schema.clone()));
        let checker = Arc::new(IntegrityChecker::new(pool.clone(), catalog, config.integrity_config()));
        let trees = Arc::new(TreeBuilder::new(
            pool.clone(),
            schema,
            layout,
            config.tree_builder_config(),
        ));
        let coordinator = Arc::new(InvalidationCoordinator::new(trees.clone()));
        let deletions = DeletionService::new(checker.clone()).with_observer(coordinator.clone());

        Self {
            pool,
            checker,
            deletions,
            trees,
            coordinator,
        }
    }

    /// Connect to `STUDBOOK_DATABASE_URL` and wire the service
    pub async fn connect(config: &StudbookConfig, schema: Arc<dyn SchemaSource>) -> StudbookResult<Self> {
        let url = config.require_database_url()?;
        let pool = connect_pool(url, &DatabasePoolConfig::default()).await?;
        info!("Connected to {:?} database", pool.dialect());
        Ok(Self::new(pool, schema, config))
    }

    pub fn pool(&self) -> &Arc<dyn DatabasePool> {
        &self.pool
    }

    pub fn checker(&self) -> &Arc<IntegrityChecker> {
        &self.checker
    }

    pub fn trees(&self) -> &Arc<TreeBuilder> {
        &self.trees
    }

    pub async fn check_integrity(&self, entity_type: &str, id: i64) -> StudbookResult<Vec<IntegrityWarning>> {
        Ok(self.checker.check_integrity(entity_type, id).await?)
    }

    pub async fn check_integrity_batch(
        &self,
        entity_type: &str,
        ids: &[i64],
    ) -> StudbookResult<BTreeMap<i64, Vec<IntegrityWarning>>> {
        Ok(self.checker.check_integrity_batch(entity_type, ids).await?)
    }

    pub async fn can_delete_safely(&self, entity_type: &str, id: i64) -> StudbookResult<(bool, Vec<IntegrityWarning>)> {
        Ok(self.checker.can_delete_safely(entity_type, id).await?)
    }

    pub async fn deletion_summary(&self, entity_type: &str, id: i64) -> StudbookResult<DeletionSummary> {
        Ok(self.checker.deletion_summary(entity_type, id).await?)
    }

    /// Delete a record if nothing blocks it; caches are purged after commit
    pub async fn delete_entity(&self, entity_type: &str, id: i64) -> StudbookResult<DeletionOutcome> {
        Ok(self.deletions.delete(entity_type, id).await?)
    }

    pub async fn build_ancestor_tree(
        &self,
        root_id: i64,
        max_depth: u32,
        fields: Option<&[&str]>,
    ) -> StudbookResult<TreeResult> {
        Ok(self.trees.build(TreeKind::Ancestors, root_id, max_depth, fields).await?)
    }

    pub async fn build_descendant_tree(
        &self,
        root_id: i64,
        max_depth: u32,
        fields: Option<&[&str]>,
    ) -> StudbookResult<TreeResult> {
        Ok(self.trees.build(TreeKind::Descendants, root_id, max_depth, fields).await?)
    }

    /// Purge cached trees and integrity results after `id`'s parent links changed.
    ///
    /// Parents are read as they are now. When a link is replaced, call this
    /// before the update as well so the former parent is purged too.
    pub async fn invalidate_tree_cache_for(&self, id: i64) -> StudbookResult<usize> {
        let mut ids = vec![id];
        ids.extend(self.trees.parents_of(id).await?);

        let removed = self.coordinator.invalidate_ids(&ids);
        let table = &self.trees.layout().table;
        for id in &ids {
            self.checker.invalidate(table, *id);
        }
        debug!("Invalidated caches for {:?}", ids);
        Ok(removed)
    }

    /// Drop a cached integrity result
    pub fn invalidate_integrity(&self, entity_type: &str, id: i64) -> bool {
        self.checker.invalidate(entity_type, id)
    }

    pub fn cache_stats(&self) -> ServiceCacheStats {
        ServiceCacheStats {
            integrity: self.checker.cache_stats(),
            trees: self.trees.cache().stats(),
        }
    }

    /// Empty both caches; discovered relationships are kept
    pub fn clear_cache(&self) {
        self.checker.clear_cache();
        self.trees.cache().clear();
        info!("Integrity and tree caches cleared");
    }
}
