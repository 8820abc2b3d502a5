//! Dependency checks against discovered relationships
//!
//! Single checks use `EXISTS` probes, batch checks use grouped counts; both
//! report one warning per referencing `(table, field)` with existence
//! semantics, so a batch answer is identical to the single answers. Exact
//! counts are only computed for deletion summaries.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use studbook_cache::{CacheConfig, CacheStats, TtlCache};
use tracing::{debug, warn};

use super::probes::{
    self, batch_query, count_query, existence_query, Probe, COUNT_COLUMN, OWNER_COLUMN,
    PRESENT_COLUMN, PROBE_COLUMN,
};
use super::types::{DeletionSummary, IntegrityWarning};
use crate::backends::{DatabasePool, DatabaseRow, DatabaseRowExt, Executor};
use crate::error::{ModelError, OrmResult};
use crate::relationships::{EntityRelationships, RelationshipCatalog};

/// Integrity checker settings
#[derive(Debug, Clone)]
pub struct IntegrityConfig {
    /// How long a single-id result stays cached
    pub cache_ttl: Duration,
    /// Largest accepted batch
    pub max_batch_size: usize,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30),
            max_batch_size: 100,
        }
    }
}

impl IntegrityConfig {
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }
}

/// Ids are positive integers
pub fn validate_id(id: i64) -> OrmResult<()> {
    if id <= 0 {
        return Err(ModelError::Validation(format!(
            "Invalid id {}: ids must be positive",
            id
        )));
    }
    Ok(())
}

/// Cache key of a single integrity result
pub fn integrity_cache_key(entity_type: &str, id: i64) -> String {
    format!("integrity:{}:{}", entity_type, id)
}

pub struct IntegrityChecker {
    pool: Arc<dyn DatabasePool>,
    catalog: Arc<RelationshipCatalog>,
    cache: TtlCache<Vec<IntegrityWarning>>,
    config: IntegrityConfig,
}

impl IntegrityChecker {
    pub fn new(pool: Arc<dyn DatabasePool>, catalog: Arc<RelationshipCatalog>, config: IntegrityConfig) -> Self {
        let cache = TtlCache::new(CacheConfig::new("integrity").with_ttl(config.cache_ttl));
        Self {
            pool,
            catalog,
            cache,
            config,
        }
    }

    pub fn pool(&self) -> &Arc<dyn DatabasePool> {
        &self.pool
    }

    pub fn catalog(&self) -> &Arc<RelationshipCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &IntegrityConfig {
        &self.config
    }

    /// Warnings for every relationship that references `id`
    pub async fn check_integrity(&self, entity_type: &str, id: i64) -> OrmResult<Vec<IntegrityWarning>> {
        validate_id(id)?;
        let key = integrity_cache_key(entity_type, id);
        if let Some(warnings) = self.cache.get(&key) {
            return Ok(warnings);
        }

        let relationships = self.catalog.relationships(entity_type).await?;
        let mut executor = Executor::Pool(self.pool.as_ref());
        let warnings = self.probe_single(&mut executor, &relationships, id).await;

        if warnings.iter().any(IntegrityWarning::is_unverified) {
            debug!(entity_type, id, "Not caching a partially verified result");
        } else {
            self.cache.set(key, warnings.clone());
        }
        Ok(warnings)
    }

    /// Warnings for several ids of one entity type, keyed by id
    pub async fn check_integrity_batch(
        &self,
        entity_type: &str,
        ids: &[i64],
    ) -> OrmResult<BTreeMap<i64, Vec<IntegrityWarning>>> {
        if ids.len() > self.config.max_batch_size {
            return Err(ModelError::Validation(format!(
                "Batch of {} ids exceeds the limit of {}",
                ids.len(),
                self.config.max_batch_size
            )));
        }
        for &id in ids {
            validate_id(id)?;
        }

        let mut results: BTreeMap<i64, Vec<IntegrityWarning>> = BTreeMap::new();
        let mut missing: Vec<i64> = Vec::new();
        for &id in ids {
            if results.contains_key(&id) || missing.contains(&id) {
                continue;
            }
            match self.cache.get(&integrity_cache_key(entity_type, id)) {
                Some(warnings) => {
                    results.insert(id, warnings);
                }
                None => missing.push(id),
            }
        }
        if missing.is_empty() {
            return Ok(results);
        }

        let relationships = self.catalog.relationships(entity_type).await?;
        let mut executor = Executor::Pool(self.pool.as_ref());
        let mut found: HashMap<i64, Vec<(usize, IntegrityWarning)>> =
            missing.iter().map(|&id| (id, Vec::new())).collect();

        for group in probes::plan(&relationships) {
            match self
                .probe_batch(&mut executor, &relationships, &group.probes, &missing)
                .await
            {
                Ok(hits) => collect_hits(&mut found, hits),
                Err(e) => {
                    warn!(
                        entity_type,
                        direction = ?group.direction,
                        error = %e,
                        "Grouped batch probe failed; retrying per relationship"
                    );
                    let mut unverified = false;
                    for probe in &group.probes {
                        match self
                            .probe_batch(&mut executor, &relationships, std::slice::from_ref(probe), &missing)
                            .await
                        {
                            Ok(hits) => collect_hits(&mut found, hits),
                            Err(e) => {
                                warn!(entity_type, table = %probe.table, field = %probe.field, error = %e, "Batch probe failed");
                                unverified = true;
                            }
                        }
                    }
                    if unverified {
                        let sentinel = IntegrityWarning::unverified(&group.relationship_names());
                        for hits in found.values_mut() {
                            hits.push((usize::MAX, sentinel.clone()));
                        }
                    }
                }
            }
        }

        for id in missing {
            let warnings = into_ordered(found.remove(&id).unwrap_or_default());
            if !warnings.iter().any(IntegrityWarning::is_unverified) {
                self.cache.set(integrity_cache_key(entity_type, id), warnings.clone());
            }
            results.insert(id, warnings);
        }
        Ok(results)
    }

    /// True when every dependent would be removed by cascading deletes
    pub async fn can_delete_safely(&self, entity_type: &str, id: i64) -> OrmResult<(bool, Vec<IntegrityWarning>)> {
        let warnings = self.check_integrity(entity_type, id).await?;
        let safe = warnings.iter().all(|w| w.cascade_on_delete);
        Ok((safe, warnings))
    }

    /// What deleting `id` would involve, with exact dependent counts
    pub async fn deletion_summary(&self, entity_type: &str, id: i64) -> OrmResult<DeletionSummary> {
        let warnings = self.check_integrity(entity_type, id).await?;
        let relationships = self.catalog.relationships(entity_type).await?;
        let mut executor = Executor::Pool(self.pool.as_ref());
        let warnings = self
            .with_exact_counts(&mut executor, &relationships, id, warnings)
            .await;
        Ok(DeletionSummary::from_warnings(warnings))
    }

    /// Drop the cached result for one id
    pub fn invalidate(&self, entity_type: &str, id: i64) -> bool {
        self.cache.invalidate(&integrity_cache_key(entity_type, id))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Existence probes for one id, one round trip per direction group
    pub(crate) async fn probe_single(
        &self,
        executor: &mut Executor<'_>,
        relationships: &EntityRelationships,
        id: i64,
    ) -> Vec<IntegrityWarning> {
        let mut hits = Vec::new();
        for group in probes::plan(relationships) {
            match self.probe_exists(executor, relationships, &group.probes, id).await {
                Ok(group_hits) => hits.extend(group_hits),
                Err(e) => {
                    warn!(
                        entity_type = %relationships.entity_type,
                        id,
                        direction = ?group.direction,
                        error = %e,
                        "Grouped probe failed; retrying per relationship"
                    );
                    let mut unverified = false;
                    for probe in &group.probes {
                        match self
                            .probe_exists(executor, relationships, std::slice::from_ref(probe), id)
                            .await
                        {
                            Ok(probe_hits) => hits.extend(probe_hits),
                            Err(e) => {
                                warn!(table = %probe.table, field = %probe.field, error = %e, "Probe failed");
                                unverified = true;
                            }
                        }
                    }
                    if unverified {
                        hits.push((usize::MAX, IntegrityWarning::unverified(&group.relationship_names())));
                    }
                }
            }
        }
        into_ordered(hits)
    }

    /// Replace existence counts with exact counts, dropping relationships
    /// that turned out to be empty. Keeps the existence counts if counting fails.
    pub(crate) async fn with_exact_counts(
        &self,
        executor: &mut Executor<'_>,
        relationships: &EntityRelationships,
        id: i64,
        warnings: Vec<IntegrityWarning>,
    ) -> Vec<IntegrityWarning> {
        let all_probes: Vec<Probe> = probes::plan(relationships)
            .into_iter()
            .flat_map(|group| group.probes)
            .collect();
        let probe_for = |warning: &IntegrityWarning| {
            all_probes
                .iter()
                .find(|p| p.table == warning.dependent_entity_type && p.field == warning.dependent_field)
        };

        let mut needed: Vec<Probe> = Vec::new();
        for warning in warnings.iter().filter(|w| !w.is_unverified()) {
            if let Some(probe) = probe_for(warning) {
                if !needed.contains(probe) {
                    needed.push(probe.clone());
                }
            }
        }
        if needed.is_empty() {
            return warnings;
        }

        let counts = match self.count_dependents(executor, relationships, &needed, id).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(entity_type = %relationships.entity_type, id, error = %e, "Counting dependents failed");
                return warnings;
            }
        };

        warnings
            .into_iter()
            .filter_map(|warning| {
                let count = probe_for(&warning).and_then(|p| counts.get(&p.order).copied());
                match count {
                    Some(0) => None,
                    Some(count) => Some(warning.with_count(count)),
                    None => Some(warning),
                }
            })
            .collect()
    }

    async fn probe_exists(
        &self,
        executor: &mut Executor<'_>,
        relationships: &EntityRelationships,
        probes: &[Probe],
        id: i64,
    ) -> OrmResult<Vec<(usize, IntegrityWarning)>> {
        let query = existence_query(relationships, probes, id, self.pool.dialect())?;
        let rows = executor.fetch_all(&query.sql, &query.params).await?;

        let mut hits = Vec::new();
        for row in rows {
            if !row.get_bool(PRESENT_COLUMN)? {
                continue;
            }
            let probe = find_probe(probes, &*row)?;
            hits.push((
                probe.order,
                IntegrityWarning::present(&probe.table, &probe.field, probe.cascade_on_delete),
            ));
        }
        Ok(hits)
    }

    async fn probe_batch(
        &self,
        executor: &mut Executor<'_>,
        relationships: &EntityRelationships,
        probes: &[Probe],
        ids: &[i64],
    ) -> OrmResult<Vec<(i64, usize, IntegrityWarning)>> {
        let query = batch_query(relationships, probes, ids, self.pool.dialect())?;
        let rows = executor.fetch_all(&query.sql, &query.params).await?;

        let mut hits = Vec::new();
        for row in rows {
            if row.get_i64(COUNT_COLUMN)? == 0 {
                continue;
            }
            let probe = find_probe(probes, &*row)?;
            hits.push((
                row.get_i64(OWNER_COLUMN)?,
                probe.order,
                IntegrityWarning::present(&probe.table, &probe.field, probe.cascade_on_delete),
            ));
        }
        Ok(hits)
    }

    async fn count_dependents(
        &self,
        executor: &mut Executor<'_>,
        relationships: &EntityRelationships,
        probes: &[Probe],
        id: i64,
    ) -> OrmResult<HashMap<usize, u64>> {
        let query = count_query(relationships, probes, id, self.pool.dialect())?;
        let rows = executor.fetch_all(&query.sql, &query.params).await?;

        let mut counts = HashMap::new();
        for row in rows {
            let probe = find_probe(probes, &*row)?;
            let count = u64::try_from(row.get_i64(COUNT_COLUMN)?).unwrap_or(0);
            counts.insert(probe.order, count);
        }
        Ok(counts)
    }
}

fn find_probe<'p>(probes: &'p [Probe], row: &dyn DatabaseRow) -> OrmResult<&'p Probe> {
    let order = row.get_i64(PROBE_COLUMN)?;
    probes
        .iter()
        .find(|p| i64::try_from(p.order).is_ok_and(|o| o == order))
        .ok_or_else(|| ModelError::Query(format!("Probe result {} has no matching probe", order)))
}

fn collect_hits(found: &mut HashMap<i64, Vec<(usize, IntegrityWarning)>>, hits: Vec<(i64, usize, IntegrityWarning)>) {
    for (id, order, warning) in hits {
        if let Some(entry) = found.get_mut(&id) {
            entry.push((order, warning));
        }
    }
}

/// Discovery order, with unverified warnings last
fn into_ordered(mut hits: Vec<(usize, IntegrityWarning)>) -> Vec<IntegrityWarning> {
    hits.sort_by_key(|(order, _)| *order);
    hits.into_iter().map(|(_, warning)| warning).collect()
}
