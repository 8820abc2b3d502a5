//! Level-synchronous pedigree traversal
//!
//! Each level costs one query per `max_in_list` frontier ids: ancestors are
//! fetched by id list, descendants by `father IN (..) OR mother IN (..)`.
//! Parent links of fetched rows come back with the row, so the next level
//! never needs a separate lookup.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value as JsonValue;
use studbook_orm::{
    DatabasePool, DatabaseRow, DatabaseRowExt, IdentifierAllowList, ModelError, ParamList,
    SchemaSource,
};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::{PedigreeSchema, TreeBuilderConfig};
use crate::error::{PedigreeError, PedigreeResult};
use crate::tree_cache::TreeCache;
use crate::types::{
    EdgeExamples, Relation, SexBucket, TreeCounts, TreeEdge, TreeKind, TreeNode, TreeResult,
    TreeSummary, UNKNOWN_SPECIES,
};

/// One fetched row of the pedigree table
#[derive(Debug, Clone)]
struct NodeRecord {
    father: Option<i64>,
    mother: Option<i64>,
    sex: Option<String>,
    breed: Option<i64>,
    fields: BTreeMap<String, JsonValue>,
}

impl NodeRecord {
    fn parent_links(&self) -> impl Iterator<Item = (i64, Relation)> {
        let father = self.father.map(|id| (id, Relation::Father));
        let mother = self.mother.map(|id| (id, Relation::Mother));
        father.into_iter().chain(mother)
    }
}

/// Quoted select list plus the field names reported on nodes
struct Selection {
    sql: String,
    fields: Vec<String>,
}

/// Nodes in discovery order
#[derive(Default)]
struct Traversal {
    order: Vec<i64>,
    records: HashMap<i64, NodeRecord>,
    depth_reached: u32,
}

impl Traversal {
    /// Add unseen rows; returns the ids that were new
    fn absorb(&mut self, rows: Vec<(i64, NodeRecord)>) -> Vec<i64> {
        let mut added = Vec::new();
        for (id, record) in rows {
            if self.records.contains_key(&id) {
                continue;
            }
            self.records.insert(id, record);
            self.order.push(id);
            added.push(id);
        }
        added
    }

    /// Every parent link whose endpoints are both materialized
    fn edges(&self) -> Vec<TreeEdge> {
        let mut edges = Vec::new();
        for &child in &self.order {
            let Some(record) = self.records.get(&child) else {
                continue;
            };
            for (parent, relation) in record.parent_links() {
                if parent != child && self.records.contains_key(&parent) {
                    edges.push(TreeEdge {
                        from: parent,
                        to: child,
                        relation,
                    });
                }
            }
        }
        edges
    }
}

pub struct TreeBuilder {
    pool: Arc<dyn DatabasePool>,
    schema: Arc<dyn SchemaSource>,
    layout: PedigreeSchema,
    config: TreeBuilderConfig,
    cache: Arc<TreeCache>,
    allow_list: OnceCell<IdentifierAllowList>,
}

impl TreeBuilder {
    pub fn new(
        pool: Arc<dyn DatabasePool>,
        schema: Arc<dyn SchemaSource>,
        layout: PedigreeSchema,
        config: TreeBuilderConfig,
    ) -> Self {
        let cache = Arc::new(TreeCache::new(config.cache_ttl));
        Self {
            pool,
            schema,
            layout,
            config,
            cache,
            allow_list: OnceCell::new(),
        }
    }

    pub fn layout(&self) -> &PedigreeSchema {
        &self.layout
    }

    pub fn config(&self) -> &TreeBuilderConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TreeCache> {
        &self.cache
    }

    pub async fn build_ancestor_tree(
        &self,
        root_id: i64,
        max_depth: u32,
        fields: Option<&[&str]>,
    ) -> PedigreeResult<TreeResult> {
        self.build(TreeKind::Ancestors, root_id, max_depth, fields).await
    }

    pub async fn build_descendant_tree(
        &self,
        root_id: i64,
        max_depth: u32,
        fields: Option<&[&str]>,
    ) -> PedigreeResult<TreeResult> {
        self.build(TreeKind::Descendants, root_id, max_depth, fields).await
    }

    /// Build a tree, serving and filling the tree cache
    pub async fn build(
        &self,
        kind: TreeKind,
        root_id: i64,
        max_depth: u32,
        fields: Option<&[&str]>,
    ) -> PedigreeResult<TreeResult> {
        validate_root(root_id)?;
        if max_depth > self.config.max_depth {
            return Err(PedigreeError::Validation(format!(
                "Depth {} exceeds the limit of {}",
                max_depth, self.config.max_depth
            )));
        }

        let fields = fields.filter(|f| !f.is_empty());
        let selection = self.selection(fields).await?;

        if let Some(hit) = self.cache.get(kind, root_id, max_depth, fields) {
            debug!("Tree cache hit: {} of {} at depth {}", kind, root_id, max_depth);
            return Ok(hit);
        }

        let result = self.traverse(kind, root_id, max_depth, &selection).await?;
        if result.is_empty() {
            debug!("Root {} not found, result not cached", root_id);
        } else {
            self.cache.store(&result, fields);
        }
        Ok(result)
    }

    /// Parent ids currently recorded for `id`
    pub async fn parents_of(&self, id: i64) -> PedigreeResult<Vec<i64>> {
        validate_root(id)?;
        let allow = self.allow_list().await;
        let table = &self.layout.table;
        let father = allow.column(table, &self.layout.father_column)?;
        let mother = allow.column(table, &self.layout.mother_column)?;

        let mut params = ParamList::new(self.pool.dialect());
        let sql = format!(
            "SELECT {} AS father, {} AS mother FROM {} WHERE {} = {}",
            father,
            mother,
            allow.table(table)?,
            allow.column(table, &self.layout.id_column)?,
            params.push(id)
        );

        let Some(row) = self.pool.fetch_optional(&sql, params.values()).await? else {
            return Ok(Vec::new());
        };
        let mut parents = Vec::new();
        for column in ["father", "mother"] {
            if let Some(parent) = row.get_optional_i64(column)? {
                if !parents.contains(&parent) {
                    parents.push(parent);
                }
            }
        }
        Ok(parents)
    }

    async fn allow_list(&self) -> &IdentifierAllowList {
        self.allow_list
            .get_or_init(|| async {
                let mut allow = IdentifierAllowList::new();
                for table in [&self.layout.table, &self.layout.breed_table] {
                    match self.schema.list_columns(table).await {
                        Ok(columns) => allow.allow_table(table, columns.into_iter().map(|c| c.name)),
                        Err(e) => {
                            warn!("Columns of '{}' unavailable, accepting any valid name: {}", table, e);
                            allow.allow_table_unchecked(table);
                        }
                    }
                }
                allow
            })
            .await
    }

    async fn selection(&self, fields: Option<&[&str]>) -> PedigreeResult<Selection> {
        let allow = self.allow_list().await;
        let table = &self.layout.table;

        let requested: Vec<String> = match fields {
            Some(fields) => fields.iter().map(|f| f.to_string()).collect(),
            None => self.layout.default_fields.clone(),
        };

        let mut node_fields: Vec<String> = Vec::new();
        for field in requested {
            allow.column(table, &field).map_err(|e| {
                PedigreeError::Validation(format!("Unknown field '{}': {}", field, e))
            })?;
            if !node_fields.contains(&field) {
                node_fields.push(field);
            }
        }

        let mut columns: Vec<&str> = Vec::new();
        for column in self.layout.structural_columns().into_iter().chain(node_fields.iter().map(String::as_str)) {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        let quoted = columns
            .iter()
            .map(|c| allow.column(table, c))
            .collect::<Result<Vec<_>, ModelError>>()?;

        Ok(Selection {
            sql: format!("SELECT {} FROM {}", quoted.join(", "), allow.table(table)?),
            fields: node_fields,
        })
    }

    async fn traverse(
        &self,
        kind: TreeKind,
        root_id: i64,
        max_depth: u32,
        selection: &Selection,
    ) -> PedigreeResult<TreeResult> {
        let allow = self.allow_list().await;
        let table = &self.layout.table;
        let id_column = allow.column(table, &self.layout.id_column)?;

        let mut params = ParamList::new(self.pool.dialect());
        let sql = format!("{} WHERE {} = {}", selection.sql, id_column, params.push(root_id));
        let root = match self.pool.fetch_optional(&sql, params.values()).await? {
            Some(row) => self.record(&*row, &selection.fields)?,
            None => return Ok(TreeResult::empty(root_id, kind, max_depth)),
        };

        let mut traversal = Traversal::default();
        let mut frontier = traversal.absorb(vec![root]);

        let mut level = 0;
        while !frontier.is_empty() && level < max_depth {
            level += 1;
            let rows = match kind {
                TreeKind::Ancestors => {
                    let mut wanted: Vec<i64> = Vec::new();
                    for id in &frontier {
                        if let Some(record) = traversal.records.get(id) {
                            for (parent, _) in record.parent_links() {
                                if !traversal.records.contains_key(&parent) && !wanted.contains(&parent) {
                                    wanted.push(parent);
                                }
                            }
                        }
                    }
                    if wanted.is_empty() {
                        break;
                    }
                    self.fetch_by_ids(selection, &id_column, &wanted).await?
                }
                TreeKind::Descendants => self.fetch_children(selection, &frontier).await?,
            };

            frontier = traversal.absorb(rows);
            if !frontier.is_empty() {
                traversal.depth_reached = level;
            }
            debug!("{} level {} of {} added {} nodes", kind, level, root_id, frontier.len());
        }

        let species = self.species_lookup(&traversal).await;
        Ok(self.assemble(kind, root_id, max_depth, traversal, &species))
    }

    async fn fetch_by_ids(
        &self,
        selection: &Selection,
        id_column: &str,
        ids: &[i64],
    ) -> PedigreeResult<Vec<(i64, NodeRecord)>> {
        let mut rows = Vec::new();
        for chunk in ids.chunks(self.chunk_size()) {
            let mut params = ParamList::new(self.pool.dialect());
            let sql = format!(
                "{} WHERE {} IN ({}) ORDER BY {}",
                selection.sql,
                id_column,
                params.push_list(chunk.iter().copied()),
                id_column
            );
            rows.extend(self.fetch_records(&sql, params, &selection.fields).await?);
        }
        Ok(merge_chunks(rows))
    }

    async fn fetch_children(&self, selection: &Selection, frontier: &[i64]) -> PedigreeResult<Vec<(i64, NodeRecord)>> {
        let allow = self.allow_list().await;
        let table = &self.layout.table;
        let father = allow.column(table, &self.layout.father_column)?;
        let mother = allow.column(table, &self.layout.mother_column)?;
        let id_column = allow.column(table, &self.layout.id_column)?;

        let mut rows = Vec::new();
        for chunk in frontier.chunks(self.chunk_size()) {
            let mut params = ParamList::new(self.pool.dialect());
            let fathers = params.push_list(chunk.iter().copied());
            let mothers = params.push_list(chunk.iter().copied());
            let sql = format!(
                "{} WHERE {} IN ({}) OR {} IN ({}) ORDER BY {}",
                selection.sql, father, fathers, mother, mothers, id_column
            );
            rows.extend(self.fetch_records(&sql, params, &selection.fields).await?);
        }
        Ok(merge_chunks(rows))
    }

    fn chunk_size(&self) -> usize {
        self.config.max_in_list.max(1)
    }

    async fn fetch_records(
        &self,
        sql: &str,
        params: ParamList,
        fields: &[String],
    ) -> PedigreeResult<Vec<(i64, NodeRecord)>> {
        let rows = self.pool.fetch_all(sql, params.values()).await?;
        rows.iter().map(|row| self.record(&**row, fields)).collect()
    }

    fn record(&self, row: &dyn DatabaseRow, fields: &[String]) -> PedigreeResult<(i64, NodeRecord)> {
        let id = row.get_i64(&self.layout.id_column)?;
        let mut values = BTreeMap::new();
        for field in fields {
            values.insert(field.clone(), row.get_by_name(field)?.to_json());
        }
        let record = NodeRecord {
            father: row.get_optional_i64(&self.layout.father_column)?,
            mother: row.get_optional_i64(&self.layout.mother_column)?,
            sex: row.get_optional_string(&self.layout.sex_column)?,
            breed: row.get_optional_i64(&self.layout.breed_column)?,
            fields: values,
        };
        Ok((id, record))
    }

    /// Species per breed id in one query; failures leave every node unknown
    async fn species_lookup(&self, traversal: &Traversal) -> HashMap<i64, String> {
        let mut breeds: Vec<i64> = traversal.records.values().filter_map(|r| r.breed).collect();
        breeds.sort_unstable();
        breeds.dedup();
        if breeds.is_empty() {
            return HashMap::new();
        }

        match self.fetch_species(&breeds).await {
            Ok(species) => species,
            Err(e) => {
                warn!("Species lookup failed, reporting '{}': {}", UNKNOWN_SPECIES, e);
                HashMap::new()
            }
        }
    }

    async fn fetch_species(&self, breeds: &[i64]) -> PedigreeResult<HashMap<i64, String>> {
        let allow = self.allow_list().await;
        let table = &self.layout.breed_table;
        let key = allow.column(table, &self.layout.breed_id_column)?;
        let species_column = allow.column(table, &self.layout.species_column)?;
        let quoted_table = allow.table(table)?;

        let mut species = HashMap::new();
        for chunk in breeds.chunks(self.chunk_size()) {
            let mut params = ParamList::new(self.pool.dialect());
            let sql = format!(
                "SELECT {} AS breed_key, {} AS species FROM {} WHERE {} IN ({})",
                key,
                species_column,
                quoted_table,
                key,
                params.push_list(chunk.iter().copied())
            );
            for row in self.pool.fetch_all(&sql, params.values()).await? {
                if let Some(name) = row.get_optional_string("species")? {
                    species.insert(row.get_i64("breed_key")?, name);
                }
            }
        }
        Ok(species)
    }

    fn sex_bucket(&self, sex: Option<&str>) -> SexBucket {
        let Some(sex) = sex.map(|s| s.trim().to_lowercase()) else {
            return SexBucket::Unknown;
        };
        if self.layout.male_values.iter().any(|v| *v == sex) {
            SexBucket::Male
        } else if self.layout.female_values.iter().any(|v| *v == sex) {
            SexBucket::Female
        } else {
            SexBucket::Unknown
        }
    }

    fn assemble(
        &self,
        kind: TreeKind,
        root_id: i64,
        max_depth: u32,
        traversal: Traversal,
        species: &HashMap<i64, String>,
    ) -> TreeResult {
        let edges = traversal.edges();

        let mut sex_of: HashMap<i64, SexBucket> = HashMap::new();
        let mut species_of: HashMap<i64, String> = HashMap::new();
        let mut summary = TreeSummary::default();
        for bucket in SexBucket::ALL {
            summary.sex_counts.insert(bucket.as_str().to_string(), 0);
        }
        for relation in [Relation::Father, Relation::Mother] {
            summary.relation_counts.insert(relation.as_str().to_string(), 0);
        }

        for (id, record) in &traversal.records {
            let bucket = self.sex_bucket(record.sex.as_deref());
            let name = record
                .breed
                .and_then(|breed| species.get(&breed).cloned())
                .unwrap_or_else(|| UNKNOWN_SPECIES.to_string());
            *summary.sex_counts.entry(bucket.as_str().to_string()).or_default() += 1;
            *summary.species_counts.entry(name.clone()).or_default() += 1;
            sex_of.insert(*id, bucket);
            species_of.insert(*id, name);
        }

        let mut examples = EdgeExamples::default();
        let limit = self.config.example_limit;
        for edge in &edges {
            *summary.relation_counts.entry(edge.relation.as_str().to_string()).or_default() += 1;

            let bucket = sex_of.get(&edge.from).copied().unwrap_or(SexBucket::Unknown);
            let by_sex = examples.by_sex.entry(bucket.as_str().to_string()).or_default();
            if by_sex.len() < limit {
                by_sex.push(*edge);
            }

            let name = species_of
                .get(&edge.from)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_SPECIES.to_string());
            let by_species = examples.by_species.entry(name).or_default();
            if by_species.len() < limit {
                by_species.push(*edge);
            }
        }

        let counts = TreeCounts {
            nodes: traversal.order.len(),
            edges: edges.len(),
        };
        summary.text = summary_text(kind, root_id, traversal.depth_reached, counts, &summary);

        let mut records = traversal.records;
        let nodes = traversal
            .order
            .iter()
            .filter_map(|id| {
                records
                    .remove(id)
                    .map(|record| (*id, TreeNode { id: *id, fields: record.fields }))
            })
            .collect();

        TreeResult {
            root_id,
            kind,
            max_depth,
            nodes,
            edges,
            depth_reached: traversal.depth_reached,
            counts,
            summary,
            edge_examples: examples,
            generated_at: chrono::Utc::now(),
        }
    }
}

/// Rows of several chunked queries, ordered by id with duplicates dropped
fn merge_chunks(mut rows: Vec<(i64, NodeRecord)>) -> Vec<(i64, NodeRecord)> {
    rows.sort_by_key(|(id, _)| *id);
    rows.dedup_by_key(|(id, _)| *id);
    rows
}

fn validate_root(id: i64) -> PedigreeResult<()> {
    if id <= 0 {
        return Err(PedigreeError::Validation(format!(
            "Invalid id {}: ids must be positive",
            id
        )));
    }
    Ok(())
}

fn summary_text(kind: TreeKind, root_id: i64, depth: u32, counts: TreeCounts, summary: &TreeSummary) -> String {
    let sex = |bucket: SexBucket| summary.sex_counts.get(bucket.as_str()).copied().unwrap_or(0);
    let species = if summary.species_counts.is_empty() {
        "none".to_string()
    } else {
        summary
            .species_counts
            .iter()
            .map(|(name, count)| format!("{} {}", name, count))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "{} of {}: {} nodes, {} edges over {} generation(s); {} male, {} female, {} unknown sex; species: {}",
        kind,
        root_id,
        counts.nodes,
        counts.edges,
        depth,
        sex(SexBucket::Male),
        sex(SexBucket::Female),
        sex(SexBucket::Unknown),
        species
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(father: Option<i64>, mother: Option<i64>) -> NodeRecord {
        NodeRecord {
            father,
            mother,
            sex: None,
            breed: None,
            fields: BTreeMap::new(),
        }
    }

    #[test]
    fn test_absorb_skips_known_ids() {
        let mut traversal = Traversal::default();
        assert_eq!(traversal.absorb(vec![(1, record(None, None))]), vec![1]);
        assert_eq!(
            traversal.absorb(vec![(1, record(None, None)), (2, record(None, None))]),
            vec![2]
        );
        assert_eq!(traversal.order, vec![1, 2]);
    }

    #[test]
    fn test_edges_need_both_endpoints() {
        let mut traversal = Traversal::default();
        traversal.absorb(vec![
            (3, record(Some(1), Some(2))),
            (1, record(Some(9), None)),
            (4, record(Some(4), None)),
        ]);

        assert_eq!(
            traversal.edges(),
            vec![TreeEdge {
                from: 1,
                to: 3,
                relation: Relation::Father
            }]
        );
    }

    #[test]
    fn test_merge_chunks_orders_and_dedups() {
        let rows = vec![
            (5, record(None, None)),
            (2, record(Some(1), None)),
            (5, record(None, None)),
            (3, record(None, None)),
        ];
        let ids: Vec<i64> = merge_chunks(rows).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![2, 3, 5]);
    }

    #[test]
    fn test_summary_text_lists_species() {
        let mut summary = TreeSummary::default();
        summary.sex_counts.insert("male".into(), 2);
        summary.species_counts.insert("dog".into(), 3);
        let text = summary_text(
            TreeKind::Ancestors,
            5,
            1,
            TreeCounts { nodes: 3, edges: 2 },
            &summary,
        );
        assert_eq!(
            text,
            "ancestors of 5: 3 nodes, 2 edges over 1 generation(s); 2 male, 0 female, 0 unknown sex; species: dog 3"
        );
    }
}
