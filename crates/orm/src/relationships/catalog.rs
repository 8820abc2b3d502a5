//! Relationship catalog
//!
//! Discovers, per entity type, every relationship whose rows depend on an
//! instance of that type, and memoizes the result for the life of the
//! process. Discovery degrades instead of failing: a table whose columns
//! cannot be listed is skipped (reverse scan) or falls back to the columns
//! named by the declaration (declared relations).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::metadata::{RelationshipDescriptor, RelationshipDirection};
use crate::error::{ModelError, OrmResult};
use crate::schema::{ColumnInfo, DeclaredRelation, SchemaSource};
use crate::security::IdentifierAllowList;

/// Everything discovery learned about one entity type
#[derive(Debug, Clone)]
pub struct EntityRelationships {
    pub entity_type: String,
    pub table: String,
    pub primary_key: String,
    /// Declared relations first, in declaration order, then reverse
    /// relations in table enumeration order
    pub descriptors: Vec<RelationshipDescriptor>,
    pub allow_list: IdentifierAllowList,
}

impl EntityRelationships {
    pub fn by_direction(
        &self,
        direction: RelationshipDirection,
    ) -> impl Iterator<Item = &RelationshipDescriptor> + '_ {
        self.descriptors.iter().filter(move |d| d.direction == direction)
    }

    /// Columns of the entity's own table that link to other instances
    pub fn self_link_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for descriptor in self.by_direction(RelationshipDirection::SelfReference) {
            for field in &descriptor.foreign_key_fields {
                if !fields.contains(&field.as_str()) {
                    fields.push(field);
                }
            }
        }
        fields
    }
}

/// Memoized relationship discovery over a [`SchemaSource`]
pub struct RelationshipCatalog {
    schema: Arc<dyn SchemaSource>,
    entries: DashMap<String, Arc<EntityRelationships>>,
}

impl RelationshipCatalog {
    pub fn new(schema: Arc<dyn SchemaSource>) -> Self {
        Self {
            schema,
            entries: DashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<dyn SchemaSource> {
        &self.schema
    }

    /// Relationships of an entity type, discovered on first use
    pub async fn relationships(&self, entity_type: &str) -> OrmResult<Arc<EntityRelationships>> {
        if let Some(entry) = self.entries.get(entity_type) {
            return Ok(Arc::clone(entry.value()));
        }

        let discovered = Arc::new(self.discover(entity_type).await?);
        debug!(
            entity_type,
            relationships = discovered.descriptors.len(),
            "Discovered relationships"
        );

        // A concurrent discovery may have won; both results are equivalent.
        let entry = self
            .entries
            .entry(entity_type.to_string())
            .or_insert(discovered);
        Ok(Arc::clone(entry.value()))
    }

    /// Forget memoized descriptors, e.g. after a migration
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn cached_entity_types(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    async fn discover(&self, entity_type: &str) -> OrmResult<EntityRelationships> {
        crate::security::validate_identifier(entity_type)?;
        let table = entity_type.to_string();

        let tables = match self.schema.list_tables().await {
            Ok(tables) => {
                if !tables.contains(&table) {
                    return Err(ModelError::Schema(format!(
                        "Unknown entity type '{}'",
                        entity_type
                    )));
                }
                Some(tables)
            }
            Err(e) => {
                warn!(entity_type, error = %e, "Table listing failed; reverse relations unavailable");
                None
            }
        };

        let primary_key = match self.schema.primary_key(&table).await {
            Ok(pk) => pk,
            Err(e) => {
                warn!(entity_type, error = %e, "Primary key lookup failed; assuming 'id'");
                "id".to_string()
            }
        };

        let mut columns = ColumnLookup::new(self.schema.as_ref());
        let mut allow_list = IdentifierAllowList::new();
        match columns.get(&table).await {
            Some(known) => allow_list.allow_table(&table, known.iter().map(|c| c.name.clone())),
            None => allow_list.allow_table_unchecked(&table),
        }

        let declared = match self.schema.list_declared_relations(entity_type).await {
            Ok(declared) => declared,
            Err(e) => {
                warn!(entity_type, error = %e, "Declared relations unavailable");
                Vec::new()
            }
        };

        let mut descriptors = Vec::new();
        for relation in &declared {
            if let Some(descriptor) = self
                .resolve_declared(&table, &primary_key, relation, &mut columns, &mut allow_list)
                .await
            {
                descriptors.push(descriptor);
            }
        }

        if let Some(tables) = tables {
            for other in tables.iter().filter(|t| **t != table) {
                let Some(other_columns) = columns.get(other).await else {
                    continue;
                };
                for column in other_columns.iter().filter(|c| c.references(&table, &primary_key)) {
                    if descriptors.iter().any(|d| d.covers(other, &column.name)) {
                        continue;
                    }
                    allow_list.allow_table(other, other_columns.iter().map(|c| c.name.clone()));
                    descriptors.push(RelationshipDescriptor {
                        name: format!("{}.{}", other, column.name),
                        source_table: table.clone(),
                        target_table: other.clone(),
                        foreign_key_fields: vec![column.name.clone()],
                        cascade_on_delete: false,
                        is_collection: true,
                        direction: RelationshipDirection::Reverse,
                    });
                }
            }
        }

        Ok(EntityRelationships {
            entity_type: entity_type.to_string(),
            table,
            primary_key,
            descriptors,
            allow_list,
        })
    }

    async fn resolve_declared(
        &self,
        source: &str,
        primary_key: &str,
        relation: &DeclaredRelation,
        columns: &mut ColumnLookup<'_>,
        allow_list: &mut IdentifierAllowList,
    ) -> Option<RelationshipDescriptor> {
        let target = relation.target_table.as_str();
        let fields = match columns.get(target).await {
            Some(target_columns) => {
                let referencing: Vec<&ColumnInfo> =
                    target_columns.iter().filter(|c| c.references(source, primary_key)).collect();
                let hinted: Vec<String> = referencing
                    .iter()
                    .filter(|c| relation.foreign_key_hint.contains(&c.name))
                    .map(|c| c.name.clone())
                    .collect();

                let fields = if !hinted.is_empty() {
                    hinted
                } else if !referencing.is_empty() {
                    referencing.iter().map(|c| c.name.clone()).collect()
                } else if !relation.foreign_key_hint.is_empty()
                    && relation.foreign_key_hint.iter().all(|hint| {
                        target_columns
                            .iter()
                            .any(|c| &c.name == hint && !c.references_other_than(source, primary_key))
                    })
                {
                    debug!(
                        relation = %relation.name,
                        "No foreign key constraint back to '{}'; using declared columns", source
                    );
                    relation.foreign_key_hint.clone()
                } else {
                    debug!(
                        relation = %relation.name,
                        "'{}' holds no key referencing '{}.{}'; not a dependent relation", target, source, primary_key
                    );
                    return None;
                };

                allow_list.allow_table(target, target_columns.iter().map(|c| c.name.clone()));
                fields
            }
            None => {
                let fields = if relation.foreign_key_hint.is_empty() {
                    vec![format!("{}_id", source.trim_end_matches('s'))]
                } else {
                    relation.foreign_key_hint.clone()
                };
                warn!(
                    relation = %relation.name,
                    fields = ?fields,
                    "Columns of '{}' unavailable; using best-effort foreign key", target
                );
                allow_list.allow_table_unchecked(target);
                fields
            }
        };

        let direction = if target == source {
            RelationshipDirection::SelfReference
        } else {
            RelationshipDirection::Forward
        };

        Some(RelationshipDescriptor {
            name: relation.name.clone(),
            source_table: source.to_string(),
            target_table: target.to_string(),
            foreign_key_fields: fields,
            cascade_on_delete: relation.cascade.includes_delete(),
            is_collection: relation.is_collection,
            direction,
        })
    }
}

/// Per-discovery column cache; `None` marks a table whose columns failed to load
struct ColumnLookup<'a> {
    schema: &'a dyn SchemaSource,
    loaded: HashMap<String, Option<Arc<Vec<ColumnInfo>>>>,
}

impl<'a> ColumnLookup<'a> {
    fn new(schema: &'a dyn SchemaSource) -> Self {
        Self {
            schema,
            loaded: HashMap::new(),
        }
    }

    async fn get(&mut self, table: &str) -> Option<Arc<Vec<ColumnInfo>>> {
        if let Some(entry) = self.loaded.get(table) {
            return entry.clone();
        }

        let entry = match self.schema.list_columns(table).await {
            Ok(columns) => Some(Arc::new(columns)),
            Err(e) => {
                warn!(table, error = %e, "Column listing failed");
                None
            }
        };
        self.loaded.insert(table.to_string(), entry.clone());
        entry
    }
}
