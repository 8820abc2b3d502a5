//! In-process schema description
//!
//! Used when the application already knows its tables (SQLite deployments,
//! tests) or when catalog introspection is not available.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use super::{ColumnInfo, DeclaredRelation, SchemaSource};
use crate::error::{ModelError, OrmResult};

#[derive(Debug, Clone)]
struct TableDef {
    name: String,
    primary_key: String,
    columns: Vec<ColumnInfo>,
    relations: Vec<DeclaredRelation>,
}

/// Schema held in memory, enumerated in the order tables were added
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    tables: Vec<TableDef>,
    index: HashMap<String, usize>,
    unlisted_columns: HashSet<String>,
}

impl StaticSchema {
    pub fn builder() -> StaticSchemaBuilder {
        StaticSchemaBuilder::default()
    }

    fn find(&self, table: &str) -> OrmResult<&TableDef> {
        self.index
            .get(table)
            .map(|&i| &self.tables[i])
            .ok_or_else(|| ModelError::Schema(format!("Unknown table '{}'", table)))
    }
}

#[derive(Debug, Default)]
pub struct StaticSchemaBuilder {
    schema: StaticSchema,
}

impl StaticSchemaBuilder {
    /// Add a table; re-adding a name replaces the earlier definition in place
    pub fn table<F>(mut self, name: &str, configure: F) -> Self
    where
        F: FnOnce(TableBuilder) -> TableBuilder,
    {
        let def = configure(TableBuilder::new(name)).def;
        match self.schema.index.get(name) {
            Some(&i) => self.schema.tables[i] = def,
            None => {
                self.schema.index.insert(name.to_string(), self.schema.tables.len());
                self.schema.tables.push(def);
            }
        }
        self
    }

    /// Make column listing fail for a table, as an unreachable catalog would
    pub fn hide_columns(mut self, table: &str) -> Self {
        self.schema.unlisted_columns.insert(table.to_string());
        self
    }

    pub fn build(self) -> StaticSchema {
        self.schema
    }
}

#[derive(Debug)]
pub struct TableBuilder {
    def: TableDef,
}

impl TableBuilder {
    fn new(name: &str) -> Self {
        Self {
            def: TableDef {
                name: name.to_string(),
                primary_key: "id".to_string(),
                columns: vec![ColumnInfo::plain("id")],
                relations: Vec::new(),
            },
        }
    }

    /// Rename the primary key column (defaults to `id`)
    pub fn primary_key(mut self, column: &str) -> Self {
        let previous = std::mem::replace(&mut self.def.primary_key, column.to_string());
        self.def.columns.retain(|c| c.name != previous);
        self.def.columns.insert(0, ColumnInfo::plain(column));
        self
    }

    pub fn column(mut self, name: &str) -> Self {
        self.def.columns.push(ColumnInfo::plain(name));
        self
    }

    pub fn foreign_key(mut self, name: &str, table: &str, column: &str) -> Self {
        self.def.columns.push(ColumnInfo::foreign(name, table, column));
        self
    }

    pub fn relation(mut self, relation: DeclaredRelation) -> Self {
        self.def.relations.push(relation);
        self
    }
}

#[async_trait]
impl SchemaSource for StaticSchema {
    async fn list_tables(&self) -> OrmResult<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn primary_key(&self, table: &str) -> OrmResult<String> {
        Ok(self.find(table)?.primary_key.clone())
    }

    async fn list_columns(&self, table: &str) -> OrmResult<Vec<ColumnInfo>> {
        if self.unlisted_columns.contains(table) {
            return Err(ModelError::Schema(format!(
                "Columns of '{}' are not available",
                table
            )));
        }
        Ok(self.find(table)?.columns.clone())
    }

    async fn list_declared_relations(&self, entity_type: &str) -> OrmResult<Vec<DeclaredRelation>> {
        Ok(self.find(entity_type)?.relations.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> StaticSchema {
        StaticSchema::builder()
            .table("breeds", |t| t.column("name"))
            .table("animals", |t| {
                t.column("name")
                    .foreign_key("breed_id", "breeds", "id")
                    .relation(DeclaredRelation::has_many("photos", "photos"))
            })
            .table("photos", |t| t.foreign_key("animal_id", "animals", "id"))
            .hide_columns("photos")
            .build()
    }

    #[tokio::test]
    async fn test_tables_keep_insertion_order() {
        let tables = schema().list_tables().await.unwrap();
        assert_eq!(tables, vec!["breeds", "animals", "photos"]);
    }

    #[tokio::test]
    async fn test_columns_and_relations() {
        let schema = schema();
        let columns = schema.list_columns("animals").await.unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "breed_id"]);
        assert!(columns[2].references("breeds", "id"));

        let relations = schema.list_declared_relations("animals").await.unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(schema.primary_key("animals").await.unwrap(), "id");
    }

    #[tokio::test]
    async fn test_hidden_and_unknown_tables_fail() {
        let schema = schema();
        assert!(schema.list_columns("photos").await.is_err());
        assert!(schema.list_columns("owners").await.is_err());
        assert!(schema.primary_key("owners").await.is_err());
    }

    #[tokio::test]
    async fn test_custom_primary_key() {
        let schema = StaticSchema::builder()
            .table("legacy", |t| t.primary_key("legacy_key").column("label"))
            .build();
        let names: Vec<_> = schema
            .list_columns("legacy")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["legacy_key", "label"]);
    }
}
