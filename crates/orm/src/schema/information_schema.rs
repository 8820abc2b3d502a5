//! PostgreSQL catalog introspection
//!
//! Tables, primary keys and foreign keys come from `information_schema`.
//! Declared relations cannot be read from the catalog, so the application
//! registers them alongside.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{ColumnInfo, DeclaredRelation, ForeignKeyRef, SchemaSource};
use crate::backends::{DatabasePool, DatabaseRowExt, ParamList};
use crate::error::{ModelError, OrmResult};

pub struct InformationSchemaSource {
    pool: Arc<dyn DatabasePool>,
    schema_name: String,
    relations: HashMap<String, Vec<DeclaredRelation>>,
}

impl InformationSchemaSource {
    pub fn new(pool: Arc<dyn DatabasePool>) -> Self {
        Self {
            pool,
            schema_name: "public".to_string(),
            relations: HashMap::new(),
        }
    }

    pub fn with_schema_name(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = schema_name.into();
        self
    }

    /// Declare a relation for an entity type
    pub fn with_relation(mut self, entity_type: &str, relation: DeclaredRelation) -> Self {
        self.relations
            .entry(entity_type.to_string())
            .or_default()
            .push(relation);
        self
    }
}

#[async_trait]
impl SchemaSource for InformationSchemaSource {
    async fn list_tables(&self) -> OrmResult<Vec<String>> {
        let mut params = ParamList::new(self.pool.dialect());
        let sql = format!(
            "SELECT table_name::text AS table_name FROM information_schema.tables \
             WHERE table_schema = {} AND table_type = 'BASE TABLE' ORDER BY table_name",
            params.push(self.schema_name.as_str())
        );

        let rows = self.pool.fetch_all(&sql, params.values()).await?;
        rows.iter().map(|row| row.get_string("table_name")).collect()
    }

    async fn primary_key(&self, table: &str) -> OrmResult<String> {
        let mut params = ParamList::new(self.pool.dialect());
        let sql = format!(
            "SELECT kcu.column_name::text AS column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = {} AND tc.table_name = {} \
             ORDER BY kcu.ordinal_position LIMIT 1",
            params.push(self.schema_name.as_str()),
            params.push(table)
        );

        match self.pool.fetch_optional(&sql, params.values()).await? {
            Some(row) => row.get_string("column_name"),
            None => Err(ModelError::Schema(format!("Table '{}' has no primary key", table))),
        }
    }

    async fn list_columns(&self, table: &str) -> OrmResult<Vec<ColumnInfo>> {
        let mut params = ParamList::new(self.pool.dialect());
        let fk_schema = params.push(self.schema_name.as_str());
        let column_schema = params.push(self.schema_name.as_str());
        let table_name = params.push(table);
        let sql = format!(
            "SELECT c.column_name::text AS column_name, \
                    fk.foreign_table::text AS foreign_table, \
                    fk.foreign_column::text AS foreign_column \
             FROM information_schema.columns c \
             LEFT JOIN ( \
                SELECT kcu.table_name, kcu.column_name, \
                       ccu.table_name AS foreign_table, ccu.column_name AS foreign_column \
                FROM information_schema.table_constraints tc \
                JOIN information_schema.key_column_usage kcu \
                  ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                JOIN information_schema.constraint_column_usage ccu \
                  ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema \
                WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = {} \
             ) fk ON fk.table_name = c.table_name AND fk.column_name = c.column_name \
             WHERE c.table_schema = {} AND c.table_name = {} \
             ORDER BY c.ordinal_position",
            fk_schema, column_schema, table_name
        );

        let rows = self.pool.fetch_all(&sql, params.values()).await?;
        if rows.is_empty() {
            return Err(ModelError::Schema(format!("Unknown table '{}'", table)));
        }

        rows.iter()
            .map(|row| {
                let foreign_key = match (
                    row.get_optional_string("foreign_table")?,
                    row.get_optional_string("foreign_column")?,
                ) {
                    (Some(table), Some(column)) => Some(ForeignKeyRef { table, column }),
                    _ => None,
                };
                Ok(ColumnInfo {
                    name: row.get_string("column_name")?,
                    foreign_key,
                })
            })
            .collect()
    }

    async fn list_declared_relations(&self, entity_type: &str) -> OrmResult<Vec<DeclaredRelation>> {
        Ok(self.relations.get(entity_type).cloned().unwrap_or_default())
    }
}
