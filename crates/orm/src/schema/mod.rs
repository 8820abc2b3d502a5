//! Schema and relationship descriptor sources
//!
//! A [`SchemaSource`] answers the questions relationship discovery needs:
//! which tables exist, what their columns are, which columns hold foreign
//! keys and where they point, and which relations the application declares
//! for an entity type.

pub mod information_schema;
pub mod static_schema;

use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, OrmResult};

pub use information_schema::InformationSchemaSource;
pub use static_schema::{StaticSchema, StaticSchemaBuilder, TableBuilder};

/// Target of a foreign key column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

/// A column and, if it has one, the foreign key it carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub foreign_key: Option<ForeignKeyRef>,
}

impl ColumnInfo {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            foreign_key: None,
        }
    }

    pub fn foreign(name: impl Into<String>, table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            foreign_key: Some(ForeignKeyRef {
                table: table.into(),
                column: column.into(),
            }),
        }
    }

    /// True if this column holds a foreign key into `table.key`
    pub fn references(&self, table: &str, key: &str) -> bool {
        self.foreign_key
            .as_ref()
            .is_some_and(|fk| fk.table == table && fk.column == key)
    }

    /// True if this column points into `table` through a column other than `key`
    pub fn references_other_than(&self, table: &str, key: &str) -> bool {
        self.foreign_key
            .as_ref()
            .is_some_and(|fk| fk.table == table && fk.column != key)
    }
}

/// Individual cascade options of a declared relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CascadeOption {
    All,
    SaveUpdate,
    Merge,
    Expunge,
    Delete,
    DeleteOrphan,
    RefreshExpire,
}

impl FromStr for CascadeOption {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "all" => Ok(CascadeOption::All),
            "save-update" => Ok(CascadeOption::SaveUpdate),
            "merge" => Ok(CascadeOption::Merge),
            "expunge" => Ok(CascadeOption::Expunge),
            "delete" => Ok(CascadeOption::Delete),
            "delete-orphan" => Ok(CascadeOption::DeleteOrphan),
            "refresh-expire" => Ok(CascadeOption::RefreshExpire),
            other => Err(ModelError::Schema(format!("Unknown cascade option '{}'", other))),
        }
    }
}

/// Set of cascade options, parsed from lists such as `"all, delete-orphan"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadePolicy {
    options: BTreeSet<CascadeOption>,
}

impl CascadePolicy {
    /// No cascading at all
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, option: CascadeOption) -> Self {
        self.options.insert(option);
        self
    }

    pub fn contains(&self, option: CascadeOption) -> bool {
        self.options.contains(&option)
    }

    /// True when deleting the parent also deletes the dependents
    pub fn includes_delete(&self) -> bool {
        self.options.iter().any(|option| {
            matches!(
                option,
                CascadeOption::All | CascadeOption::Delete | CascadeOption::DeleteOrphan
            )
        })
    }
}

impl FromStr for CascadePolicy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let options = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(CascadeOption::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { options })
    }
}

/// A relation the application declares on an entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredRelation {
    /// Relation name on the owning entity
    pub name: String,
    /// Table on the other side of the relation
    pub target_table: String,
    /// Columns the declaration itself names, used when introspection cannot
    /// resolve the real foreign key
    pub foreign_key_hint: Vec<String>,
    pub cascade: CascadePolicy,
    pub is_collection: bool,
}

impl DeclaredRelation {
    /// One-to-many relation to a table of dependents
    pub fn has_many(name: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_table: target_table.into(),
            foreign_key_hint: Vec::new(),
            cascade: CascadePolicy::none(),
            is_collection: true,
        }
    }

    /// Single-valued relation, e.g. a parent link within the same table
    pub fn has_one(name: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            is_collection: false,
            ..Self::has_many(name, target_table)
        }
    }

    pub fn with_foreign_key_hint<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.foreign_key_hint = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cascade(mut self, cascade: CascadePolicy) -> Self {
        self.cascade = cascade;
        self
    }
}

/// Source of schema and relationship metadata
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// All tables, in a stable enumeration order
    async fn list_tables(&self) -> OrmResult<Vec<String>>;

    /// Primary key column of a table
    async fn primary_key(&self, table: &str) -> OrmResult<String>;

    /// Columns of a table in declaration order
    async fn list_columns(&self, table: &str) -> OrmResult<Vec<ColumnInfo>>;

    /// Relations declared for an entity type, in declaration order
    async fn list_declared_relations(&self, entity_type: &str) -> OrmResult<Vec<DeclaredRelation>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_policy_parsing() {
        let policy: CascadePolicy = "all, delete-orphan".parse().unwrap();
        assert!(policy.includes_delete());
        assert!(policy.contains(CascadeOption::DeleteOrphan));

        let policy: CascadePolicy = "save-update, merge".parse().unwrap();
        assert!(!policy.includes_delete());

        let policy: CascadePolicy = "".parse().unwrap();
        assert_eq!(policy, CascadePolicy::none());

        assert!("save-update, explode".parse::<CascadePolicy>().is_err());
    }

    #[test]
    fn test_column_references() {
        let column = ColumnInfo::foreign("animal_id", "animals", "id");
        assert!(column.references("animals", "id"));
        assert!(!column.references("breeds", "id"));
        assert!(!column.references_other_than("animals", "id"));
        assert!(!ColumnInfo::plain("name").references("animals", "id"));

        let by_chip = ColumnInfo::foreign("animal_chip", "animals", "chip");
        assert!(!by_chip.references("animals", "id"));
        assert!(by_chip.references_other_than("animals", "id"));
    }

    #[test]
    fn test_declared_relation_builders() {
        let relation = DeclaredRelation::has_one("father", "animals")
            .with_foreign_key_hint(["father_id"])
            .with_cascade(CascadePolicy::none().with(CascadeOption::Merge));

        assert!(!relation.is_collection);
        assert_eq!(relation.foreign_key_hint, vec!["father_id".to_string()]);
        assert!(!relation.cascade.includes_delete());
    }
}
