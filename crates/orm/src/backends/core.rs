//! Core Database Backend Traits
//!
//! This module defines the traits and types the rest of the crate uses to talk
//! to a relational store. Backends implement them on top of sqlx; tests can
//! wrap them to observe query traffic.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use crate::error::{ModelError, OrmResult};

/// Abstract database transaction trait
#[async_trait]
pub trait DatabaseTransaction: Send {
    /// Execute a statement within the transaction and return affected rows
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64>;

    /// Execute a query and return result rows within the transaction
    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>>;

    /// Execute a query and return the first result row within the transaction
    async fn fetch_optional(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Option<Box<dyn DatabaseRow>>>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> OrmResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> OrmResult<()>;
}

/// Abstract database connection pool trait
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Begin a transaction from the pool
    async fn begin_transaction(&self) -> OrmResult<Box<dyn DatabaseTransaction>>;

    /// Execute a statement directly on the pool
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64>;

    /// Execute a query and return result rows directly on the pool
    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>>;

    /// Execute a query and return the first result row directly on the pool
    async fn fetch_optional(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Option<Box<dyn DatabaseRow>>>;

    /// Close the pool
    async fn close(&self) -> OrmResult<()>;

    /// SQL dialect spoken by this pool
    fn dialect(&self) -> SqlDialect;
}

/// Abstract database row trait
pub trait DatabaseRow: Send + Sync {
    /// Get a column value by index
    fn get_by_index(&self, index: usize) -> OrmResult<DatabaseValue>;

    /// Get a column value by name
    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue>;

    /// Get column names
    fn column_names(&self) -> Vec<String>;

    /// Convert row to JSON value
    fn to_json(&self) -> OrmResult<JsonValue> {
        let mut map = serde_json::Map::new();
        for (i, name) in self.column_names().into_iter().enumerate() {
            map.insert(name, self.get_by_index(i)?.to_json());
        }
        Ok(JsonValue::Object(map))
    }
}

/// Typed accessors shared by every row implementation
pub trait DatabaseRowExt {
    /// Integer column; booleans read as 0/1
    fn get_i64(&self, column: &str) -> OrmResult<i64>;

    /// Nullable integer column
    fn get_optional_i64(&self, column: &str) -> OrmResult<Option<i64>>;

    /// Text column
    fn get_string(&self, column: &str) -> OrmResult<String>;

    /// Nullable text column
    fn get_optional_string(&self, column: &str) -> OrmResult<Option<String>>;

    /// Boolean column; integers read as `!= 0`
    fn get_bool(&self, column: &str) -> OrmResult<bool>;
}

impl<R: DatabaseRow + ?Sized> DatabaseRowExt for R {
    fn get_i64(&self, column: &str) -> OrmResult<i64> {
        self.get_optional_i64(column)?
            .ok_or_else(|| ModelError::Serialization(format!("Column '{}' is NULL", column)))
    }

    fn get_optional_i64(&self, column: &str) -> OrmResult<Option<i64>> {
        let value = self.get_by_name(column)?;
        if value.is_null() {
            return Ok(None);
        }
        value.as_i64().map(Some).ok_or_else(|| {
            ModelError::Serialization(format!("Column '{}' is not an integer: {:?}", column, value))
        })
    }

    fn get_string(&self, column: &str) -> OrmResult<String> {
        self.get_optional_string(column)?
            .ok_or_else(|| ModelError::Serialization(format!("Column '{}' is NULL", column)))
    }

    fn get_optional_string(&self, column: &str) -> OrmResult<Option<String>> {
        match self.get_by_name(column)? {
            DatabaseValue::Null => Ok(None),
            DatabaseValue::String(s) => Ok(Some(s)),
            other => Ok(Some(match other.to_json() {
                JsonValue::String(s) => s,
                json => json.to_string(),
            })),
        }
    }

    fn get_bool(&self, column: &str) -> OrmResult<bool> {
        let value = self.get_by_name(column)?;
        value.as_bool().ok_or_else(|| {
            ModelError::Serialization(format!("Column '{}' is not a boolean: {:?}", column, value))
        })
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Integer view of the value, if it has one
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int32(i) => Some(i64::from(*i)),
            DatabaseValue::Int64(i) => Some(*i),
            DatabaseValue::Bool(b) => Some(i64::from(*b)),
            DatabaseValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Boolean view of the value; SQLite reports EXISTS as 0/1
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DatabaseValue::Bool(b) => Some(*b),
            DatabaseValue::Int32(i) => Some(*i != 0),
            DatabaseValue::Int64(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::from(*i),
            DatabaseValue::Int64(i) => JsonValue::from(*i),
            DatabaseValue::Float32(f) => serde_json::Number::from_f64(f64::from(*f))
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::Array(b.iter().map(|&x| JsonValue::from(x)).collect()),
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Date(d) => JsonValue::String(d.to_string()),
            DatabaseValue::Time(t) => JsonValue::String(t.to_string()),
            DatabaseValue::Json(j) => j.clone(),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<uuid::Uuid> for DatabaseValue {
    fn from(value: uuid::Uuid) -> Self {
        DatabaseValue::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DatabaseValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::Json(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// Fully materialized result row shared by the sqlx backends
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRow {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl ValueRow {
    pub fn new(columns: Vec<String>, values: Vec<DatabaseValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<DatabaseValue>,
    {
        let (columns, values) = pairs.into_iter().map(|(k, v)| (k.into(), v.into())).unzip();
        Self { columns, values }
    }
}

impl DatabaseRow for ValueRow {
    fn get_by_index(&self, index: usize) -> OrmResult<DatabaseValue> {
        self.values
            .get(index)
            .cloned()
            .ok_or_else(|| ModelError::ColumnNotFound(format!("index {}", index)))
    }

    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue> {
        let index = self
            .columns
            .iter()
            .position(|col| col == name)
            .ok_or_else(|| ModelError::ColumnNotFound(name.to_string()))?;
        self.get_by_index(index)
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder for the zero-based binding index
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::SQLite => "?".to_string(),
        }
    }
}

/// Ordered parameter list that hands out placeholders as values are pushed.
///
/// Every placeholder is used exactly once and in binding order, which keeps
/// positional (`?`) and numbered (`$n`) dialects interchangeable.
#[derive(Debug, Clone)]
pub struct ParamList {
    dialect: SqlDialect,
    values: Vec<DatabaseValue>,
}

impl ParamList {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    /// Bind a value and return its placeholder
    pub fn push(&mut self, value: impl Into<DatabaseValue>) -> String {
        let placeholder = self.dialect.parameter_placeholder(self.values.len());
        self.values.push(value.into());
        placeholder
    }

    /// Bind every value and return the comma-separated placeholders
    pub fn push_list<V, I>(&mut self, values: I) -> String
    where
        V: Into<DatabaseValue>,
        I: IntoIterator<Item = V>,
    {
        values
            .into_iter()
            .map(|v| self.push(v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn values(&self) -> &[DatabaseValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<DatabaseValue> {
        self.values
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }
}

/// Where a query runs: directly on the pool or inside an open transaction
pub enum Executor<'a> {
    Pool(&'a dyn DatabasePool),
    Transaction(&'a mut dyn DatabaseTransaction),
}

impl Executor<'_> {
    pub async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        match self {
            Executor::Pool(pool) => pool.fetch_all(sql, params).await,
            Executor::Transaction(tx) => tx.fetch_all(sql, params).await,
        }
    }

    pub async fn fetch_optional(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Option<Box<dyn DatabaseRow>>> {
        match self {
            Executor::Pool(pool) => pool.fetch_optional(sql, params).await,
            Executor::Transaction(tx) => tx.fetch_optional(sql, params).await,
        }
    }

    pub async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        match self {
            Executor::Pool(pool) => pool.execute(sql, params).await,
            Executor::Transaction(tx) => tx.execute(sql, params).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_per_dialect() {
        let mut pg = ParamList::new(SqlDialect::PostgreSQL);
        assert_eq!(pg.push(1i64), "$1");
        assert_eq!(pg.push_list([2i64, 3i64]), "$2, $3");
        assert_eq!(pg.values().len(), 3);

        let mut lite = ParamList::new(SqlDialect::SQLite);
        assert_eq!(lite.push_list([1i64, 2i64]), "?, ?");
        assert_eq!(lite.into_values(), vec![DatabaseValue::Int64(1), DatabaseValue::Int64(2)]);
    }

    #[test]
    fn test_value_views() {
        assert_eq!(DatabaseValue::Int32(7).as_i64(), Some(7));
        assert_eq!(DatabaseValue::Int64(0).as_bool(), Some(false));
        assert_eq!(DatabaseValue::Bool(true).as_bool(), Some(true));
        assert_eq!(DatabaseValue::String("x".into()).as_bool(), None);
        assert!(DatabaseValue::from(None::<i64>).is_null());
    }

    #[test]
    fn test_value_row_accessors() {
        let row = ValueRow::from_pairs([
            ("id", DatabaseValue::Int64(3)),
            ("name", DatabaseValue::String("Rex".into())),
            ("father_id", DatabaseValue::Null),
            ("present", DatabaseValue::Int64(1)),
        ]);

        assert_eq!(row.get_i64("id").unwrap(), 3);
        assert_eq!(row.get_string("name").unwrap(), "Rex");
        assert_eq!(row.get_optional_i64("father_id").unwrap(), None);
        assert!(row.get_bool("present").unwrap());
        assert!(matches!(row.get_by_name("missing"), Err(ModelError::ColumnNotFound(_))));
        assert_eq!(row.to_json().unwrap()["name"], "Rex");
    }
}
