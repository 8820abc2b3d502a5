//! SQLite Backend Implementation
//!
//! Used for embedded deployments and for the in-memory test fixtures.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Column, Pool, Row, Sqlite, TypeInfo, ValueRef};
use crate::error::{ModelError, OrmResult};
use super::core::*;
use super::DatabasePoolConfig;

/// SQLite connection pool implementation
pub struct SqlitePool {
    pool: Arc<Pool<Sqlite>>,
}

impl SqlitePool {
    pub fn new(pool: Arc<Pool<Sqlite>>) -> Self {
        Self { pool }
    }

    /// Connect a new pool to the given URL with foreign keys enforced
    pub async fn connect(database_url: &str, config: &DatabasePoolConfig) -> OrmResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| ModelError::Connection(format!("Invalid SQLite URL: {}", e)))?
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .idle_timeout(config.idle_timeout_seconds.map(Duration::from_secs))
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| ModelError::Connection(format!("Failed to create SQLite pool: {}", e)))?;

        Ok(Self::new(Arc::new(pool)))
    }

    /// Single-connection in-memory database that lives as long as the pool
    pub async fn in_memory() -> OrmResult<Self> {
        let config = DatabasePoolConfig {
            max_connections: 1,
            min_connections: 1,
            idle_timeout_seconds: None,
            ..Default::default()
        };
        Self::connect("sqlite::memory:", &config).await
    }
}

#[async_trait]
impl DatabasePool for SqlitePool {
    async fn begin_transaction(&self) -> OrmResult<Box<dyn DatabaseTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ModelError::Transaction(format!("Failed to begin transaction: {}", e)))?;

        Ok(Box::new(SqliteTransaction::new(tx)))
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        let result = build_query(sql, params)
            .execute(&*self.pool)
            .await
            .map_err(|e| ModelError::Query(format!("Query execution failed: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        let rows = build_query(sql, params)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| ModelError::Query(format!("Query fetch failed: {}", e)))?;

        rows.iter().map(convert_row).collect()
    }

    async fn fetch_optional(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Option<Box<dyn DatabaseRow>>> {
        let row = build_query(sql, params)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| ModelError::Query(format!("Query fetch failed: {}", e)))?;

        row.as_ref().map(convert_row).transpose()
    }

    async fn close(&self) -> OrmResult<()> {
        self.pool.close().await;
        Ok(())
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }
}

/// SQLite transaction implementation
pub struct SqliteTransaction {
    tx: Option<sqlx::Transaction<'static, Sqlite>>,
}

impl SqliteTransaction {
    pub fn new(tx: sqlx::Transaction<'static, Sqlite>) -> Self {
        Self { tx: Some(tx) }
    }

    fn inner(&mut self) -> OrmResult<&mut sqlx::Transaction<'static, Sqlite>> {
        self.tx
            .as_mut()
            .ok_or_else(|| ModelError::Transaction("Transaction already completed".to_string()))
    }
}

#[async_trait]
impl DatabaseTransaction for SqliteTransaction {
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        let tx = self.inner()?;
        let result = build_query(sql, params)
            .execute(&mut **tx)
            .await
            .map_err(|e| ModelError::Query(format!("Query execution failed: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        let tx = self.inner()?;
        let rows = build_query(sql, params)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| ModelError::Query(format!("Query fetch failed: {}", e)))?;

        rows.iter().map(convert_row).collect()
    }

    async fn fetch_optional(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Option<Box<dyn DatabaseRow>>> {
        let tx = self.inner()?;
        let row = build_query(sql, params)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| ModelError::Query(format!("Query fetch failed: {}", e)))?;

        row.as_ref().map(convert_row).transpose()
    }

    async fn commit(mut self: Box<Self>) -> OrmResult<()> {
        let tx = self.tx.take().ok_or_else(|| ModelError::Transaction("Transaction already completed".to_string()))?;

        tx.commit()
            .await
            .map_err(|e| ModelError::Transaction(format!("Transaction commit failed: {}", e)))
    }

    async fn rollback(mut self: Box<Self>) -> OrmResult<()> {
        let tx = self.tx.take().ok_or_else(|| ModelError::Transaction("Transaction already completed".to_string()))?;

        tx.rollback()
            .await
            .map_err(|e| ModelError::Transaction(format!("Transaction rollback failed: {}", e)))
    }
}

fn build_query<'q>(
    sql: &'q str,
    params: &[DatabaseValue],
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    params.iter().fold(sqlx::query(sql), bind_database_value)
}

/// Bind a DatabaseValue to a sqlx query; SQLite stores rich types as text
fn bind_database_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &DatabaseValue,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float32(f) => query.bind(*f),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::Uuid(u) => query.bind(u.to_string()),
        DatabaseValue::DateTime(dt) => query.bind(dt.to_rfc3339()),
        DatabaseValue::Date(d) => query.bind(d.to_string()),
        DatabaseValue::Time(t) => query.bind(t.to_string()),
        DatabaseValue::Json(j) => query.bind(j.to_string()),
    }
}

fn convert_row(row: &sqlx::sqlite::SqliteRow) -> OrmResult<Box<dyn DatabaseRow>> {
    let columns = row.columns().iter().map(|col| col.name().to_string()).collect();
    let values = (0..row.len())
        .map(|index| sqlite_value_to_database_value(row, index))
        .collect::<OrmResult<Vec<_>>>()?;

    Ok(Box::new(ValueRow::new(columns, values)))
}

/// Convert a SQLite value using its runtime storage class
fn sqlite_value_to_database_value(row: &sqlx::sqlite::SqliteRow, index: usize) -> OrmResult<DatabaseValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let storage_class = raw.type_info().name().to_string();
    let value = match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" | "INT8" => DatabaseValue::Int64(row.try_get_unchecked(index)?),
        "REAL" => DatabaseValue::Float64(row.try_get_unchecked(index)?),
        "BLOB" => DatabaseValue::Bytes(row.try_get_unchecked(index)?),
        _ => DatabaseValue::String(row.try_get_unchecked(index)?),
    };

    Ok(value)
}
