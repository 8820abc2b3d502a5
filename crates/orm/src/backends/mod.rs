//! Database Backend Abstractions
//!
//! Backend traits plus the PostgreSQL and SQLite implementations built on sqlx.

pub mod core;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

// Re-export core traits and types
pub use self::core::*;
pub use postgres::PostgresPool;
pub use sqlite::SqlitePool;

use crate::error::{ModelError, OrmResult};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    PostgreSQL,
    SQLite,
}

impl DatabaseBackendType {
    /// Detect database backend type from URL
    pub fn from_url(url: &str) -> OrmResult<Self> {
        if url.starts_with("postgresql://") || url.starts_with("postgres://") {
            Ok(DatabaseBackendType::PostgreSQL)
        } else if url.starts_with("sqlite:") || url.starts_with("file:") {
            Ok(DatabaseBackendType::SQLite)
        } else {
            Err(ModelError::Connection(format!(
                "Unable to detect database backend from URL: {}",
                url
            )))
        }
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
            DatabaseBackendType::SQLite => write!(f, "sqlite"),
        }
    }
}

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: Option<u64>,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(600), // 10 minutes
        }
    }
}

/// Create a pool for the backend named by the URL scheme
pub async fn connect_pool(database_url: &str, config: &DatabasePoolConfig) -> OrmResult<Arc<dyn DatabasePool>> {
    let pool: Arc<dyn DatabasePool> = match DatabaseBackendType::from_url(database_url)? {
        DatabaseBackendType::PostgreSQL => Arc::new(PostgresPool::connect(database_url, config).await?),
        DatabaseBackendType::SQLite => Arc::new(SqlitePool::connect(database_url, config).await?),
    };
    Ok(pool)
}
