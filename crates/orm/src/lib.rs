//! # studbook-orm: integrity layer for studbook
//!
//! Discovers which tables depend on an entity type, checks whether a given
//! record is still referenced, and deletes records transactionally once the
//! check passes.
//!
//! - [`backends`]: database abstraction over sqlx (PostgreSQL and SQLite)
//! - [`schema`]: schema and declared-relation sources
//! - [`relationships`]: memoized relationship discovery
//! - [`integrity`]: dependency checks, deletion summaries and safe deletes
//! - [`security`]: identifier validation for composed SQL

pub mod backends;
pub mod error;
pub mod integrity;
pub mod relationships;
pub mod schema;
pub mod security;

// Re-export core traits and types
pub use backends::{
    connect_pool, DatabaseBackendType, DatabasePool, DatabasePoolConfig, DatabaseRow, DatabaseRowExt,
    DatabaseTransaction, DatabaseValue, Executor, ParamList, SqlDialect, ValueRow,
};
pub use error::*;
pub use integrity::*;
pub use relationships::*;
pub use schema::*;
pub use security::IdentifierAllowList;
