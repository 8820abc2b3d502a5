//! Error types for the ORM layer
//!
//! Provides error handling for database access, schema introspection,
//! identifier validation and integrity checks.

use thiserror::Error;

/// Result type alias for ORM operations
pub type OrmResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// Error types for ORM operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Database connection or query error
    #[error("Database error: {0}")]
    Database(String),

    /// Row not found in database
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid caller input, rejected before any query is issued
    #[error("Validation error: {0}")]
    Validation(String),

    /// Column missing from a result row
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Connection pool error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Schema error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Query building or execution error
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ModelError {
    /// True for errors caused by caller input rather than the database
    pub fn is_validation(&self) -> bool {
        matches!(self, ModelError::Validation(_))
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ModelError::NotFound(err.to_string()),
            sqlx::Error::ColumnNotFound(column) => ModelError::ColumnNotFound(column),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                ModelError::Connection(err.to_string())
            }
            other => ModelError::Database(other.to_string()),
        }
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
