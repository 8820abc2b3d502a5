//! Security utilities for SQL composition
//!
//! Table and column names discovered from the schema are the only things ever
//! interpolated into SQL text. Before interpolation every identifier is:
//! - checked for a safe shape (charset, length, no leading digit)
//! - checked against the schema-derived allow-list
//! - quoted
//!
//! Reserved words such as `order` are legal table names once quoted, so they
//! are not rejected. Values are never interpolated; they are always bound as
//! parameters.

use std::collections::{HashMap, HashSet};
use crate::error::ModelError;

/// Characters allowed in SQL identifiers (alphanumeric, underscore, dollar)
const ALLOWED_IDENTIFIER_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_$";

/// Escape a SQL identifier (table name, column name, etc.)
///
/// # Examples
/// ```
/// use studbook_orm::security::escape_identifier;
///
/// assert_eq!(escape_identifier("animals"), "\"animals\"");
/// assert_eq!(escape_identifier("odd\"name"), "\"odd\"\"name\"");
/// ```
pub fn escape_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Validate that an identifier is safe to quote into SQL
pub fn validate_identifier(identifier: &str) -> Result<(), ModelError> {
    let first = identifier
        .chars()
        .next()
        .ok_or_else(|| ModelError::Validation("Identifier cannot be empty".to_string()))?;

    // PostgreSQL limit is 63 characters
    if identifier.len() > 63 {
        return Err(ModelError::Validation(format!(
            "Identifier '{}' is too long (max 63 characters)",
            identifier
        )));
    }

    if let Some(c) = identifier.chars().find(|c| !ALLOWED_IDENTIFIER_CHARS.contains(*c)) {
        return Err(ModelError::Validation(format!(
            "Identifier '{}' contains invalid character '{}'",
            identifier, c
        )));
    }

    if first.is_ascii_digit() {
        return Err(ModelError::Validation(format!(
            "Identifier '{}' cannot start with a number",
            identifier
        )));
    }

    Ok(())
}

/// Tables and columns known from schema introspection.
///
/// A table registered without columns (its columns could not be listed)
/// accepts any syntactically valid column name.
#[derive(Debug, Clone, Default)]
pub struct IdentifierAllowList {
    tables: HashMap<String, Option<HashSet<String>>>,
}

impl IdentifierAllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table and its known columns
    pub fn allow_table<I, S>(&mut self, table: &str, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self
            .tables
            .entry(table.to_string())
            .or_insert_with(|| Some(HashSet::new()));
        if let Some(known) = entry {
            known.extend(columns.into_iter().map(Into::into));
        }
    }

    /// Register a table whose columns are unknown
    pub fn allow_table_unchecked(&mut self, table: &str) {
        self.tables.insert(table.to_string(), None);
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Validate and quote a table name
    pub fn table(&self, table: &str) -> Result<String, ModelError> {
        validate_identifier(table)?;
        if !self.contains_table(table) {
            return Err(ModelError::Validation(format!(
                "Table '{}' is not part of the known schema",
                table
            )));
        }
        Ok(escape_identifier(table))
    }

    /// Validate and quote a column of a known table
    pub fn column(&self, table: &str, column: &str) -> Result<String, ModelError> {
        validate_identifier(column)?;
        match self.tables.get(table) {
            None => Err(ModelError::Validation(format!(
                "Table '{}' is not part of the known schema",
                table
            ))),
            Some(Some(known)) if !known.contains(column) => Err(ModelError::Validation(format!(
                "Column '{}.{}' is not part of the known schema",
                table, column
            ))),
            Some(_) => Ok(escape_identifier(column)),
        }
    }
}
