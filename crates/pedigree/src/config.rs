//! Pedigree table layout and tree builder settings

use std::time::Duration;

/// Where the hierarchy lives.
///
/// Defaults match a conventional `animals`/`breeds` layout; every name can be
/// overridden for schemas that deviate.
#[derive(Debug, Clone, PartialEq)]
pub struct PedigreeSchema {
    pub table: String,
    pub id_column: String,
    pub father_column: String,
    pub mother_column: String,
    pub sex_column: String,
    pub breed_column: String,
    pub breed_table: String,
    pub breed_id_column: String,
    pub species_column: String,
    /// Lower-cased values classified as male
    pub male_values: Vec<String>,
    /// Lower-cased values classified as female
    pub female_values: Vec<String>,
    /// Node fields returned when the caller does not ask for specific ones
    pub default_fields: Vec<String>,
}

impl Default for PedigreeSchema {
    fn default() -> Self {
        Self {
            table: "animals".to_string(),
            id_column: "id".to_string(),
            father_column: "father_id".to_string(),
            mother_column: "mother_id".to_string(),
            sex_column: "sex".to_string(),
            breed_column: "breed_id".to_string(),
            breed_table: "breeds".to_string(),
            breed_id_column: "id".to_string(),
            species_column: "species".to_string(),
            male_values: vec!["male".to_string(), "m".to_string()],
            female_values: vec!["female".to_string(), "f".to_string()],
            default_fields: vec!["name".to_string(), "sex".to_string(), "breed_id".to_string()],
        }
    }
}

impl PedigreeSchema {
    pub fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    pub fn with_parent_columns(mut self, father: &str, mother: &str) -> Self {
        self.father_column = father.to_string();
        self.mother_column = mother.to_string();
        self
    }

    pub fn with_sex_column(mut self, column: &str) -> Self {
        self.sex_column = column.to_string();
        self
    }

    pub fn with_breed_lookup(mut self, breed_column: &str, breed_table: &str, species_column: &str) -> Self {
        self.breed_column = breed_column.to_string();
        self.breed_table = breed_table.to_string();
        self.species_column = species_column.to_string();
        self
    }

    pub fn with_default_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Columns every traversal query needs regardless of requested fields
    pub(crate) fn structural_columns(&self) -> [&str; 5] {
        [
            self.id_column.as_str(),
            self.father_column.as_str(),
            self.mother_column.as_str(),
            self.sex_column.as_str(),
            self.breed_column.as_str(),
        ]
    }
}

/// Tree builder settings
#[derive(Debug, Clone)]
pub struct TreeBuilderConfig {
    /// Largest accepted `max_depth`
    pub max_depth: u32,
    /// How long a built tree stays cached
    pub cache_ttl: Duration,
    /// Example edges kept per sex and per species bucket
    pub example_limit: usize,
    /// Most ids bound into one `IN (..)` list; larger frontiers are split
    pub max_in_list: usize,
}

impl Default for TreeBuilderConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            cache_ttl: Duration::from_secs(300),
            example_limit: 5,
            max_in_list: 500,
        }
    }
}

impl TreeBuilderConfig {
    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_example_limit(mut self, limit: usize) -> Self {
        self.example_limit = limit;
        self
    }

    pub fn with_max_in_list(mut self, size: usize) -> Self {
        self.max_in_list = size.max(1);
        self
    }
}
