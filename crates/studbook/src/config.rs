use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use studbook_orm::IntegrityConfig;
use studbook_pedigree::TreeBuilderConfig;
use thiserror::Error;

/// Configuration loaded from environment variables
pub trait EnvConfig: Sized {
    /// Load configuration from the process environment
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Where each field came from, for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    EnvVar(String),
    Default(String),
    Nested,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue { field: String, value: String, expected: String },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

/// Upper bound for `max_batch_size`; deployments may only lower it
pub const BATCH_SIZE_CAP: usize = 100;

/// Upper bound for `max_tree_depth`
pub const TREE_DEPTH_CAP: u32 = 25;

#[derive(Debug, Clone, PartialEq)]
pub struct StudbookConfig {
    /// Only needed by [`crate::Studbook::connect`]
    pub database_url: Option<String>,
    pub integrity_cache_ttl: Duration,
    pub tree_cache_ttl: Duration,
    pub max_batch_size: usize,
    pub max_tree_depth: u32,
    pub logging: LoggingConfig,
    pub warmup: WarmupConfig,
    sources: HashMap<String, ConfigSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level or full `EnvFilter` directive, overridden by `RUST_LOG`
    pub level: String,
    pub json: bool,
}

/// Startup warm-up settings
#[derive(Debug, Clone, PartialEq)]
pub struct WarmupConfig {
    pub enabled: bool,
    /// Entity types whose relationships are discovered up front
    pub entities: Vec<String>,
    /// Ids whose integrity results and trees are precomputed
    pub roots: Vec<i64>,
    pub tree_depth: u32,
}

impl Default for StudbookConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            integrity_cache_ttl: Duration::from_secs(30),
            tree_cache_ttl: Duration::from_secs(300),
            max_batch_size: BATCH_SIZE_CAP,
            max_tree_depth: 10,
            logging: LoggingConfig::default(),
            warmup: WarmupConfig::default(),
            sources: HashMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            entities: Vec::new(),
            roots: Vec::new(),
            tree_depth: 3,
        }
    }
}

impl StudbookConfig {
    pub fn with_database_url(mut self, url: &str) -> Self {
        self.database_url = Some(url.to_string());
        self
    }

    pub fn integrity_config(&self) -> IntegrityConfig {
        IntegrityConfig::default()
            .with_cache_ttl(self.integrity_cache_ttl)
            .with_max_batch_size(self.max_batch_size)
    }

    pub fn tree_builder_config(&self) -> TreeBuilderConfig {
        TreeBuilderConfig::default()
            .with_cache_ttl(self.tree_cache_ttl)
            .with_max_depth(self.max_tree_depth)
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar {
                var: "STUDBOOK_DATABASE_URL".to_string(),
            })
    }
}

impl EnvConfig for StudbookConfig {
    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut reader = EnvReader::new(lookup);

        let database_url = reader.optional("STUDBOOK_DATABASE_URL", "database_url");
        let integrity_cache_ttl = Duration::from_secs(reader.parsed(
            "STUDBOOK_INTEGRITY_CACHE_TTL_SECS",
            "integrity_cache_ttl",
            30,
            "a number of seconds",
        )?);
        let tree_cache_ttl = Duration::from_secs(reader.parsed(
            "STUDBOOK_TREE_CACHE_TTL_SECS",
            "tree_cache_ttl",
            300,
            "a number of seconds",
        )?);
        let max_batch_size = reader.parsed(
            "STUDBOOK_MAX_BATCH_SIZE",
            "max_batch_size",
            BATCH_SIZE_CAP,
            "a positive number",
        )?;
        let max_tree_depth = reader.parsed("STUDBOOK_MAX_TREE_DEPTH", "max_tree_depth", 10, "a positive number")?;

        let logging = LoggingConfig {
            level: reader.string("STUDBOOK_LOG_LEVEL", "logging.level", "info"),
            json: reader.flag("STUDBOOK_LOG_JSON", "logging.json", false)?,
        };

        let warmup = WarmupConfig {
            enabled: reader.flag("STUDBOOK_WARMUP_ENABLED", "warmup.enabled", false)?,
            entities: reader
                .optional("STUDBOOK_WARMUP_ENTITIES", "warmup.entities")
                .map(|raw| split_list(&raw).map(str::to_string).collect())
                .unwrap_or_default(),
            roots: match reader.optional("STUDBOOK_WARMUP_ROOTS", "warmup.roots") {
                Some(raw) => split_list(&raw)
                    .map(|id| {
                        id.parse::<i64>().map_err(|_| ConfigError::InvalidValue {
                            field: "warmup.roots".to_string(),
                            value: id.to_string(),
                            expected: "comma-separated ids".to_string(),
                        })
                    })
                    .collect::<Result<_, _>>()?,
                None => Vec::new(),
            },
            tree_depth: reader.parsed("STUDBOOK_WARMUP_TREE_DEPTH", "warmup.tree_depth", 3, "a number")?,
        };

        Ok(StudbookConfig {
            database_url,
            integrity_cache_ttl,
            tree_cache_ttl,
            max_batch_size,
            max_tree_depth,
            logging,
            warmup,
            sources: reader.sources,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.database_url {
            if url.trim().is_empty() {
                return Err(ConfigError::ValidationFailed {
                    field: "database_url".to_string(),
                    reason: "Database URL cannot be empty".to_string(),
                });
            }
        }

        for (field, ttl) in [
            ("integrity_cache_ttl", self.integrity_cache_ttl),
            ("tree_cache_ttl", self.tree_cache_ttl),
        ] {
            if ttl.is_zero() {
                return Err(ConfigError::ValidationFailed {
                    field: field.to_string(),
                    reason: "TTL must be at least one second".to_string(),
                });
            }
        }

        if self.max_batch_size == 0 || self.max_batch_size > BATCH_SIZE_CAP {
            return Err(ConfigError::ValidationFailed {
                field: "max_batch_size".to_string(),
                reason: format!("must be between 1 and {}", BATCH_SIZE_CAP),
            });
        }

        if self.max_tree_depth == 0 || self.max_tree_depth > TREE_DEPTH_CAP {
            return Err(ConfigError::ValidationFailed {
                field: "max_tree_depth".to_string(),
                reason: format!("must be between 1 and {}", TREE_DEPTH_CAP),
            });
        }

        self.logging.validate()?;

        if self.warmup.tree_depth > self.max_tree_depth {
            return Err(ConfigError::ValidationFailed {
                field: "warmup.tree_depth".to_string(),
                reason: format!("cannot exceed max_tree_depth ({})", self.max_tree_depth),
            });
        }
        if let Some(id) = self.warmup.roots.iter().find(|id| **id <= 0) {
            return Err(ConfigError::ValidationFailed {
                field: "warmup.roots".to_string(),
                reason: format!("id {} is not positive", id),
            });
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        self.sources.clone()
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Full filter directives such as "studbook=debug,sqlx=warn" are passed through
        if self.level.contains('=') {
            return Ok(());
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                value: self.level.clone(),
                expected: "trace, debug, info, warn, error or off".to_string(),
            });
        }
        Ok(())
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// Reads variables while recording where each field came from
struct EnvReader<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
    sources: HashMap<String, ConfigSource>,
}

impl<'a> EnvReader<'a> {
    fn new(lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            lookup,
            sources: HashMap::new(),
        }
    }

    fn optional(&mut self, key: &str, field: &str) -> Option<String> {
        let value = (self.lookup)(key);
        let source = match value {
            Some(_) => ConfigSource::EnvVar(key.to_string()),
            None => ConfigSource::Default("unset".to_string()),
        };
        self.sources.insert(field.to_string(), source);
        value
    }

    fn string(&mut self, key: &str, field: &str, default: &str) -> String {
        match self.optional(key, field) {
            Some(value) => value,
            None => {
                self.sources
                    .insert(field.to_string(), ConfigSource::Default(default.to_string()));
                default.to_string()
            }
        }
    }

    fn parsed<T>(&mut self, key: &str, field: &str, default: T, expected: &str) -> Result<T, ConfigError>
    where
        T: FromStr + ToString,
    {
        let raw = self.string(key, field, &default.to_string());
        raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.clone(),
            expected: expected.to_string(),
        })
    }

    fn flag(&mut self, key: &str, field: &str, default: bool) -> Result<bool, ConfigError> {
        let raw = self.string(key, field, if default { "true" } else { "false" });
        match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                field: field.to_string(),
                value: raw,
                expected: "true or false".to_string(),
            }),
        }
    }
}
