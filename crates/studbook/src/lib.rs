//! # studbook
//!
//! Referential-integrity checks and cached pedigree trees for hierarchical
//! records. This crate wires the building blocks together:
//!
//! - [`studbook_orm`]: relationship discovery, dependency checks, safe deletes
//! - [`studbook_pedigree`]: ancestor and descendant trees with their cache
//! - [`studbook_cache`]: the TTL cache and startup warm-up runner
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use studbook::{telemetry, EnvConfig, Studbook, StudbookConfig};
//!
//! let config = StudbookConfig::from_env()?;
//! config.validate()?;
//! telemetry::init_tracing(&config.logging)?;
//!
//! let service = Arc::new(Studbook::connect(&config, schema).await?);
//! if config.warmup.enabled {
//!     service.spawn_warmup(&config.warmup);
//! }
//!
//! let (safe, warnings) = service.can_delete_safely("animals", 42).await?;
//! ```

pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;
pub mod warmup;

pub use config::{ConfigError, ConfigSource, EnvConfig, LoggingConfig, StudbookConfig, WarmupConfig};
pub use error::{StudbookError, StudbookResult};
pub use service::{ServiceCacheStats, Studbook};

pub use studbook_cache;
pub use studbook_orm;
pub use studbook_pedigree;

pub mod prelude {
    pub use crate::{EnvConfig, Studbook, StudbookConfig, StudbookError, StudbookResult};
    pub use studbook_orm::{DeletionOutcome, DeletionSummary, IntegrityWarning, SchemaSource};
    pub use studbook_pedigree::{Relation, TreeEdge, TreeKind, TreeNode, TreeResult};
}
