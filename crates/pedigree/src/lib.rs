//! # studbook-pedigree
//!
//! Bounded-depth ancestor and descendant trees over a self-referencing
//! table, with a TTL tree cache and coarse targeted invalidation.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use studbook_pedigree::{PedigreeSchema, TreeBuilder, TreeBuilderConfig};
//!
//! let builder = Arc::new(TreeBuilder::new(pool, schema, PedigreeSchema::default(), TreeBuilderConfig::default()));
//! let tree = builder.build_ancestor_tree(42, 3, Some(&["name", "sex"])).await?;
//! println!("{}", tree.summary.text);
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod tree_cache;
pub mod types;

pub use builder::TreeBuilder;
pub use config::{PedigreeSchema, TreeBuilderConfig};
pub use error::{PedigreeError, PedigreeResult};
pub use invalidation::{InvalidationCoordinator, INVALIDATED_DEPTHS};
pub use tree_cache::{tree_cache_key, TreeCache};
pub use types::*;
