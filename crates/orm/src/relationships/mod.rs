//! Relationship discovery
//!
//! Turns declared relations and schema foreign keys into the descriptors
//! that integrity probes and cascade deletes run against.

pub mod catalog;
pub mod metadata;

pub use catalog::{EntityRelationships, RelationshipCatalog};
pub use metadata::{RelationshipDescriptor, RelationshipDirection};
