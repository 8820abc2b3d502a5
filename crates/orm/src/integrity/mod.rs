//! Referential integrity checks and safe deletion

pub mod checker;
pub mod deletion;
pub mod probes;
pub mod types;

pub use checker::{integrity_cache_key, validate_id, IntegrityChecker, IntegrityConfig};
pub use deletion::{DeletedEntity, DeletionObserver, DeletionService};
pub use types::{DeletionOutcome, DeletionSummary, IntegrityWarning, UNVERIFIED_DEPENDENTS};
