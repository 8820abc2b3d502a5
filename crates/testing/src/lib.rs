//! # studbook-testing - test fixtures for studbook
//!
//! Shared fixtures for the studbook crates' tests:
//!
//! - **Kennel database**: in-memory SQLite with a small pedigree schema
//! - **Factories**: fluent builders that insert animals and dependents
//! - **Instrumented pool**: records statements and injects query failures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use studbook_testing::prelude::*;
//!
//! # async fn example() -> TestResult<()> {
//! let db = TestDatabase::kennel().await?;
//! let sire = AnimalBuilder::new("Rex").male().create(&db).await?;
//! let pup = AnimalBuilder::new("Pup").father(sire).create(&db).await?;
//! assert!(db.record_exists("animals", pup).await?);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
#[cfg(feature = "database")]
pub mod database;
#[cfg(feature = "factories")]
pub mod factories;
pub mod instrumented;

pub use assertions::TestAssertions;
#[cfg(feature = "database")]
pub use database::{kennel_schema, TestDatabase, KENNEL_DDL};
#[cfg(feature = "factories")]
pub use factories::AnimalBuilder;
pub use instrumented::InstrumentedPool;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        assertions::TestAssertions, init_test_tracing, instrumented::InstrumentedPool, TestError,
        TestResult,
    };

    #[cfg(feature = "database")]
    pub use crate::database::{kennel_schema, TestDatabase};

    #[cfg(feature = "factories")]
    pub use crate::factories::AnimalBuilder;

    pub use serde_json::{json, Value as JsonValue};
}

#[derive(thiserror::Error, Debug)]
pub enum TestError {
    #[error("Database error: {0}")]
    Database(#[from] studbook_orm::ModelError),

    #[error("Assertion failed: {message}")]
    Assertion { message: String },

    #[error("Test setup error: {0}")]
    Setup(String),
}

pub type TestResult<T> = Result<T, TestError>;

/// Route `tracing` output to the test harness; safe to call from every test
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
