use studbook_cache::CacheError;
use studbook_orm::ModelError;
use studbook_pedigree::PedigreeError;
use thiserror::Error;

use crate::config::ConfigError;

pub type StudbookResult<T> = Result<T, StudbookError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StudbookError {
    #[error(transparent)]
    Orm(#[from] ModelError),

    #[error(transparent)]
    Pedigree(#[from] PedigreeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl StudbookError {
    /// True when the caller sent invalid input; nothing was queried
    pub fn is_validation(&self) -> bool {
        match self {
            StudbookError::Orm(e) => e.is_validation(),
            StudbookError::Pedigree(e) => e.is_validation(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StudbookError::Orm(ModelError::NotFound(_)))
    }
}
