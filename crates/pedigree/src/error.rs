use studbook_orm::ModelError;
use thiserror::Error;

pub type PedigreeResult<T> = Result<T, PedigreeError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PedigreeError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] ModelError),
}

impl PedigreeError {
    pub fn is_validation(&self) -> bool {
        match self {
            PedigreeError::Validation(_) => true,
            PedigreeError::Database(e) => e.is_validation(),
        }
    }
}
