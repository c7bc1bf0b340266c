use genomen_common::GenomenError;
use genomen_logic::LogicError;
use thiserror::Error;

use crate::importer::ImporterError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Repository(#[from] GenomenError),

    #[error(transparent)]
    Logic(#[from] LogicError),

    #[error(transparent)]
    Import(#[from] ImporterError),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Report error: {0}")]
    Report(String),
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        CoreError::Worker(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
