pub mod potency;
pub mod dataset;
pub mod manifest;

pub use potency::*;
pub use dataset::*;
pub use manifest::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CurationError {
    #[error("Records error: {0}")]
    Records(String),

    #[error("Invalid split: {0}")]
    InvalidSplit(String),

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),
}

pub type Result<T> = std::result::Result<T, CurationError>;

impl From<records::RecordsError> for CurationError {
    fn from(e: records::RecordsError) -> Self {
        CurationError::Records(e.to_string())
    }
}
