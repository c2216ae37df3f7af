//! Bioactivity records
//!
//! Row types shared by every pipeline stage, CSV table I/O and the persisted
//! UniProt accession -> ChEMBL target map.

mod schema;
mod table;
mod target_map;

pub use schema::{
    ActivityType, BioactivityRecord, EnrichedRecord, NormalizedRecord, RawActivityRow,
    TableRow, TrainingExample,
};
pub use table::{read_column, read_table, write_table, ColumnTable};
pub use target_map::{TargetComponent, TargetEntry, TargetMap};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordsError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Serialization error: {0}")]
    Ser(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),
}

pub type Result<T> = std::result::Result<T, RecordsError>;

impl From<std::io::Error> for RecordsError {
    fn from(e: std::io::Error) -> Self {
        RecordsError::Io(e.to_string())
    }
}

impl From<csv::Error> for RecordsError {
    fn from(e: csv::Error) -> Self {
        RecordsError::Csv(e.to_string())
    }
}
