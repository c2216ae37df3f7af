//! Dual-encoder potency regressor
//!
//! Two frozen pretrained encoders (ESM-2 for protein sequences, a RoBERTa-style model for
//! SMILES) feed their first-position hidden states into a small trainable head that predicts
//! pActivity. Only the head's variables are ever registered with the optimizer.

pub mod tokenize;
pub mod esm;
pub mod bert;
pub mod encoder;
pub mod hub;
pub mod collator;
pub mod network;
pub mod metrics;
pub mod trainer;
pub mod predict;

pub use tokenize::{EsmTokenizer, HfTokenizer, TextTokenizer};
pub use esm::{EsmConfig, EsmEncoder};
pub use bert::BertEncoder;
pub use encoder::PooledEncoder;
pub use hub::{load_protein_encoder, load_smiles_encoder};
pub use collator::{Batch, DualEncoderCollator};
pub use network::{DualEncoderRegressor, HeadConfig, RegressionHead, HEAD_CONFIG_FILE};
pub use metrics::{regression_metrics, EvalMetrics};
pub use trainer::{
    predict_batches, LogEntry, Trainer, TrainerState, TrainingArgs, HEAD_WEIGHTS_FILE, TRAINER_STATE_FILE,
};
pub use predict::Predictor;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegressorError {
    #[error("Candle error: {0}")]
    Candle(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Hub error: {0}")]
    Hub(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RegressorError>;

impl From<candle_core::Error> for RegressorError {
    fn from(e: candle_core::Error) -> Self {
        RegressorError::Candle(e.to_string())
    }
}

impl From<std::io::Error> for RegressorError {
    fn from(e: std::io::Error) -> Self {
        RegressorError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for RegressorError {
    fn from(e: serde_json::Error) -> Self {
        RegressorError::Json(e.to_string())
    }
}
