use std::path::Path;

use candle_core::{Module, ModuleT, Tensor, D};
use candle_nn::{linear, Dropout, Linear, VarBuilder};
use serde::{Deserialize, Serialize};

use crate::collator::Batch;
use crate::encoder::PooledEncoder;
use crate::Result;

pub const HEAD_CONFIG_FILE: &str = "head_config.json";

/// Shape of the trainable head, persisted next to its weights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeadConfig {
    pub input_dim: usize,
    pub hidden_size: usize,
    pub dropout: f32,
}

impl HeadConfig {
    pub fn new(input_dim: usize) -> Self {
        Self { input_dim, hidden_size: 768, dropout: 0.1 }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(HEAD_CONFIG_FILE), serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let bytes = std::fs::read(dir.join(HEAD_CONFIG_FILE))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// fc1 -> ReLU -> dropout -> fc2, squeezed to `(batch,)`.
pub struct RegressionHead {
    fc1: Linear,
    dropout: Dropout,
    fc2: Linear,
}

impl RegressionHead {
    pub fn new(cfg: &HeadConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            fc1: linear(cfg.input_dim, cfg.hidden_size, vb.pp("fc1"))?,
            dropout: Dropout::new(cfg.dropout),
            fc2: linear(cfg.hidden_size, 1, vb.pp("fc2"))?,
        })
    }
}

impl ModuleT for RegressionHead {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let h = self.fc1.forward(xs)?.relu()?;
        let h = self.dropout.forward_t(&h, train)?;
        self.fc2.forward(&h)?.squeeze(D::Minus1)
    }
}

/// Two frozen encoders feeding one trainable head.
pub struct DualEncoderRegressor {
    protein: Box<dyn PooledEncoder>,
    smiles: Box<dyn PooledEncoder>,
    head: RegressionHead,
    config: HeadConfig,
}

impl DualEncoderRegressor {
    /// `vb` should be backed by the trainable `VarMap`; the head input width is the sum of the
    /// encoders' hidden sizes.
    pub fn new(
        protein: Box<dyn PooledEncoder>,
        smiles: Box<dyn PooledEncoder>,
        vb: VarBuilder,
    ) -> Result<Self> {
        let config = HeadConfig::new(protein.hidden_size() + smiles.hidden_size());
        Self::with_config(protein, smiles, config, vb)
    }

    pub fn with_config(
        protein: Box<dyn PooledEncoder>,
        smiles: Box<dyn PooledEncoder>,
        config: HeadConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        let expected = protein.hidden_size() + smiles.hidden_size();
        if config.input_dim != expected {
            return Err(crate::RegressorError::Config(format!(
                "head expects {} inputs, encoders produce {expected}",
                config.input_dim
            )));
        }
        let head = RegressionHead::new(&config, vb)?;
        Ok(Self { protein, smiles, head, config })
    }

    pub fn config(&self) -> &HeadConfig {
        &self.config
    }

    /// Predictions, `(batch,)`. `train` enables dropout.
    pub fn forward(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        let p = self.protein.pooled(&batch.protein_ids, &batch.protein_mask)?;
        let s = self.smiles.pooled(&batch.smiles_ids, &batch.smiles_mask)?;
        let features = Tensor::cat(&[&p, &s], 1)?;
        Ok(self.head.forward_t(&features, train)?)
    }
}
