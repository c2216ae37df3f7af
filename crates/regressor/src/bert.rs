use std::collections::HashMap;

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};

use crate::encoder::PooledEncoder;
use crate::{RegressorError, Result};

const POSITION_TABLE: &str = "embeddings.position_embeddings.weight";

/// BERT-family encoder (ChemBERTa is a RoBERTa checkpoint; the `roberta.` weight prefix is
/// resolved by `BertModel::load` through `model_type`).
pub struct BertEncoder {
    model: BertModel,
    hidden_size: usize,
}

impl BertEncoder {
    pub fn load(vb: VarBuilder, config: &Config, hidden_size: usize) -> Result<Self> {
        let model = BertModel::load(vb, config)?;
        Ok(Self { model, hidden_size })
    }

    /// Loads a RoBERTa checkpoint held in memory, renumbering its position table first
    /// (see [`shift_roberta_positions`]).
    pub fn load_roberta(
        mut tensors: HashMap<String, Tensor>,
        config: &Config,
        hidden_size: usize,
        padding_idx: usize,
        device: &Device,
    ) -> Result<Self> {
        shift_roberta_positions(&mut tensors, padding_idx)?;
        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        Self::load(vb, config, hidden_size)
    }
}

/// RoBERTa numbers real tokens from `padding_idx + 1`, candle's BERT embeddings from 0.
/// Moves the position table up by `padding_idx + 1` rows so that, for right-padded input, the
/// token at index `i` reads the row RoBERTa trained for it. The freed tail rows are zero; only
/// padding positions land there and those are masked out of attention.
pub fn shift_roberta_positions(tensors: &mut HashMap<String, Tensor>, padding_idx: usize) -> Result<()> {
    let key = tensors
        .keys()
        .find(|k| k.ends_with(POSITION_TABLE))
        .cloned()
        .ok_or_else(|| RegressorError::Config(format!("checkpoint has no {POSITION_TABLE}")))?;
    let table = &tensors[&key];

    let (rows, hidden) = table.dims2()?;
    let shift = padding_idx + 1;
    if shift >= rows {
        return Err(RegressorError::Config(format!(
            "padding_idx {padding_idx} leaves no positions in a {rows}-row table"
        )));
    }

    let kept = table.narrow(0, shift, rows - shift)?;
    let tail = Tensor::zeros((shift, hidden), table.dtype(), table.device())?;
    let shifted = Tensor::cat(&[&kept, &tail], 0)?;
    tensors.insert(key, shifted);
    Ok(())
}

impl PooledEncoder for BertEncoder {
    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn pooled(&self, ids: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let token_type_ids = ids.zeros_like()?;
        let hidden = self.model.forward(ids, &token_type_ids, Some(mask))?;
        Ok(hidden.i((.., 0))?.contiguous()?)
    }
}
