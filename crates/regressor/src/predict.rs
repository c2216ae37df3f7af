use std::path::Path;
use std::sync::Arc;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use tracing::info;

use crate::collator::DualEncoderCollator;
use crate::encoder::PooledEncoder;
use crate::hub::{load_protein_encoder, load_smiles_encoder};
use crate::network::{DualEncoderRegressor, HeadConfig};
use crate::tokenize::TextTokenizer;
use crate::trainer::HEAD_WEIGHTS_FILE;
use crate::Result;

/// A trained head plus its frozen encoders, ready for inference.
pub struct Predictor {
    model: DualEncoderRegressor,
    collator: DualEncoderCollator,
    batch_size: usize,
}

impl Predictor {
    /// Builds the head from `<dir>/head_config.json` and loads `<dir>/head.safetensors` into it.
    pub fn from_parts(
        dir: &Path,
        protein: Box<dyn PooledEncoder>,
        smiles: Box<dyn PooledEncoder>,
        collator: DualEncoderCollator,
        batch_size: usize,
    ) -> Result<Self> {
        let config = HeadConfig::load(dir)?;
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, collator.device());
        let model = DualEncoderRegressor::with_config(protein, smiles, config, vb)?;
        varmap.load(dir.join(HEAD_WEIGHTS_FILE))?;
        Ok(Self { model, collator, batch_size: batch_size.max(1) })
    }

    /// Fetches both encoders from the model hub and loads the trained head from `dir`.
    pub fn load(
        dir: &Path,
        protein_model: &str,
        smiles_model: &str,
        batch_size: usize,
        device: Device,
    ) -> Result<Self> {
        let (protein, protein_tok) = load_protein_encoder(protein_model, &device)?;
        let (smiles, smiles_tok) = load_smiles_encoder(smiles_model, &device)?;
        let protein_tok: Arc<dyn TextTokenizer> = Arc::new(protein_tok);
        let smiles_tok: Arc<dyn TextTokenizer> = Arc::new(smiles_tok);
        let collator = DualEncoderCollator::new(protein_tok, smiles_tok, device);

        let predictor = Self::from_parts(dir, Box::new(protein), Box::new(smiles), collator, batch_size)?;
        info!(dir = %dir.display(), input_dim = predictor.model.config().input_dim, "predictor: head loaded");
        Ok(predictor)
    }

    /// One pActivity prediction per `(protein_sequence, smiles)` pair, dropout disabled.
    pub fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(pairs.len());
        for chunk in pairs.chunks(self.batch_size) {
            let batch = self.collator.collate_inputs(chunk)?;
            out.extend(self.model.forward(&batch, false)?.to_vec1::<f32>()?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collator::tests::ByteTokenizer;
    use crate::network::tests::MeanIdEncoder;

    #[test]
    fn test_predictions_follow_saved_head() {
        let dev = Device::Cpu;
        let dir = std::env::temp_dir().join(format!("predictor-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let tok: Arc<dyn TextTokenizer> = Arc::new(ByteTokenizer);
        let collator = DualEncoderCollator::new(tok.clone(), tok, dev.clone());

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let trained = DualEncoderRegressor::new(
            Box::new(MeanIdEncoder { hidden: 2 }),
            Box::new(MeanIdEncoder { hidden: 3 }),
            vb,
        )
        .unwrap();
        varmap.save(dir.join(HEAD_WEIGHTS_FILE)).unwrap();
        trained.config().save(&dir).unwrap();

        let pairs = vec![
            ("MKLV".to_string(), "CCO".to_string()),
            ("MK".to_string(), "C".to_string()),
            ("AAAAAA".to_string(), "c1ccccc1".to_string()),
        ];
        let batch = collator.collate_inputs(&pairs).unwrap();
        let expected = trained.forward(&batch, false).unwrap().to_vec1::<f32>().unwrap();

        let predictor = Predictor::from_parts(
            &dir,
            Box::new(MeanIdEncoder { hidden: 2 }),
            Box::new(MeanIdEncoder { hidden: 3 }),
            collator,
            2,
        )
        .unwrap();
        let got = predictor.predict(&pairs).unwrap();

        assert_eq!(got.len(), 3);
        for (g, e) in got.iter().zip(&expected) {
            assert!((g - e).abs() < 1e-5);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
