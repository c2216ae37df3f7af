use std::sync::Arc;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use records::TrainingExample;
use regressor::tokenize::ESM_VOCAB;
use regressor::{
    predict_batches, DualEncoderCollator, DualEncoderRegressor, EsmConfig, EsmEncoder, EsmTokenizer,
    PooledEncoder, TextTokenizer,
};

fn tiny_esm() -> EsmConfig {
    EsmConfig {
        vocab_size: 33,
        hidden_size: 8,
        num_hidden_layers: 1,
        num_attention_heads: 2,
        intermediate_size: 16,
        layer_norm_eps: 1e-5,
        token_dropout: true,
        max_position_embeddings: 32,
    }
}

#[test]
fn test_esm_pipeline_predicts_one_value_per_pair() {
    let dev = Device::Cpu;
    let cfg = tiny_esm();

    let protein = EsmEncoder::load(VarBuilder::zeros(DType::F32, &dev), &cfg).unwrap();
    let smiles = EsmEncoder::load(VarBuilder::zeros(DType::F32, &dev), &cfg).unwrap();
    assert_eq!(protein.hidden_size() + smiles.hidden_size(), 16);

    let tok: Arc<dyn TextTokenizer> = Arc::new(EsmTokenizer::from_tokens(&ESM_VOCAB, 16).unwrap());
    let collator = DualEncoderCollator::new(tok.clone(), tok, dev.clone());

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
    let model = DualEncoderRegressor::new(Box::new(protein), Box::new(smiles), vb).unwrap();
    assert_eq!(model.config().input_dim, 16);
    assert_eq!(model.config().hidden_size, 768);

    let examples = vec![
        TrainingExample { protein_sequence: "MKTAYIAKQR".into(), smiles: "CCO".into(), label: 6.1 },
        TrainingExample { protein_sequence: "MLKLRV".into(), smiles: "CN".into(), label: 7.4 },
        TrainingExample { protein_sequence: "GAV".into(), smiles: "C".into(), label: 5.0 },
    ];

    let preds = predict_batches(&model, &collator, &examples, 2).unwrap();
    assert_eq!(preds.len(), 3);
    assert!(preds.iter().all(|p| p.is_finite()));

    // encoder tensors never enter the trainable map
    assert_eq!(varmap.all_vars().len(), 4);
}

#[test]
fn test_long_sequences_are_truncated_before_encoding() {
    let dev = Device::Cpu;
    let tok = EsmTokenizer::from_tokens(&ESM_VOCAB, 8).unwrap();
    let ids = tok.encode(&"A".repeat(100)).unwrap();
    assert_eq!(ids.len(), 8);

    let tok: Arc<dyn TextTokenizer> = Arc::new(tok);
    let collator = DualEncoderCollator::new(tok.clone(), tok, dev);
    let batch = collator
        .collate(&[TrainingExample { protein_sequence: "A".repeat(100), smiles: "CC".into(), label: 1.0 }])
        .unwrap();
    assert_eq!(batch.protein_ids.dims(), &[1, 8]);
}
