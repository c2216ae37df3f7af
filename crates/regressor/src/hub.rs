//! Model hub loading for the two frozen encoders and their tokenizers.

use std::collections::HashMap;
use std::path::PathBuf;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::Config as BertConfig;
use hf_hub::api::sync::{Api, ApiRepo};
use tracing::info;

use crate::{BertEncoder, EsmConfig, EsmEncoder, EsmTokenizer, HfTokenizer, RegressorError, Result};

/// ChemBERTa's tokenizer limit.
const SMILES_MAX_LEN: usize = 512;

fn repo(model_id: &str) -> Result<ApiRepo> {
    let api = Api::new().map_err(|e| RegressorError::Hub(e.to_string()))?;
    Ok(api.model(model_id.to_string()))
}

fn fetch(repo: &ApiRepo, file: &str) -> Result<PathBuf> {
    repo.get(file).map_err(|e| RegressorError::Hub(format!("{file}: {e}")))
}

/// Frozen weights: memory-mapped safetensors, falling back to a PyTorch pickle.
/// Nothing loaded here is a `Var`, so no gradient ever reaches it.
fn weights(repo: &ApiRepo, device: &Device) -> Result<VarBuilder<'static>> {
    match repo.get("model.safetensors") {
        Ok(path) => {
            // SAFETY: the file is a hub cache entry that is not modified while mapped
            let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? };
            Ok(vb)
        }
        Err(_) => {
            let path = fetch(repo, "pytorch_model.bin")?;
            Ok(VarBuilder::from_pth(path, DType::F32, device)?)
        }
    }
}

/// The whole checkpoint in memory, for models whose tensors are rewritten before loading.
fn tensors(repo: &ApiRepo, device: &Device) -> Result<HashMap<String, Tensor>> {
    match repo.get("model.safetensors") {
        Ok(path) => Ok(candle_core::safetensors::load(path, device)?),
        Err(_) => {
            let path = fetch(repo, "pytorch_model.bin")?;
            candle_core::pickle::read_all(path)?
                .into_iter()
                .map(|(name, t)| Ok((name, t.to_device(device)?)))
                .collect()
        }
    }
}

fn read_json(path: &PathBuf) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn load_protein_encoder(model_id: &str, device: &Device) -> Result<(EsmEncoder, EsmTokenizer)> {
    let repo = repo(model_id)?;
    let config: EsmConfig = serde_json::from_str(&std::fs::read_to_string(fetch(&repo, "config.json")?)?)?;

    // <cls> and <eos> take two of the position slots
    let max_len = config.max_position_embeddings.saturating_sub(2).max(3);
    let tokenizer = EsmTokenizer::from_vocab_file(&fetch(&repo, "vocab.txt")?, max_len)?;
    let encoder = EsmEncoder::load(weights(&repo, device)?, &config)?;

    info!(model = model_id, hidden = config.hidden_size, layers = config.num_hidden_layers, "hub: protein encoder loaded");
    Ok((encoder, tokenizer))
}

pub fn load_smiles_encoder(model_id: &str, device: &Device) -> Result<(BertEncoder, HfTokenizer)> {
    let repo = repo(model_id)?;
    let config_path = fetch(&repo, "config.json")?;
    let raw = read_json(&config_path)?;
    let hidden_size = raw["hidden_size"]
        .as_u64()
        .ok_or_else(|| RegressorError::Config(format!("{model_id}: config.json has no hidden_size")))?
        as usize;
    let roberta = raw["model_type"].as_str().is_some_and(|t| t.contains("roberta"));
    let padding_idx = raw["pad_token_id"].as_u64().unwrap_or(1) as usize;
    let config: BertConfig = serde_json::from_value(raw)?;

    let tokenizer = match repo.get("tokenizer.json") {
        Ok(path) => HfTokenizer::from_file(&path, SMILES_MAX_LEN)?,
        Err(_) => HfTokenizer::from_bpe_files(
            &fetch(&repo, "vocab.json")?,
            &fetch(&repo, "merges.txt")?,
            SMILES_MAX_LEN,
        )?,
    };
    let encoder = if roberta {
        BertEncoder::load_roberta(tensors(&repo, device)?, &config, hidden_size, padding_idx, device)?
    } else {
        BertEncoder::load(weights(&repo, device)?, &config, hidden_size)?
    };

    info!(model = model_id, hidden = hidden_size, roberta, "hub: smiles encoder loaded");
    Ok((encoder, tokenizer))
}
