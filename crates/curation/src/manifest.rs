use std::{fs::File, io, path::Path};

use serde::{Deserialize, Serialize};

use crate::{CurationError, DatasetOptions, DatasetSplit, Result};

pub type Hash32 = [u8; 32];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub std: f32,
}

/// Provenance of one training dataset: which file, which bytes, how it was split.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub source_path: String,
    #[serde(with = "hex", rename = "dataset_hash_hex")]
    pub dataset_hash: Hash32, // BLAKE3(file_bytes)
    pub examples: u64,
    pub train: u64,
    pub test: u64,
    pub test_split: f64,
    pub seed: u64,
    pub labels: LabelStats,
    pub created_at: u64,
}

fn now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn hash_file(path: &Path) -> Result<Hash32> {
    let mut f = File::open(path)
        .map_err(|e| CurationError::Records(format!("{}: {e}", path.display())))?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut f, &mut hasher).map_err(|e| CurationError::Records(e.to_string()))?;
    Ok(hasher.finalize().into())
}

/// Population statistics over the labels of both subsets.
pub fn label_stats(split: &DatasetSplit) -> Option<LabelStats> {
    let labels: Vec<f32> = split.train.iter().chain(&split.test).map(|e| e.label).collect();
    if labels.is_empty() {
        return None;
    }

    let n = labels.len() as f64;
    let mean = labels.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = labels.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    let min = labels.iter().copied().fold(f32::INFINITY, f32::min);
    let max = labels.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    Some(LabelStats { min, max, mean: mean as f32, std: var.sqrt() as f32 })
}

impl DatasetManifest {
    pub fn build(source: &Path, opts: &DatasetOptions, split: &DatasetSplit) -> Result<Self> {
        let labels = label_stats(split)
            .ok_or_else(|| CurationError::EmptyDataset(source.display().to_string()))?;

        Ok(Self {
            source_path: source.display().to_string(),
            dataset_hash: hash_file(source)?,
            examples: split.len() as u64,
            train: split.train.len() as u64,
            test: split.test.len() as u64,
            test_split: opts.test_split,
            seed: opts.seed,
            labels,
            created_at: now(),
        })
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| CurationError::Records(e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CurationError::Records(e.to_string()))?;
            }
        }
        std::fs::write(path, bytes).map_err(|e| CurationError::Records(e.to_string()))
    }
}
