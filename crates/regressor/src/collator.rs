use std::sync::Arc;

use candle_core::{Device, Tensor};
use records::TrainingExample;

use crate::tokenize::TextTokenizer;
use crate::Result;

/// One padded mini-batch. Ids and masks are `(batch, seq)` u32; labels are `(batch,)` f32.
#[derive(Debug)]
pub struct Batch {
    pub protein_ids: Tensor,
    pub protein_mask: Tensor,
    pub smiles_ids: Tensor,
    pub smiles_mask: Tensor,
    pub labels: Tensor,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.dims().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tokenizes both inputs and pads each side to the longest sequence in the batch.
#[derive(Clone)]
pub struct DualEncoderCollator {
    protein: Arc<dyn TextTokenizer>,
    smiles: Arc<dyn TextTokenizer>,
    device: Device,
}

impl DualEncoderCollator {
    pub fn new(protein: Arc<dyn TextTokenizer>, smiles: Arc<dyn TextTokenizer>, device: Device) -> Self {
        Self { protein, smiles, device }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn collate(&self, examples: &[TrainingExample]) -> Result<Batch> {
        let labels: Vec<f32> = examples.iter().map(|e| e.label).collect();
        self.collate_pairs(
            examples.iter().map(|e| (e.protein_sequence.as_str(), e.smiles.as_str())),
            &labels,
        )
    }

    /// Unlabelled inputs for inference; labels are zero-filled.
    pub fn collate_inputs(&self, pairs: &[(String, String)]) -> Result<Batch> {
        let labels = vec![0f32; pairs.len()];
        self.collate_pairs(pairs.iter().map(|(p, s)| (p.as_str(), s.as_str())), &labels)
    }

    fn collate_pairs<'a>(
        &self,
        pairs: impl Iterator<Item = (&'a str, &'a str)>,
        labels: &[f32],
    ) -> Result<Batch> {
        let mut protein = Vec::with_capacity(labels.len());
        let mut smiles = Vec::with_capacity(labels.len());
        for (p, s) in pairs {
            protein.push(self.protein.encode(p)?);
            smiles.push(self.smiles.encode(s)?);
        }

        let (protein_ids, protein_mask) = pad(&protein, self.protein.pad_id(), &self.device)?;
        let (smiles_ids, smiles_mask) = pad(&smiles, self.smiles.pad_id(), &self.device)?;
        let labels = Tensor::new(labels, &self.device)?;

        Ok(Batch { protein_ids, protein_mask, smiles_ids, smiles_mask, labels })
    }
}

fn pad(seqs: &[Vec<u32>], pad_id: u32, device: &Device) -> Result<(Tensor, Tensor)> {
    let width = seqs.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let mut ids = Vec::with_capacity(seqs.len() * width);
    let mut mask = Vec::with_capacity(seqs.len() * width);

    for seq in seqs {
        ids.extend_from_slice(seq);
        mask.extend(std::iter::repeat(1u32).take(seq.len()));
        ids.extend(std::iter::repeat(pad_id).take(width - seq.len()));
        mask.extend(std::iter::repeat(0u32).take(width - seq.len()));
    }

    let shape = (seqs.len(), width);
    Ok((
        Tensor::from_vec(ids, shape, device)?,
        Tensor::from_vec(mask, shape, device)?,
    ))
}
