use std::path::Path;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use records::{ColumnTable, TrainingExample};
use tracing::info;

use crate::{CurationError, Result};

#[derive(Clone, Debug)]
pub struct DatasetOptions {
    pub sequence_col: String,
    pub smiles_col: String,
    pub target_col: String,
    /// Fraction of rows reserved for the test set, in (0, 1).
    pub test_split: f64,
    pub seed: u64,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            sequence_col: "Protein_Sequence".to_string(),
            smiles_col: "SMILES".to_string(),
            target_col: "pActivity".to_string(),
            test_split: 0.2,
            seed: 42,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DatasetSplit {
    pub train: Vec<TrainingExample>,
    pub test: Vec<TrainingExample>,
}

impl DatasetSplit {
    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reads the three source columns, renames them to the canonical schema and drops incomplete
/// rows. A label that is not a finite number counts as missing.
pub fn load_examples(path: &Path, opts: &DatasetOptions) -> Result<Vec<TrainingExample>> {
    let table = ColumnTable::open(path, b',')?;
    if table.headers().is_empty() {
        return Err(CurationError::EmptyDataset(format!("{} has no header row", path.display())));
    }
    let rows = table.select(&[&opts.sequence_col, &opts.smiles_col, &opts.target_col])?;
    Ok(examples_from_columns(rows))
}

pub fn examples_from_columns(rows: Vec<Vec<Option<String>>>) -> Vec<TrainingExample> {
    rows.into_iter()
        .filter_map(|cols| {
            let mut it = cols.into_iter();
            let protein_sequence = it.next()??;
            let smiles = it.next()??;
            let label = it
                .next()??
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())?;
            Some(TrainingExample { protein_sequence, smiles, label })
        })
        .collect()
}

/// Seeded permutation of `0..n`: the first `ceil(test_split * n)` indices form the test set,
/// the rest the train set.
pub fn split_indices(n: usize, test_split: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_split > 0.0 && test_split < 1.0) {
        return Err(CurationError::InvalidSplit(format!(
            "test_split must be in (0, 1), got {test_split}"
        )));
    }
    if n == 0 {
        return Err(CurationError::EmptyDataset("no rows to split".to_string()));
    }

    let n_test = (test_split * n as f64).ceil() as usize;
    let n_train = n - n_test;
    if n_train == 0 {
        return Err(CurationError::InvalidSplit(format!(
            "{n} rows with test_split {test_split} leaves an empty train set"
        )));
    }

    let mut perm: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    perm.shuffle(&mut rng);

    let train = perm.split_off(n_test);
    Ok((train, perm))
}

pub fn train_test_split(
    examples: Vec<TrainingExample>,
    test_split: f64,
    seed: u64,
) -> Result<DatasetSplit> {
    let (train_idx, test_idx) = split_indices(examples.len(), test_split, seed)?;

    let mut slots: Vec<Option<TrainingExample>> = examples.into_iter().map(Some).collect();
    let mut take = |idx: Vec<usize>| -> Vec<TrainingExample> {
        idx.into_iter().filter_map(|i| slots[i].take()).collect()
    };
    let test = take(test_idx);
    let train = take(train_idx);

    Ok(DatasetSplit { train, test })
}

pub fn build_dataset(path: &Path, opts: &DatasetOptions) -> Result<DatasetSplit> {
    let examples = load_examples(path, opts)?;
    let split = train_test_split(examples, opts.test_split, opts.seed)?;
    info!(
        path = %path.display(),
        train = split.train.len(),
        test = split.test.len(),
        seed = opts.seed,
        "dataset: split"
    );
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(seq: Option<&str>, smiles: Option<&str>, label: Option<&str>) -> Vec<Option<String>> {
        vec![seq.map(Into::into), smiles.map(Into::into), label.map(Into::into)]
    }

    #[test]
    fn test_examples_drop_missing_fields() {
        let rows = vec![
            cols(Some("MKT"), Some("CCO"), Some("7.5")),
            cols(None, Some("CCO"), Some("7.5")),
            cols(Some("MKT"), None, Some("7.5")),
            cols(Some("MKT"), Some("CCO"), None),
            cols(Some("MKT"), Some("CCO"), Some("nan")),
            cols(Some("MKT"), Some("CCO"), Some("x")),
        ];
        let ex = examples_from_columns(rows);
        assert_eq!(ex.len(), 1);
        assert_eq!(ex[0].label, 7.5);
    }

    #[test]
    fn test_split_sizes_sum_to_total() {
        for n in [2usize, 5, 10, 11, 99, 1000] {
            let (train, test) = split_indices(n, 0.2, 42).unwrap();
            assert_eq!(train.len() + test.len(), n);
            assert_eq!(test.len(), (0.2 * n as f64).ceil() as usize);
        }
    }

    #[test]
    fn test_split_is_deterministic_per_seed() {
        let a = split_indices(200, 0.2, 42).unwrap();
        let b = split_indices(200, 0.2, 42).unwrap();
        assert_eq!(a, b);

        let c = split_indices(200, 0.2, 7).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_split_partitions_every_index_once() {
        let (train, test) = split_indices(50, 0.3, 1).unwrap();
        let mut all: Vec<usize> = train.into_iter().chain(test).collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_rejects_bad_fraction_and_empty_input() {
        assert!(matches!(split_indices(10, 0.0, 42), Err(CurationError::InvalidSplit(_))));
        assert!(matches!(split_indices(10, 1.0, 42), Err(CurationError::InvalidSplit(_))));
        assert!(matches!(split_indices(0, 0.2, 42), Err(CurationError::EmptyDataset(_))));
        assert!(matches!(split_indices(1, 0.2, 42), Err(CurationError::InvalidSplit(_))));
    }
}
