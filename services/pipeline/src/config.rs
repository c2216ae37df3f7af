use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use records::ActivityType;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub uniprot_tsv: String,

    pub chembl_api_url: String,
    pub uniprot_api_url: String,
    pub max_concurrent_requests: usize,
    pub chembl_page_limit: usize,
    pub chembl_timeout_secs: u64,
    pub uniprot_timeout_secs: u64,

    pub enrich_type: ActivityType,

    pub protein_model: String,
    pub smiles_model: String,
    pub test_split: f64,
    pub seed: u64,
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub warmup_steps: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let chembl_api_url = or_default("CHEMBL_API_URL", "https://www.ebi.ac.uk/chembl/api/data");
        let uniprot_api_url = or_default("UNIPROT_API_URL", "https://rest.uniprot.org/uniprotkb");

        let enrich_type = ActivityType::from_str(&or_default("QSAR_ENRICH_TYPE", "IC50"))
            .map_err(|e| anyhow!("QSAR_ENRICH_TYPE: {e}"))?;

        let cfg = Self {
            data_dir: PathBuf::from(or_default("QSAR_DATA_DIR", "data")),
            output_dir: PathBuf::from(or_default("QSAR_OUTPUT_DIR", "results")),
            uniprot_tsv: or_default("UNIPROT_TSV", "uniprotkb_organism_id_9606_AND_reviewed.tsv"),
            chembl_api_url: chembl_api_url.trim_end_matches('/').to_string(),
            uniprot_api_url: uniprot_api_url.trim_end_matches('/').to_string(),
            max_concurrent_requests: parse_or("QSAR_MAX_CONCURRENT_REQUESTS", 5)?,
            chembl_page_limit: parse_or("CHEMBL_PAGE_LIMIT", 1000)?,
            chembl_timeout_secs: parse_or("CHEMBL_TIMEOUT_SECS", 30)?,
            uniprot_timeout_secs: parse_or("UNIPROT_TIMEOUT_SECS", 10)?,
            enrich_type,
            protein_model: or_default("PROTEIN_MODEL", "facebook/esm2_t6_8M_UR50D"),
            smiles_model: or_default("SMILES_MODEL", "seyonec/ChemBERTa-zinc-base-v1"),
            test_split: parse_or("QSAR_TEST_SPLIT", 0.2)?,
            seed: parse_or("QSAR_SEED", 42)?,
            batch_size: parse_or("QSAR_BATCH_SIZE", 8)?,
            epochs: parse_or("QSAR_EPOCHS", 5)?,
            learning_rate: parse_or("QSAR_LEARNING_RATE", 5e-6)?,
            warmup_steps: parse_or("QSAR_WARMUP_STEPS", 500)?,
        };

        // reject bad endpoints and bounds before any stage touches the network
        for (key, url) in [("CHEMBL_API_URL", &cfg.chembl_api_url), ("UNIPROT_API_URL", &cfg.uniprot_api_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!("{key} must start with http:// or https://");
            }
        }
        if cfg.max_concurrent_requests == 0 {
            bail!("QSAR_MAX_CONCURRENT_REQUESTS must be at least 1");
        }
        if !(cfg.test_split > 0.0 && cfg.test_split < 1.0) {
            bail!("QSAR_TEST_SPLIT must be in (0, 1)");
        }

        Ok(cfg)
    }

    pub fn uniprot_tsv_path(&self) -> PathBuf {
        self.data_dir.join(&self.uniprot_tsv)
    }

    pub fn target_map_path(&self) -> PathBuf {
        self.data_dir.join("uniprot_to_chembl.bin")
    }

    pub fn raw_dataset_path(&self) -> PathBuf {
        self.data_dir.join("qsar_dataset_async.csv")
    }

    /// `qsar_ki.csv`, `qsar_kd.csv`, `qsar_ic50.csv`
    pub fn normalized_path(&self, t: ActivityType) -> PathBuf {
        self.data_dir.join(format!("{}.csv", t.table_stem()))
    }

    pub fn enriched_path(&self, t: ActivityType) -> PathBuf {
        self.data_dir.join(format!("{}_fasta.csv", t.table_stem()))
    }
}

fn or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => v.trim().parse().with_context(|| format!("Invalid value for env var {key}: {v}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
impl AppConfig {
    /// Defaults with both directories pointed at scratch locations.
    pub(crate) fn for_dirs(data_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            data_dir,
            output_dir,
            uniprot_tsv: "human.tsv".into(),
            chembl_api_url: "https://example.org/chembl".into(),
            uniprot_api_url: "https://example.org/uniprot".into(),
            max_concurrent_requests: 5,
            chembl_page_limit: 1000,
            chembl_timeout_secs: 30,
            uniprot_timeout_secs: 10,
            enrich_type: ActivityType::Ic50,
            protein_model: "facebook/esm2_t6_8M_UR50D".into(),
            smiles_model: "seyonec/ChemBERTa-zinc-base-v1".into(),
            test_split: 0.2,
            seed: 42,
            batch_size: 8,
            epochs: 5,
            learning_rate: 5e-6,
            warmup_steps: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_paths() {
        let cfg = AppConfig::for_dirs(PathBuf::from("data"), PathBuf::from("results"));
        assert_eq!(cfg.normalized_path(ActivityType::Ki), PathBuf::from("data/qsar_ki.csv"));
        assert_eq!(cfg.enriched_path(ActivityType::Ic50), PathBuf::from("data/qsar_ic50_fasta.csv"));
        assert_eq!(cfg.target_map_path(), PathBuf::from("data/uniprot_to_chembl.bin"));
        assert_eq!(cfg.uniprot_tsv_path(), PathBuf::from("data/human.tsv"));
        assert_eq!(cfg.raw_dataset_path(), PathBuf::from("data/qsar_dataset_async.csv"));
    }

    #[test]
    fn test_parse_or_rejects_garbage() {
        std::env::set_var("QSAR_TEST_PARSE_OR_EPOCHS", "five");
        assert!(parse_or::<usize>("QSAR_TEST_PARSE_OR_EPOCHS", 5).is_err());
        std::env::set_var("QSAR_TEST_PARSE_OR_EPOCHS", " 7 ");
        assert_eq!(parse_or::<usize>("QSAR_TEST_PARSE_OR_EPOCHS", 5).unwrap(), 7);
        assert_eq!(parse_or::<usize>("QSAR_TEST_PARSE_OR_UNSET", 5).unwrap(), 5);
    }
}
