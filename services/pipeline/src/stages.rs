use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use curation::{build_dataset, normalize, DatasetManifest, DatasetOptions, PotencyPartitions};
use records::{read_column, read_table, write_table, NormalizedRecord, RawActivityRow, TargetMap};
use regressor::{
    load_protein_encoder, load_smiles_encoder, DualEncoderCollator, DualEncoderRegressor, Predictor,
    Trainer, TrainingArgs,
};
use tracing::info;

use crate::chembl::ChemblClient;
use crate::config::AppConfig;
use crate::enricher;
use crate::fetcher::{plan_jobs, Fetcher};
use crate::mapping::build_target_map;
use crate::provider::{BioactivitySource, SequenceSource};
use crate::uniprot::UniprotClient;

const MANIFEST_FILE: &str = "dataset_manifest.json";

fn chembl_client(cfg: &AppConfig) -> Result<ChemblClient> {
    ChemblClient::new(
        cfg.chembl_api_url.clone(),
        cfg.chembl_page_limit,
        Duration::from_secs(cfg.chembl_timeout_secs),
    )
}

fn device() -> Result<Device> {
    Device::cuda_if_available(0).context("Failed to select compute device")
}

pub async fn map_targets(cfg: &AppConfig) -> Result<()> {
    let client = chembl_client(cfg)?;
    let map = build_target_map(&client).await?;

    let path = cfg.target_map_path();
    map.save(&path)
        .with_context(|| format!("Failed to save target map to {}", path.display()))?;
    info!(accessions = map.len(), path = %path.display(), "map: saved");
    Ok(())
}

pub async fn fetch(cfg: &AppConfig) -> Result<()> {
    let client: Arc<dyn BioactivitySource> = Arc::new(chembl_client(cfg)?);
    fetch_with(cfg, client).await
}

pub async fn fetch_with(cfg: &AppConfig, source: Arc<dyn BioactivitySource>) -> Result<()> {
    let tsv = cfg.uniprot_tsv_path();
    let ids = read_column(&tsv, "Entry", b'\t')
        .with_context(|| format!("Failed to read UniProt entries from {}", tsv.display()))?;

    let map_path = cfg.target_map_path();
    let map = TargetMap::load(&map_path)
        .with_context(|| format!("Failed to load target map from {}", map_path.display()))?;

    let jobs = plan_jobs(&ids, &map);
    info!(uniprot_ids = ids.len(), mapped = map.len(), targets = jobs.len(), "fetch: starting");

    let rows = Fetcher::new(source, cfg.max_concurrent_requests).fetch_all(jobs).await;

    let out = cfg.raw_dataset_path();
    write_table(&out, &rows).with_context(|| format!("Failed to write {}", out.display()))?;
    info!(rows = rows.len(), path = %out.display(), "fetch: saved");
    Ok(())
}

pub fn clean(cfg: &AppConfig) -> Result<PotencyPartitions> {
    let raw = cfg.raw_dataset_path();
    let rows: Vec<RawActivityRow> =
        read_table(&raw).with_context(|| format!("Failed to read {}", raw.display()))?;

    let parts = normalize(&rows);
    for (t, recs) in parts.iter() {
        let path = cfg.normalized_path(t);
        write_table(&path, recs).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(activity_type = %t, rows = recs.len(), path = %path.display(), "clean: saved");
    }
    Ok(parts)
}

pub async fn enrich(cfg: &AppConfig) -> Result<()> {
    let client = UniprotClient::new(
        cfg.uniprot_api_url.clone(),
        Duration::from_secs(cfg.uniprot_timeout_secs),
    )?;
    enrich_with(cfg, &client).await
}

pub async fn enrich_with(cfg: &AppConfig, source: &dyn SequenceSource) -> Result<()> {
    let input = cfg.normalized_path(cfg.enrich_type);
    let records: Vec<NormalizedRecord> =
        read_table(&input).with_context(|| format!("Failed to read {}", input.display()))?;

    let enriched = enricher::enrich(source, records).await;

    let out = cfg.enriched_path(cfg.enrich_type);
    write_table(&out, &enriched).with_context(|| format!("Failed to write {}", out.display()))?;
    info!(rows = enriched.len(), path = %out.display(), "enrich: saved");
    Ok(())
}

/// Model loading and the training loop are blocking; they run off the async workers.
pub async fn train(cfg: &AppConfig) -> Result<()> {
    let cfg = cfg.clone();
    tokio::task::spawn_blocking(move || train_blocking(&cfg))
        .await
        .context("Training task panicked")?
}

fn prepare_dataset(cfg: &AppConfig, source: &Path) -> Result<curation::DatasetSplit> {
    let opts = DatasetOptions { test_split: cfg.test_split, seed: cfg.seed, ..Default::default() };
    let split = build_dataset(source, &opts)
        .with_context(|| format!("Failed to build dataset from {}", source.display()))?;

    let manifest = DatasetManifest::build(source, &opts, &split)?;
    let manifest_path = cfg.output_dir.join(MANIFEST_FILE);
    manifest.write_json(&manifest_path)?;
    info!(
        examples = manifest.examples,
        train = manifest.train,
        test = manifest.test,
        label_mean = manifest.labels.mean,
        path = %manifest_path.display(),
        "train: dataset manifest written"
    );
    Ok(split)
}

fn train_blocking(cfg: &AppConfig) -> Result<()> {
    let split = prepare_dataset(cfg, &cfg.enriched_path(cfg.enrich_type))?;

    let device = device()?;
    let (protein, protein_tok) = load_protein_encoder(&cfg.protein_model, &device)
        .with_context(|| format!("Failed to load protein model {}", cfg.protein_model))?;
    let (smiles, smiles_tok) = load_smiles_encoder(&cfg.smiles_model, &device)
        .with_context(|| format!("Failed to load SMILES model {}", cfg.smiles_model))?;
    let collator = DualEncoderCollator::new(Arc::new(protein_tok), Arc::new(smiles_tok), device.clone());

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = DualEncoderRegressor::new(Box::new(protein), Box::new(smiles), vb)?;

    let args = TrainingArgs {
        output_dir: cfg.output_dir.clone(),
        train_batch_size: cfg.batch_size,
        eval_batch_size: cfg.batch_size,
        epochs: cfg.epochs,
        learning_rate: cfg.learning_rate,
        warmup_steps: cfg.warmup_steps,
        seed: cfg.seed,
        ..Default::default()
    };
    let mut trainer = Trainer::new(model, varmap, collator, args);
    let state = trainer.train(&split.train, &split.test)?;

    info!(
        steps = state.global_step,
        best_eval_rmse = ?state.best_eval_rmse,
        output_dir = %cfg.output_dir.display(),
        "train: done"
    );
    Ok(())
}

pub async fn predict(cfg: &AppConfig, sequence: String, smiles: String) -> Result<f32> {
    let cfg = cfg.clone();
    tokio::task::spawn_blocking(move || -> Result<f32> {
        let predictor = Predictor::load(
            &cfg.output_dir,
            &cfg.protein_model,
            &cfg.smiles_model,
            cfg.batch_size,
            device()?,
        )
        .with_context(|| format!("Failed to load trained head from {}", cfg.output_dir.display()))?;
        let preds = predictor.predict(&[(sequence, smiles)])?;
        preds.first().copied().context("Model returned no prediction")
    })
    .await
    .context("Prediction task panicked")?
}

/// Builds the target map when it is missing, then fetch, clean, enrich and train in order.
pub async fn run(cfg: &AppConfig) -> Result<()> {
    if cfg.target_map_path().exists() {
        info!(path = %cfg.target_map_path().display(), "run: reusing target map");
    } else {
        map_targets(cfg).await?;
    }
    fetch(cfg).await?;
    clean(cfg)?;
    enrich(cfg).await?;
    train(cfg).await
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use anyhow::bail;
    use async_trait::async_trait;
    use records::{ActivityType, EnrichedRecord};

    use super::*;
    use crate::provider::{Activity, Page};

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pipeline-stages-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    struct OneTargetChembl;

    #[async_trait]
    impl BioactivitySource for OneTargetChembl {
        async fn activity_page(&self, target_id: &str, _next: Option<&str>) -> Result<Page<Activity>> {
            if target_id != "CHEMBL203" {
                bail!("unexpected target {target_id}");
            }
            let act = |kind: &str, value: &str, mol: &str| Activity {
                standard_type: Some(kind.into()),
                standard_value: Some(value.into()),
                standard_units: Some("nM".into()),
                molecule_chembl_id: Some(mol.into()),
            };
            Ok(Page {
                items: vec![
                    act("IC50", "100", "CHEMBL10"),
                    act("Ki", "5", "CHEMBL11"),
                    act("EC50", "3", "CHEMBL12"),
                    act("IC50", "0", "CHEMBL13"),
                ],
                next: None,
            })
        }

        async fn canonical_smiles(&self, molecule_id: &str) -> Result<Option<String>> {
            Ok(Some(match molecule_id {
                "CHEMBL10" => "CCO".into(),
                "CHEMBL11" => "c1ccccc1".into(),
                _ => "CN".into(),
            }))
        }
    }

    struct OneSequence;

    #[async_trait]
    impl SequenceSource for OneSequence {
        async fn sequence(&self, accession: &str) -> Result<Option<String>> {
            Ok((accession == "P00533").then(|| "MRPSGTAGAALLALLAALCPASRA".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fetch_clean_enrich_file_flow() {
        let data = scratch("flow");
        let cfg = AppConfig::for_dirs(data.clone(), data.join("results"));

        std::fs::write(cfg.uniprot_tsv_path(), "Entry\tEntry Name\nP00533\tEGFR_HUMAN\nQ99999\tNOPE_HUMAN\n").unwrap();
        let mut map = TargetMap::new();
        map.insert("P00533", "CHEMBL203");
        map.save(&cfg.target_map_path()).unwrap();

        fetch_with(&cfg, Arc::new(OneTargetChembl)).await.unwrap();
        let raw: Vec<RawActivityRow> = read_table(&cfg.raw_dataset_path()).unwrap();
        // EC50 is filtered at fetch time; the zero value survives until cleaning
        assert_eq!(raw.len(), 3);

        let parts = clean(&cfg).unwrap();
        assert_eq!(parts.get(ActivityType::Ic50).len(), 1);
        assert_eq!(parts.get(ActivityType::Ki).len(), 1);
        assert!(cfg.normalized_path(ActivityType::Kd).exists());

        let ic50: Vec<NormalizedRecord> = read_table(&cfg.normalized_path(ActivityType::Ic50)).unwrap();
        assert!((ic50[0].p_activity - 7.0).abs() < 1e-9);

        enrich_with(&cfg, &OneSequence).await.unwrap();
        let enriched: Vec<EnrichedRecord> = read_table(&cfg.enriched_path(ActivityType::Ic50)).unwrap();
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].index, 0);
        assert_eq!(enriched[0].smiles, "CCO");
        assert!(enriched[0].protein_sequence.starts_with("MRPS"));

        let _ = std::fs::remove_dir_all(&data);
    }

    #[test]
    fn test_prepare_dataset_writes_manifest() {
        let data = scratch("manifest");
        let cfg = AppConfig::for_dirs(data.clone(), data.join("results"));

        let rows: Vec<EnrichedRecord> = (0..10)
            .map(|i| EnrichedRecord {
                index: i,
                protein_id: "P00533".into(),
                target_id: "CHEMBL203".into(),
                ligand_id: format!("CHEMBL{i}"),
                activity_type: ActivityType::Ic50,
                activity_value: 10f64.powi(i as i32 % 4),
                activity_units: Some("nM".into()),
                smiles: "CCO".into(),
                p_activity: 9.0 - (i % 4) as f64,
                protein_sequence: "MKTAYIAKQR".into(),
            })
            .collect();
        let path = cfg.enriched_path(ActivityType::Ic50);
        write_table(&path, &rows).unwrap();

        let split = prepare_dataset(&cfg, &path).unwrap();
        assert_eq!(split.test.len(), 2);
        assert_eq!(split.train.len(), 8);

        let manifest: serde_json::Value = serde_json::from_slice(
            &std::fs::read(cfg.output_dir.join(MANIFEST_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest["examples"], 10);
        assert_eq!(manifest["dataset_hash_hex"].as_str().unwrap().len(), 64);

        let _ = std::fs::remove_dir_all(&data);
    }
}
