mod chembl;
mod config;
mod enricher;
mod fetcher;
mod mapping;
mod provider;
mod stages;
mod uniprot;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;

/// QSAR pipeline: ChEMBL/UniProt scraping, potency normalization and a dual-encoder regressor
#[derive(Parser, Debug)]
#[command(name = "pipeline")]
#[command(version)]
#[command(about = "QSAR data pipeline and potency regressor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the UniProt accession -> ChEMBL target map
    Map,

    /// Fetch activities and ligand structures for every mapped UniProt entry
    Fetch,

    /// Normalize potencies and write one table per assay type
    Clean,

    /// Join protein sequences onto the configured assay-type table
    Enrich,

    /// Train the regression head on the enriched table
    Train,

    /// Predict pActivity for one protein/ligand pair
    Predict {
        /// Amino-acid sequence
        sequence: String,
        /// Ligand SMILES
        smiles: String,
    },

    /// Run every stage in order (map only when the map file is missing)
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::from_env()?;
    info!(
        data_dir = %cfg.data_dir.display(),
        output_dir = %cfg.output_dir.display(),
        "pipeline: config loaded"
    );

    match cli.command {
        Commands::Map => stages::map_targets(&cfg).await?,
        Commands::Fetch => stages::fetch(&cfg).await?,
        Commands::Clean => {
            stages::clean(&cfg)?;
        }
        Commands::Enrich => stages::enrich(&cfg).await?,
        Commands::Train => stages::train(&cfg).await?,
        Commands::Predict { sequence, smiles } => {
            let p = stages::predict(&cfg, sequence, smiles).await?;
            println!("{p:.4}");
        }
        Commands::Run => stages::run(&cfg).await?,
    }

    Ok(())
}
