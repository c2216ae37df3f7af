//! Bounded-concurrency bioactivity fetch.
//!
//! One task per target runs in a `JoinSet`; every HTTP request (activity page or molecule lookup)
//! holds a permit from a shared semaphore for its duration, so at most K requests are in flight
//! across all targets. A failed molecule lookup drops only that ligand; a failed target drops only
//! that target's rows.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use records::{ActivityType, BioactivityRecord, TargetMap};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::provider::{Activity, BioactivitySource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub protein_id: String,
    pub target_id: String,
}

/// Accessions without a mapped target are skipped.
pub fn plan_jobs(protein_ids: &[String], map: &TargetMap) -> Vec<FetchJob> {
    protein_ids
        .iter()
        .filter_map(|p| {
            map.get(p).map(|t| FetchJob { protein_id: p.clone(), target_id: t.to_string() })
        })
        .collect()
}

struct Qualified {
    activity_type: ActivityType,
    value: String,
    units: Option<String>,
    molecule_id: String,
}

/// Recognized assay type, a non-empty value and a molecule id.
fn qualify(a: Activity) -> Option<Qualified> {
    let activity_type = ActivityType::from_str(a.standard_type.as_deref()?).ok()?;
    let value = a.standard_value.filter(|v| !v.trim().is_empty())?;
    let molecule_id = a.molecule_chembl_id.filter(|m| !m.is_empty())?;
    Some(Qualified { activity_type, value, units: a.standard_units, molecule_id })
}

pub struct Fetcher {
    source: Arc<dyn BioactivitySource>,
    gate: Arc<Semaphore>,
}

impl Fetcher {
    pub fn new(source: Arc<dyn BioactivitySource>, max_concurrent: usize) -> Self {
        Self { source, gate: Arc::new(Semaphore::new(max_concurrent.max(1))) }
    }

    /// Rows from every target that succeeded, in completion order.
    pub async fn fetch_all(&self, jobs: Vec<FetchJob>) -> Vec<BioactivityRecord> {
        let total = jobs.len();
        let mut set = JoinSet::new();
        for job in jobs {
            let source = self.source.clone();
            let gate = self.gate.clone();
            set.spawn(async move {
                let res = fetch_target(source.as_ref(), &gate, &job).await;
                (job, res)
            });
        }

        let mut rows = Vec::new();
        let mut failed = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((job, Ok(found))) => {
                    debug!(target_id = %job.target_id, rows = found.len(), "fetch: target done");
                    rows.extend(found);
                }
                Ok((job, Err(e))) => {
                    failed += 1;
                    warn!(target_id = %job.target_id, protein_id = %job.protein_id, "fetch: target failed: {e:#}");
                }
                Err(e) => {
                    failed += 1;
                    warn!("fetch: target task aborted: {e}");
                }
            }
        }

        info!(targets = total, failed, rows = rows.len(), "fetch: done");
        rows
    }
}

async fn fetch_target(
    source: &dyn BioactivitySource,
    gate: &Semaphore,
    job: &FetchJob,
) -> Result<Vec<BioactivityRecord>> {
    let mut qualifying = Vec::new();
    let mut next: Option<String> = None;
    loop {
        let page = {
            let _permit = gate.acquire().await?;
            source.activity_page(&job.target_id, next.as_deref()).await?
        };
        qualifying.extend(page.items.into_iter().filter_map(qualify));
        match page.next {
            Some(link) => next = Some(link),
            None => break,
        }
    }

    let mut seen = HashSet::new();
    let molecules: Vec<&str> = qualifying
        .iter()
        .map(|q| q.molecule_id.as_str())
        .filter(|m| seen.insert(*m))
        .collect();

    let resolved = join_all(molecules.iter().map(|m| resolve_smiles(source, gate, m))).await;
    let smiles: HashMap<&str, String> = molecules
        .iter()
        .copied()
        .zip(resolved)
        .filter_map(|(m, s)| s.map(|s| (m, s)))
        .collect();

    let rows = qualifying
        .iter()
        .filter_map(|q| {
            let s = smiles.get(q.molecule_id.as_str())?;
            Some(BioactivityRecord {
                protein_id: job.protein_id.clone(),
                target_id: job.target_id.clone(),
                ligand_id: q.molecule_id.clone(),
                activity_type: q.activity_type,
                activity_value: q.value.clone(),
                activity_units: q.units.clone(),
                smiles: s.clone(),
            })
        })
        .collect();
    Ok(rows)
}

async fn resolve_smiles(source: &dyn BioactivitySource, gate: &Semaphore, molecule_id: &str) -> Option<String> {
    let _permit = gate.acquire().await.ok()?;
    match source.canonical_smiles(molecule_id).await {
        Ok(smiles) => smiles,
        Err(e) => {
            warn!(molecule_id = molecule_id, "fetch: molecule lookup failed: {e:#}");
            None
        }
    }
}
