use std::collections::{HashMap, HashSet};

use records::{EnrichedRecord, NormalizedRecord};
use tracing::{info, warn};

use crate::provider::SequenceSource;

/// Looks up each distinct accession once, in first-seen order and one at a time. Failed or empty
/// lookups count as not found.
pub async fn fetch_sequences(source: &dyn SequenceSource, accessions: &[&str]) -> HashMap<String, String> {
    let mut seen = HashSet::new();
    let mut found = HashMap::new();

    for acc in accessions.iter().copied().filter(|a| seen.insert(*a)) {
        match source.sequence(acc).await {
            Ok(Some(seq)) if !seq.is_empty() => {
                found.insert(acc.to_string(), seq);
            }
            Ok(_) => {}
            Err(e) => warn!(accession = acc, "enrich: sequence lookup failed: {e:#}"),
        }
    }
    found
}

/// Joins sequences onto `records`, drops records without one and re-indexes from 0.
pub async fn enrich(source: &dyn SequenceSource, records: Vec<NormalizedRecord>) -> Vec<EnrichedRecord> {
    let accessions: Vec<&str> = records.iter().map(|r| r.protein_id.as_str()).collect();
    let sequences = fetch_sequences(source, &accessions).await;

    let before = records.len();
    let enriched: Vec<EnrichedRecord> = records
        .into_iter()
        .filter_map(|r| {
            let seq = sequences.get(&r.protein_id)?.clone();
            Some((r, seq))
        })
        .enumerate()
        .map(|(i, (r, seq))| EnrichedRecord::from_normalized(r, i, seq))
        .collect();

    info!(
        accessions = sequences.len(),
        rows_in = before,
        rows_out = enriched.len(),
        "enrich: sequences joined"
    );
    enriched
}
