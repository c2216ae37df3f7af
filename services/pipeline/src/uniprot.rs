use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::provider::SequenceSource;

pub struct UniprotClient {
    base_url: String,
    client: reqwest::Client,
}

impl UniprotClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build UniProt HTTP client")?;
        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl SequenceSource for UniprotClient {
    async fn sequence(&self, accession: &str) -> Result<Option<String>> {
        let url = format!("{}/{}.fasta", self.base_url, urlencoding::encode(accession));
        let resp = self.client.get(url).send().await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Ok(None);
        }
        let text = resp.text().await?;
        Ok(Some(parse_fasta(&text)))
    }
}

/// Drops the `>` header line and joins the remaining lines into one sequence.
pub fn parse_fasta(text: &str) -> String {
    text.lines().skip(1).map(str::trim_end).collect()
}
