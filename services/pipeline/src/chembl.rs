//! ChEMBL REST client: activity pages per target, molecule structures and the single-protein
//! target listing.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use records::TargetEntry;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::provider::{Activity, BioactivitySource, Page, TargetSource};

/// Server-side filter matching the assay types the normalizer keeps.
const ACTIVITY_TYPES_FILTER: &str = "IC50,Ki,Kd";

pub struct ChemblClient {
    base_url: String,
    page_limit: usize,
    client: reqwest::Client,
}

impl ChemblClient {
    pub fn new(base_url: String, page_limit: usize, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build ChEMBL HTTP client")?;
        Ok(Self { base_url, page_limit, client })
    }

    /// `page_meta.next` is a server-relative path (`/chembl/api/data/...`).
    fn resolve(&self, next: &str) -> Result<reqwest::Url> {
        let base = reqwest::Url::parse(&self.base_url).context("Invalid ChEMBL base URL")?;
        base.join(next).with_context(|| format!("Invalid next-page link: {next}"))
    }

    async fn get_json(&self, req: reqwest::RequestBuilder) -> Result<JsonValue> {
        let resp = req
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl BioactivitySource for ChemblClient {
    async fn activity_page(&self, target_id: &str, next: Option<&str>) -> Result<Page<Activity>> {
        let limit = self.page_limit.to_string();
        let req = match next {
            Some(next) => self.client.get(self.resolve(next)?),
            None => self.client.get(format!("{}/activity.json", self.base_url)).query(&[
                ("target_chembl_id", target_id),
                ("standard_type__in", ACTIVITY_TYPES_FILTER),
                ("limit", limit.as_str()),
            ]),
        };
        let json = self
            .get_json(req)
            .await
            .with_context(|| format!("activity query for {target_id}"))?;
        let page = parse_activity_page(&json);
        debug!(target_id = target_id, activities = page.items.len(), more = page.next.is_some(), "chembl: activity page");
        Ok(page)
    }

    async fn canonical_smiles(&self, molecule_id: &str) -> Result<Option<String>> {
        let url = format!("{}/molecule/{}.json", self.base_url, urlencoding::encode(molecule_id));
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::OK {
            return Ok(None);
        }
        let json: JsonValue = resp.json().await?;
        Ok(smiles_from_molecule(&json))
    }
}

#[async_trait]
impl TargetSource for ChemblClient {
    async fn target_page(&self, next: Option<&str>) -> Result<Page<TargetEntry>> {
        let limit = self.page_limit.to_string();
        let req = match next {
            Some(next) => self.client.get(self.resolve(next)?),
            None => self.client.get(format!("{}/target.json", self.base_url)).query(&[
                ("target_type", "SINGLE PROTEIN"),
                ("only", "target_chembl_id,target_components"),
                ("limit", limit.as_str()),
            ]),
        };
        let json = self.get_json(req).await.context("target listing")?;
        parse_target_page(json)
    }
}

fn next_link(json: &JsonValue) -> Option<String> {
    json["page_meta"]["next"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// `standard_value` arrives either as a string or as a JSON number.
fn value_text(v: &JsonValue) -> Option<String> {
    match v {
        JsonValue::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn parse_activity_page(json: &JsonValue) -> Page<Activity> {
    let items = json["activities"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|a| Activity {
                    standard_type: a["standard_type"].as_str().map(String::from),
                    standard_value: value_text(&a["standard_value"]),
                    standard_units: a["standard_units"].as_str().map(String::from),
                    molecule_chembl_id: a["molecule_chembl_id"].as_str().map(String::from),
                })
                .collect()
        })
        .unwrap_or_default();

    Page { items, next: next_link(json) }
}

pub fn parse_target_page(mut json: JsonValue) -> Result<Page<TargetEntry>> {
    let next = next_link(&json);
    let items: Vec<TargetEntry> = match json.get_mut("targets").map(JsonValue::take) {
        Some(targets) => serde_json::from_value(targets).context("Malformed target listing")?,
        None => Vec::new(),
    };
    Ok(Page { items, next })
}

/// `molecule_structures.canonical_smiles`; `None` for a null body, missing structures or an
/// empty string.
pub fn smiles_from_molecule(json: &JsonValue) -> Option<String> {
    json["molecule_structures"]["canonical_smiles"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
