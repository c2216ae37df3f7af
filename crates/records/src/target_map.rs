use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{RecordsError, Result};

/// A ChEMBL target as listed by the `target` endpoint (only the fields the map needs).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetEntry {
    pub target_chembl_id: String,
    #[serde(default)]
    pub target_components: Vec<TargetComponent>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetComponent {
    #[serde(default)]
    pub accession: Option<String>,
}

/// UniProt accession -> ChEMBL target id. Persisted with bincode.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetMap {
    entries: BTreeMap<String, String>,
}

impl TargetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later targets overwrite earlier ones when an accession is shared.
    pub fn from_targets<'a, I>(targets: I) -> Self
    where
        I: IntoIterator<Item = &'a TargetEntry>,
    {
        let mut map = Self::new();
        for t in targets {
            for comp in &t.target_components {
                if let Some(acc) = comp.accession.as_deref().filter(|a| !a.is_empty()) {
                    map.insert(acc, &t.target_chembl_id);
                }
            }
        }
        map
    }

    pub fn insert(&mut self, accession: &str, target_id: &str) {
        self.entries.insert(accession.to_string(), target_id.to_string());
    }

    pub fn get(&self, accession: &str) -> Option<&str> {
        self.entries.get(accession).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let bytes = bincode::serialize(self).map_err(|e| RecordsError::Ser(e.to_string()))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| RecordsError::Io(format!("{}: {e}", path.display())))?;
        bincode::deserialize(&bytes).map_err(|e| RecordsError::Ser(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, accessions: &[Option<&str>]) -> TargetEntry {
        TargetEntry {
            target_chembl_id: id.to_string(),
            target_components: accessions
                .iter()
                .map(|a| TargetComponent { accession: a.map(str::to_string) })
                .collect(),
        }
    }

    #[test]
    fn test_from_targets_skips_missing_accessions() {
        let targets = vec![
            target("CHEMBL203", &[Some("P00533")]),
            target("CHEMBL1", &[None, Some("")]),
        ];
        let map = TargetMap::from_targets(&targets);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("P00533"), Some("CHEMBL203"));
    }

    #[test]
    fn test_from_targets_last_target_wins() {
        let targets = vec![
            target("CHEMBL_A", &[Some("Q1")]),
            target("CHEMBL_B", &[Some("Q1"), Some("Q2")]),
        ];
        let map = TargetMap::from_targets(&targets);
        assert_eq!(map.get("Q1"), Some("CHEMBL_B"));
        assert_eq!(map.get("Q2"), Some("CHEMBL_B"));
    }
}
