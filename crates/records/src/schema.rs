use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Assay types the pipeline recognizes. Anything else (EC50, Potency, ...) is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActivityType {
    #[serde(rename = "Ki")]
    Ki,
    #[serde(rename = "Kd")]
    Kd,
    #[serde(rename = "IC50")]
    Ic50,
}

impl ActivityType {
    pub const ALL: [ActivityType; 3] = [ActivityType::Ki, ActivityType::Kd, ActivityType::Ic50];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::Ki => "Ki",
            ActivityType::Kd => "Kd",
            ActivityType::Ic50 => "IC50",
        }
    }

    /// File stem used for the per-type tables: `qsar_ki`, `qsar_kd`, `qsar_ic50`.
    pub fn table_stem(self) -> String {
        format!("qsar_{}", self.as_str().to_ascii_lowercase())
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ki" => Ok(ActivityType::Ki),
            "Kd" => Ok(ActivityType::Kd),
            "IC50" => Ok(ActivityType::Ic50),
            other => Err(format!("unrecognized activity type: {other}")),
        }
    }
}

/// Header row of a CSV table, in the order the row type serializes its fields.
pub trait TableRow {
    const COLUMNS: &'static [&'static str];
}

const ACTIVITY_COLUMNS: [&str; 7] = [
    "UniProt_ID",
    "Target_ID",
    "Ligand_ChEMBL_ID",
    "Activity_Type",
    "Activity_Value",
    "Activity_Units",
    "SMILES",
];

/// One qualifying ChEMBL activity joined with its ligand structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BioactivityRecord {
    #[serde(rename = "UniProt_ID")]
    pub protein_id: String,
    #[serde(rename = "Target_ID")]
    pub target_id: String,
    #[serde(rename = "Ligand_ChEMBL_ID")]
    pub ligand_id: String,
    #[serde(rename = "Activity_Type")]
    pub activity_type: ActivityType,
    /// Value text exactly as ChEMBL reported it (nanomolar). Parsed by the normalizer.
    #[serde(rename = "Activity_Value")]
    pub activity_value: String,
    #[serde(rename = "Activity_Units")]
    pub activity_units: Option<String>,
    #[serde(rename = "SMILES")]
    pub smiles: String,
}

/// The raw bioactivity table as read back from disk. Any cell may be empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawActivityRow {
    #[serde(rename = "UniProt_ID", default)]
    pub protein_id: Option<String>,
    #[serde(rename = "Target_ID", default)]
    pub target_id: Option<String>,
    #[serde(rename = "Ligand_ChEMBL_ID", default)]
    pub ligand_id: Option<String>,
    #[serde(rename = "Activity_Type", default)]
    pub activity_type: Option<String>,
    #[serde(rename = "Activity_Value", default)]
    pub activity_value: Option<String>,
    #[serde(rename = "Activity_Units", default)]
    pub activity_units: Option<String>,
    #[serde(rename = "SMILES", default)]
    pub smiles: Option<String>,
}

impl TableRow for BioactivityRecord {
    const COLUMNS: &'static [&'static str] = &ACTIVITY_COLUMNS;
}

impl TableRow for RawActivityRow {
    const COLUMNS: &'static [&'static str] = &ACTIVITY_COLUMNS;
}

impl From<BioactivityRecord> for RawActivityRow {
    fn from(r: BioactivityRecord) -> Self {
        Self {
            protein_id: Some(r.protein_id),
            target_id: Some(r.target_id),
            ligand_id: Some(r.ligand_id),
            activity_type: Some(r.activity_type.as_str().to_string()),
            activity_value: Some(r.activity_value),
            activity_units: r.activity_units,
            smiles: Some(r.smiles),
        }
    }
}

/// A record that survived potency normalization. `index` is contiguous within its partition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(rename = "Index")]
    pub index: usize,
    #[serde(rename = "UniProt_ID")]
    pub protein_id: String,
    #[serde(rename = "Target_ID")]
    pub target_id: String,
    #[serde(rename = "Ligand_ChEMBL_ID")]
    pub ligand_id: String,
    #[serde(rename = "Activity_Type")]
    pub activity_type: ActivityType,
    #[serde(rename = "Activity_Value")]
    pub activity_value: f64,
    #[serde(rename = "Activity_Units")]
    pub activity_units: Option<String>,
    #[serde(rename = "SMILES")]
    pub smiles: String,
    #[serde(rename = "pActivity")]
    pub p_activity: f64,
}

/// A normalized record joined with its full amino-acid sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(rename = "Index")]
    pub index: usize,
    #[serde(rename = "UniProt_ID")]
    pub protein_id: String,
    #[serde(rename = "Target_ID")]
    pub target_id: String,
    #[serde(rename = "Ligand_ChEMBL_ID")]
    pub ligand_id: String,
    #[serde(rename = "Activity_Type")]
    pub activity_type: ActivityType,
    #[serde(rename = "Activity_Value")]
    pub activity_value: f64,
    #[serde(rename = "Activity_Units")]
    pub activity_units: Option<String>,
    #[serde(rename = "SMILES")]
    pub smiles: String,
    #[serde(rename = "pActivity")]
    pub p_activity: f64,
    #[serde(rename = "Protein_Sequence")]
    pub protein_sequence: String,
}

impl TableRow for NormalizedRecord {
    const COLUMNS: &'static [&'static str] = &[
        "Index",
        "UniProt_ID",
        "Target_ID",
        "Ligand_ChEMBL_ID",
        "Activity_Type",
        "Activity_Value",
        "Activity_Units",
        "SMILES",
        "pActivity",
    ];
}

impl TableRow for EnrichedRecord {
    const COLUMNS: &'static [&'static str] = &[
        "Index",
        "UniProt_ID",
        "Target_ID",
        "Ligand_ChEMBL_ID",
        "Activity_Type",
        "Activity_Value",
        "Activity_Units",
        "SMILES",
        "pActivity",
        "Protein_Sequence",
    ];
}

impl EnrichedRecord {
    pub fn from_normalized(rec: NormalizedRecord, index: usize, protein_sequence: String) -> Self {
        Self {
            index,
            protein_id: rec.protein_id,
            target_id: rec.target_id,
            ligand_id: rec.ligand_id,
            activity_type: rec.activity_type,
            activity_value: rec.activity_value,
            activity_units: rec.activity_units,
            smiles: rec.smiles,
            p_activity: rec.p_activity,
            protein_sequence,
        }
    }
}

/// Canonical model input: `{protein_sequence, smiles, label}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub protein_sequence: String,
    pub smiles: String,
    pub label: f32,
}
