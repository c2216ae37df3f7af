use records::{ActivityType, NormalizedRecord, RawActivityRow};
use tracing::info;

/// Nanomolar concentration -> pActivity (negative log10 of the molar concentration).
///
/// `convert_to_p(10.0)` is 8.0. Zero yields +inf and negative inputs yield NaN; callers filter
/// non-finite results.
pub fn convert_to_p(nanomolar: f64) -> f64 {
    -(nanomolar * 1e-9).log10()
}

/// Normalized records split by assay type. Each partition is indexed from 0.
#[derive(Clone, Debug, Default)]
pub struct PotencyPartitions {
    pub ki: Vec<NormalizedRecord>,
    pub kd: Vec<NormalizedRecord>,
    pub ic50: Vec<NormalizedRecord>,
    pub dropped: usize,
}

impl PotencyPartitions {
    pub fn get(&self, t: ActivityType) -> &[NormalizedRecord] {
        match t {
            ActivityType::Ki => &self.ki,
            ActivityType::Kd => &self.kd,
            ActivityType::Ic50 => &self.ic50,
        }
    }

    fn get_mut(&mut self, t: ActivityType) -> &mut Vec<NormalizedRecord> {
        match t {
            ActivityType::Ki => &mut self.ki,
            ActivityType::Kd => &mut self.kd,
            ActivityType::Ic50 => &mut self.ic50,
        }
    }

    pub fn total(&self) -> usize {
        self.ki.len() + self.kd.len() + self.ic50.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActivityType, &[NormalizedRecord])> {
        ActivityType::ALL.into_iter().map(move |t| (t, self.get(t)))
    }
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Drops incomplete rows and unrecognized assay types, converts the value to pActivity and
/// partitions by type. Input order is preserved within each partition.
pub fn normalize(rows: &[RawActivityRow]) -> PotencyPartitions {
    let mut parts = PotencyPartitions::default();

    for row in rows {
        let (Some(value), Some(smiles), Some(kind)) =
            (present(&row.activity_value), present(&row.smiles), present(&row.activity_type))
        else {
            parts.dropped += 1;
            continue;
        };

        let Ok(activity_type) = kind.parse::<ActivityType>() else {
            parts.dropped += 1;
            continue;
        };

        let Some((activity_value, p_activity)) = value
            .parse::<f64>()
            .ok()
            .map(|v| (v, convert_to_p(v)))
            .filter(|(_, p)| p.is_finite())
        else {
            parts.dropped += 1;
            continue;
        };

        let bucket = parts.get_mut(activity_type);
        let index = bucket.len();
        bucket.push(NormalizedRecord {
            index,
            protein_id: row.protein_id.clone().unwrap_or_default(),
            target_id: row.target_id.clone().unwrap_or_default(),
            ligand_id: row.ligand_id.clone().unwrap_or_default(),
            activity_type,
            activity_value,
            activity_units: row.activity_units.clone(),
            smiles: smiles.to_string(),
            p_activity,
        });
    }

    info!(
        ki = parts.ki.len(),
        kd = parts.kd.len(),
        ic50 = parts.ic50.len(),
        dropped = parts.dropped,
        "normalize: done"
    );
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: &str, value: &str, smiles: &str) -> RawActivityRow {
        RawActivityRow {
            protein_id: Some("P1".into()),
            target_id: Some("CHEMBL1".into()),
            ligand_id: Some("CHEMBL10".into()),
            activity_type: Some(kind.into()),
            activity_value: Some(value.into()),
            activity_units: Some("nM".into()),
            smiles: Some(smiles.into()),
        }
    }

    #[test]
    fn test_convert_to_p_matches_definition() {
        assert!((convert_to_p(10.0) - 8.0).abs() < 1e-12);
        assert!((convert_to_p(1.0) - 9.0).abs() < 1e-12);
        for v in [0.01, 3.0, 5.0, 250.0, 1e6] {
            let expected = -(v * 1e-9f64).log10();
            assert!((convert_to_p(v) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_convert_to_p_non_positive_is_not_finite() {
        assert!(!convert_to_p(0.0).is_finite());
        assert!(convert_to_p(-1.0).is_nan());
    }

    #[test]
    fn test_normalize_drops_incomplete_and_foreign_rows() {
        let mut missing_smiles = row("Ki", "5", "CCO");
        missing_smiles.smiles = None;
        let mut blank_value = row("Ki", "5", "CCO");
        blank_value.activity_value = Some("  ".into());

        let rows = vec![
            row("Ki", "5", "CCO"),
            row("EC50", "5", "CCO"),
            row("IC50", "abc", "CCO"),
            row("Kd", "0", "CCO"),
            row("Kd", "-2", "CCO"),
            missing_smiles,
            blank_value,
        ];
        let parts = normalize(&rows);

        assert_eq!(parts.total(), 1);
        assert_eq!(parts.dropped, 6);
        assert_eq!(parts.ki.len(), 1);
        assert!((parts.ki[0].p_activity - 8.30103).abs() < 1e-4);
    }

    #[test]
    fn test_normalize_indexes_each_partition_from_zero() {
        let rows = vec![
            row("IC50", "100", "C"),
            row("Ki", "1", "CC"),
            row("IC50", "1000", "CCC"),
            row("Kd", "10", "CCCC"),
            row("Ki", "2", "CCCCC"),
        ];
        let parts = normalize(&rows);

        for (t, recs) in parts.iter() {
            for (i, r) in recs.iter().enumerate() {
                assert_eq!(r.index, i);
                assert_eq!(r.activity_type, t);
            }
        }
        assert_eq!(parts.ic50.len(), 2);
        assert_eq!(parts.ic50[1].smiles, "CCC");
        assert!((parts.ic50[1].p_activity - 6.0).abs() < 1e-9);
    }
}
