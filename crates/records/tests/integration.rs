use std::path::PathBuf;

use records::{
    read_column, read_table, write_table, ActivityType, BioactivityRecord, ColumnTable,
    EnrichedRecord, NormalizedRecord, RawActivityRow, RecordsError, TableRow, TargetMap,
};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("records-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

#[test]
fn test_raw_table_reads_empty_cells_as_none() {
    let path = scratch("raw_gaps.csv");
    std::fs::write(
        &path,
        "UniProt_ID,Target_ID,Ligand_ChEMBL_ID,Activity_Type,Activity_Value,Activity_Units,SMILES\n\
         P1,CHEMBL1,CHEMBL10,Ki,5,nM,CCO\n\
         P2,CHEMBL2,CHEMBL20,IC50,,nM,\n",
    )
    .unwrap();

    let rows: Vec<RawActivityRow> = read_table(&path).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].activity_value.as_deref(), Some("5"));
    assert_eq!(rows[1].activity_value, None);
    assert_eq!(rows[1].smiles, None);
}

#[test]
fn test_bioactivity_table_written_with_named_headers() {
    let path = scratch("bioactivity.csv");
    let rec = BioactivityRecord {
        protein_id: "P00533".into(),
        target_id: "CHEMBL203".into(),
        ligand_id: "CHEMBL939".into(),
        activity_type: ActivityType::Ic50,
        activity_value: "3.0".into(),
        activity_units: None,
        smiles: "COc1cc2ncnc(Nc3ccc(F)c(Cl)c3)c2cc1OCCCN1CCOCC1".into(),
    };
    write_table(&path, &[rec.clone()]).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let header = text.lines().next().unwrap();
    assert_eq!(
        header,
        "UniProt_ID,Target_ID,Ligand_ChEMBL_ID,Activity_Type,Activity_Value,Activity_Units,SMILES"
    );

    let back: Vec<BioactivityRecord> = read_table(&path).unwrap();
    assert_eq!(back, vec![rec]);
}

#[test]
fn test_empty_table_still_has_header() {
    let path = scratch("qsar_kd_fasta.csv");
    write_table::<EnrichedRecord>(&path, &[]).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.trim_end(), EnrichedRecord::COLUMNS.join(","));

    let back: Vec<EnrichedRecord> = read_table(&path).unwrap();
    assert!(back.is_empty());
    let table = ColumnTable::open(&path, b',').unwrap();
    assert!(table.is_empty());
    assert!(table.headers().iter().any(|h| h == "Protein_Sequence"));
}

#[test]
fn test_declared_columns_match_serialized_header() {
    let rec = NormalizedRecord {
        index: 0,
        protein_id: "P00533".into(),
        target_id: "CHEMBL203".into(),
        ligand_id: "CHEMBL939".into(),
        activity_type: ActivityType::Ki,
        activity_value: 5.0,
        activity_units: Some("nM".into()),
        smiles: "CCO".into(),
        p_activity: 8.3,
    };
    let enriched = EnrichedRecord::from_normalized(rec.clone(), 0, "MKT".into());

    let first_line = |path: &PathBuf| std::fs::read_to_string(path).unwrap().lines().next().unwrap().to_string();

    let norm_path = scratch("columns_norm.csv");
    write_table(&norm_path, &[rec]).unwrap();
    assert_eq!(first_line(&norm_path), NormalizedRecord::COLUMNS.join(","));

    let enr_path = scratch("columns_enriched.csv");
    write_table(&enr_path, &[enriched]).unwrap();
    assert_eq!(first_line(&enr_path), EnrichedRecord::COLUMNS.join(","));

    assert_eq!(BioactivityRecord::COLUMNS, RawActivityRow::COLUMNS);
}

#[test]
fn test_read_column_from_tsv_drops_blanks() {
    let path = scratch("uniprot.tsv");
    std::fs::write(&path, "Entry\tEntry Name\nP00533\tEGFR_HUMAN\n\tBLANK\nP04626\tERBB2_HUMAN\n").unwrap();

    let ids = read_column(&path, "Entry", b'\t').unwrap();
    assert_eq!(ids, vec!["P00533".to_string(), "P04626".to_string()]);
}

#[test]
fn test_select_reports_missing_column() {
    let path = scratch("select.csv");
    std::fs::write(&path, "a,b\n1,2\n").unwrap();

    let table = ColumnTable::open(&path, b',').unwrap();
    assert_eq!(table.len(), 1);
    match table.select(&["a", "c"]) {
        Err(RecordsError::MissingColumn(c)) => assert_eq!(c, "c"),
        other => panic!("expected MissingColumn, got {other:?}"),
    }
}

#[test]
fn test_target_map_file_round_trip() {
    let path = scratch("uniprot_to_chembl.bin");
    let mut map = TargetMap::new();
    map.insert("P00533", "CHEMBL203");
    map.insert("P04626", "CHEMBL1824");
    map.save(&path).unwrap();

    let loaded = TargetMap::load(&path).unwrap();
    assert_eq!(loaded, map);
    assert_eq!(loaded.get("P04626"), Some("CHEMBL1824"));
}

#[test]
fn test_target_map_load_missing_file_is_io_error() {
    let path = scratch("does_not_exist.bin");
    assert!(matches!(TargetMap::load(&path), Err(RecordsError::Io(_))));
}
