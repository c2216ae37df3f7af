//! CSV table I/O

use std::fs::File;
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::{RecordsError, Result, TableRow};

pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| RecordsError::Io(format!("{}: {e}", path.display())))?;

    let mut out = Vec::new();
    for (i, row) in reader.deserialize::<T>().enumerate() {
        // line numbers are 1-based and the header takes line 1
        let row = row.map_err(|e| RecordsError::Csv(format!("{} line {}: {e}", path.display(), i + 2)))?;
        out.push(row);
    }
    Ok(out)
}

/// Writes `rows` with a header line, creating parent directories as needed. An empty table
/// still gets its header.
pub fn write_table<T: Serialize + TableRow>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    if rows.is_empty() {
        writer.write_record(T::COLUMNS)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Non-empty values of one named column. Used for the UniProt `Entry` export (tab separated).
pub fn read_column(path: &Path, column: &str, delimiter: u8) -> Result<Vec<String>> {
    let table = ColumnTable::open(path, delimiter)?;
    let idx = table.position(column)?;

    Ok(table
        .rows
        .iter()
        .filter_map(|r| r.get(idx))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect())
}

/// A CSV file held as raw string records, for selecting columns by header name.
pub struct ColumnTable {
    headers: Vec<String>,
    rows: Vec<csv::StringRecord>,
}

impl ColumnTable {
    pub fn open(path: &Path, delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)
            .map_err(|e| RecordsError::Io(format!("{}: {e}", path.display())))?;

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn position(&self, column: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| RecordsError::MissingColumn(column.to_string()))
    }

    /// Projects every row onto `columns`, in order. Empty or whitespace cells become `None`.
    pub fn select(&self, columns: &[&str]) -> Result<Vec<Vec<Option<String>>>> {
        let idx = columns
            .iter()
            .map(|c| self.position(c))
            .collect::<Result<Vec<_>>>()?;

        Ok(self
            .rows
            .iter()
            .map(|r| {
                idx.iter()
                    .map(|&i| {
                        r.get(i)
                            .map(str::trim)
                            .filter(|v| !v.is_empty())
                            .map(str::to_string)
                    })
                    .collect()
            })
            .collect())
    }
}
