//! Persistence router backends.
//!
//! Records are written as CSV sheets whose header matches
//! [`column_names`](crate::models::record::column_names) column for column.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::PersistError;
use crate::models::config::StorageConfig;
use crate::models::record::{FIELD_COUNT, InvoiceRecord, column_names};

pub type Result<T> = std::result::Result<T, PersistError>;

/// What a successful save produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedArtifact {
    /// File that was written.
    pub path: PathBuf,
    /// The record as saved.
    pub record: InvoiceRecord,
    /// Data rows in the file after the write.
    pub rows: usize,
}

/// Destination for saved records.
pub trait RecordSink: Send + Sync {
    /// Write one record to its own sheet, replacing any previous file of that name.
    fn write_single(&self, record: &InvoiceRecord) -> Result<SavedArtifact>;

    /// Append one record to the master sheet, creating it if needed.
    fn write_accumulate(&self, record: &InvoiceRecord) -> Result<SavedArtifact>;
}

/// CSV-backed [`RecordSink`].
///
/// The master sheet is read, extended and rewritten without any locking;
/// concurrent accumulating writers can lose rows.
#[derive(Debug, Clone)]
pub struct CsvStore {
    output_dir: PathBuf,
    master_file: String,
    placeholder_name: String,
}

impl CsvStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            master_file: config.master_file.clone(),
            placeholder_name: config.placeholder_name.clone(),
        }
    }

    /// Path write_single uses for `record`.
    pub fn single_path(&self, record: &InvoiceRecord) -> PathBuf {
        let stem = record
            .invoice_number
            .as_deref()
            .map(sanitize_file_stem)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.placeholder_name.clone());
        self.output_dir.join(format!("invoice_{stem}.csv"))
    }

    pub fn master_path(&self) -> PathBuf {
        self.output_dir.join(&self.master_file)
    }

    fn read_rows(path: &Path) -> Result<Vec<csv::StringRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;

        let header = reader.headers()?.clone();
        let expected = column_names();
        if header.len() != FIELD_COUNT || header.iter().zip(expected.iter()).any(|(a, b)| a != *b)
        {
            return Err(PersistError::Corrupt {
                path: path.to_path_buf(),
                reason: "header does not match the invoice columns".to_string(),
            });
        }

        reader
            .records()
            .map(|row| {
                row.map_err(|e| PersistError::Corrupt {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    fn write_rows<I>(path: &Path, rows: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: IntoIterator,
        <I::Item as IntoIterator>::Item: AsRef<[u8]>,
    {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(column_names())?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl RecordSink for CsvStore {
    fn write_single(&self, record: &InvoiceRecord) -> Result<SavedArtifact> {
        let path = self.single_path(record);
        Self::write_rows(&path, [record.to_row()])?;

        info!("Saved invoice to {}", path.display());
        Ok(SavedArtifact {
            path,
            record: record.clone(),
            rows: 1,
        })
    }

    fn write_accumulate(&self, record: &InvoiceRecord) -> Result<SavedArtifact> {
        let path = self.master_path();

        let mut rows: Vec<Vec<String>> = if path.exists() {
            Self::read_rows(&path)?
                .iter()
                .map(|r| r.iter().map(str::to_string).collect())
                .collect()
        } else {
            debug!("Creating master sheet {}", path.display());
            Vec::new()
        };
        rows.push(record.to_row());

        let count = rows.len();
        Self::write_rows(&path, &rows)?;

        info!("Appended invoice to {} ({} rows)", path.display(), count);
        Ok(SavedArtifact {
            path,
            record: record.clone(),
            rows: count,
        })
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_file_stem(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn store(dir: &Path) -> CsvStore {
        CsvStore::new(&StorageConfig {
            output_dir: dir.join("out"),
            ..Default::default()
        })
    }

    fn record(number: &str) -> InvoiceRecord {
        InvoiceRecord {
            invoice_number: Some(number.to_string()),
            issuer_name: Some("Mercado Exemplo, LTDA".to_string()),
            total_value: Some(Decimal::new(13895, 2)),
            ..Default::default()
        }
    }

    fn read_back(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        assert_eq!(
            reader.headers().unwrap().iter().collect::<Vec<_>>(),
            column_names().to_vec()
        );
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("001/2025 A"), "001_2025_A");
        assert_eq!(sanitize_file_stem("abc-12_3"), "abc-12_3");
        assert_eq!(sanitize_file_stem("  "), "");
    }

    #[test]
    fn test_single_uses_invoice_number() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let saved = store.write_single(&record("1254")).unwrap();
        assert_eq!(saved.path, dir.path().join("out/invoice_1254.csv"));
        assert_eq!(saved.rows, 1);

        let rows = read_back(&saved.path);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "1254");
        assert_eq!(rows[0][4], "Mercado Exemplo, LTDA");
        assert_eq!(rows[0][11], "138.95");
    }

    #[test]
    fn test_single_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let first = store.write_single(&record("77/A")).unwrap();
        let mut second_record = record("77/A");
        second_record.issuer_name = Some("Outro".to_string());
        let second = store.write_single(&second_record).unwrap();

        assert_eq!(first.path, second.path);
        assert_eq!(first.path.file_name().unwrap(), "invoice_77_A.csv");
        let rows = read_back(&second.path);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][4], "Outro");
    }

    #[test]
    fn test_all_null_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let empty = InvoiceRecord::default();

        let single = store.write_single(&empty).unwrap();
        assert_eq!(single.path.file_name().unwrap(), "invoice_unnumbered.csv");

        let acc = store.write_accumulate(&empty).unwrap();
        let rows = read_back(&acc.path);
        assert_eq!(rows, vec![vec![String::new(); FIELD_COUNT]]);
    }

    #[test]
    fn test_accumulate_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        for (i, number) in ["10", "11", "12"].iter().enumerate() {
            let saved = store.write_accumulate(&record(number)).unwrap();
            assert_eq!(saved.rows, i + 1);
            assert_eq!(saved.path, dir.path().join("out/invoices_master.csv"));
        }

        let numbers: Vec<String> = read_back(&store.master_path())
            .into_iter()
            .map(|row| row[1].clone())
            .collect();
        assert_eq!(numbers, vec!["10", "11", "12"]);
    }

    #[test]
    fn test_accumulate_rejects_foreign_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::write(store.master_path(), "a,b\n1,2\n").unwrap();

        let result = store.write_accumulate(&record("1"));
        assert!(matches!(result, Err(PersistError::Corrupt { .. })));
    }
}
