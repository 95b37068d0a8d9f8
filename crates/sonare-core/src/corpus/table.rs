//! Feature table persisted as CSV
//!
//! Layout: `filename`, the numeric fields in schema order, `genre`. Floats are
//! written with Rust's shortest round-trip formatting, so a value read back
//! is bit-identical to the one written.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use ndarray::Array2;

use super::CorpusError;
use crate::features::{FeatureVector, FEATURE_FIELDS, IDENTITY_FIELD, LABEL_FIELD};

/// One labeled row of the table
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// Identity string (file name)
    pub source: String,
    /// Numeric cells aligned with [`FeatureTable::columns`]
    pub values: Vec<f64>,
    /// Genre label
    pub label: String,
}

impl TableRow {
    pub fn from_vector(vector: FeatureVector, source: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            values: vector.values,
            label: label.into(),
        }
    }
}

/// In-memory feature table: numeric column names plus rows
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    /// Numeric column names in file order (identity and label excluded)
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl Default for FeatureTable {
    fn default() -> Self {
        Self {
            columns: FEATURE_FIELDS.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

impl FeatureTable {
    /// Empty table with the extractor's schema
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Label of every row, in row order
    pub fn labels(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.label.as_str()).collect()
    }

    /// Numeric cells as a `rows x columns` matrix
    pub fn matrix(&self) -> Array2<f64> {
        let n_cols = self.columns.len();
        Array2::from_shape_fn((self.rows.len(), n_cols), |(i, j)| self.rows[i].values[j])
    }

    /// Full header line: identity, numeric columns, label
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(IDENTITY_FIELD)
            .chain(self.columns.iter().map(|s| s.as_str()))
            .chain(std::iter::once(LABEL_FIELD))
            .collect()
    }

    /// Load a table from CSV.
    ///
    /// The header must contain the identity and label columns, and the
    /// remaining columns must be exactly [`FEATURE_FIELDS`] in schema order.
    /// Cells that do not parse as finite numbers are rejected with their line
    /// number.
    pub fn read(path: &Path) -> Result<Self, CorpusError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|e| CorpusError::csv(path, e))?;

        let headers = reader.headers().map_err(|e| CorpusError::csv(path, e))?.clone();
        let find = |name: &str| headers.iter().position(|h| h == name);

        let identity_idx = find(IDENTITY_FIELD).ok_or_else(|| CorpusError::TableHeaderMismatch {
            path: path.to_path_buf(),
            reason: format!("missing '{}' column", IDENTITY_FIELD),
        })?;
        let label_idx = find(LABEL_FIELD).ok_or_else(|| CorpusError::TableHeaderMismatch {
            path: path.to_path_buf(),
            reason: format!("missing '{}' column", LABEL_FIELD),
        })?;

        let numeric: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != identity_idx && *i != label_idx)
            .map(|(i, name)| (i, name.to_string()))
            .collect();

        let names = numeric.iter().map(|(_, name)| name.as_str());
        if !names.clone().eq(FEATURE_FIELDS.iter().copied()) {
            let missing: Vec<&str> = FEATURE_FIELDS
                .iter()
                .copied()
                .filter(|f| !names.clone().any(|n| n == *f))
                .collect();
            let reason = if missing.is_empty() {
                "numeric columns differ from the extractor schema in order or extras".to_string()
            } else {
                format!("missing columns {:?}", missing)
            };
            return Err(CorpusError::TableHeaderMismatch {
                path: path.to_path_buf(),
                reason,
            });
        }

        let mut rows = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            // Line 1 is the header
            let line = row_idx + 2;
            let record = record.map_err(|e| CorpusError::csv(path, e))?;

            let mut values = Vec::with_capacity(numeric.len());
            for (col, name) in &numeric {
                let cell = record.get(*col).unwrap_or("");
                let value: f64 = cell.trim().parse().map_err(|_| CorpusError::MalformedRow {
                    path: path.to_path_buf(),
                    line,
                    reason: format!("'{}' is not a number in column {}", cell, name),
                })?;
                if !value.is_finite() {
                    return Err(CorpusError::MalformedRow {
                        path: path.to_path_buf(),
                        line,
                        reason: format!("non-finite value in column {}", name),
                    });
                }
                values.push(value);
            }

            rows.push(TableRow {
                source: record.get(identity_idx).unwrap_or("").to_string(),
                values,
                label: record.get(label_idx).unwrap_or("").to_string(),
            });
        }

        log::debug!("FeatureTable::read: {} rows from {:?}", rows.len(), path);

        Ok(Self {
            columns: numeric.into_iter().map(|(_, name)| name).collect(),
            rows,
        })
    }

    /// Write the whole table (header plus rows), replacing any existing file
    pub fn write(&self, path: &Path) -> Result<(), CorpusError> {
        let file = File::create(path).map_err(|e| CorpusError::io(path, e))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .write_record(self.header())
            .map_err(|e| CorpusError::csv(path, e))?;
        for row in &self.rows {
            write_row(&mut writer, row).map_err(|e| CorpusError::csv(path, e))?;
        }
        writer.flush().map_err(|e| CorpusError::io(path, e))?;
        Ok(())
    }
}

fn write_row<W: std::io::Write>(writer: &mut csv::Writer<W>, row: &TableRow) -> csv::Result<()> {
    let mut record = Vec::with_capacity(row.values.len() + 2);
    record.push(row.source.clone());
    record.extend(row.values.iter().map(|v| v.to_string()));
    record.push(row.label.clone());
    writer.write_record(&record)
}

/// Append-only writer used while building a corpus.
///
/// Rows are buffered by the CSV writer until [`commit`](Self::commit), which
/// flushes, fsyncs, and reports the durable byte length of the file.
pub(crate) struct TableAppender {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl TableAppender {
    /// Start a new table containing only the schema header
    pub(crate) fn create(path: &Path) -> Result<Self, CorpusError> {
        let file = File::create(path).map_err(|e| CorpusError::io(path, e))?;
        let mut appender = Self {
            path: path.to_path_buf(),
            writer: csv::WriterBuilder::new().has_headers(false).from_writer(file),
        };
        appender
            .writer
            .write_record(FeatureTable::new().header())
            .map_err(|e| CorpusError::csv(path, e))?;
        appender.commit()?;
        Ok(appender)
    }

    /// Reopen an existing table, discarding anything past `committed_len`
    pub(crate) fn reopen(path: &Path, committed_len: u64) -> Result<Self, CorpusError> {
        {
            let file = OpenOptions::new()
                .write(true)
                .open(path)
                .map_err(|e| CorpusError::io(path, e))?;
            file.set_len(committed_len)
                .map_err(|e| CorpusError::io(path, e))?;
            file.sync_all().map_err(|e| CorpusError::io(path, e))?;
        }
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| CorpusError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: csv::WriterBuilder::new().has_headers(false).from_writer(file),
        })
    }

    pub(crate) fn append(&mut self, rows: &[TableRow]) -> Result<(), CorpusError> {
        for row in rows {
            write_row(&mut self.writer, row).map_err(|e| CorpusError::csv(&self.path, e))?;
        }
        Ok(())
    }

    /// Make everything appended so far durable; returns the file length
    pub(crate) fn commit(&mut self) -> Result<u64, CorpusError> {
        self.writer
            .flush()
            .map_err(|e| CorpusError::io(&self.path, e))?;
        let file = self.writer.get_ref();
        file.sync_all().map_err(|e| CorpusError::io(&self.path, e))?;
        let len = file
            .metadata()
            .map_err(|e| CorpusError::io(&self.path, e))?
            .len();
        Ok(len)
    }
}

/// Read just the header line of a table, if the file has one
pub(crate) fn read_header(path: &Path) -> Result<Vec<String>, CorpusError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| CorpusError::csv(path, e))?;
    match reader.records().next() {
        Some(record) => {
            let record = record.map_err(|e| CorpusError::csv(path, e))?;
            Ok(record.iter().map(|s| s.to_string()).collect())
        }
        None => Ok(Vec::new()),
    }
}

/// True when the file holds the schema header and no rows
pub(crate) fn is_header_only(path: &Path) -> Result<bool, CorpusError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| CorpusError::csv(path, e))?;
    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record.map_err(|e| CorpusError::csv(path, e))?,
        None => return Ok(false),
    };
    if !header.iter().eq(FeatureTable::new().header()) {
        return Ok(false);
    }
    Ok(records.next().is_none())
}
