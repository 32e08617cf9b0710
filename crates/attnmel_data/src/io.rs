//! Prediction CSV I/O.
//!
//! Result files hold one headerless row of class probabilities per sample,
//! in evaluation order. All readers go through [`csv`] so quoted fields
//! may contain commas.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim, Writer};

use crate::error::{DataError, Result};
use crate::manifest::LABEL_COLUMN;

/// Streaming writer for result rows.
pub struct ResultWriter {
    path: PathBuf,
    writer: Writer<File>,
    n_rows: usize,
}

impl ResultWriter {
    /// Create (or truncate) a result file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = Writer::from_path(&path).map_err(io::Error::from)?;
        Ok(Self {
            path,
            writer,
            n_rows: 0,
        })
    }

    /// Append rows of `n_classes` probabilities from a flat buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidShape`] when the buffer length is not a
    /// multiple of `n_classes`.
    pub fn write_flat(&mut self, probs: &[f32], n_classes: usize) -> Result<()> {
        if n_classes == 0 || probs.len() % n_classes != 0 {
            return Err(DataError::InvalidShape(format!(
                "{} values cannot be split into rows of {}",
                probs.len(),
                n_classes
            )));
        }
        for row in probs.chunks(n_classes) {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Append one row.
    ///
    /// # Errors
    ///
    /// Fails on write errors.
    pub fn write_row(&mut self, row: &[f32]) -> Result<()> {
        self.writer
            .write_record(row.iter().map(|v| v.to_string()))
            .map_err(io::Error::from)?;
        self.n_rows += 1;
        Ok(())
    }

    /// Number of rows written so far.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Path being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered rows to disk.
    ///
    /// # Errors
    ///
    /// Fails on write errors.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        Ok(self.path)
    }
}

/// Read every non-blank record of a headerless CSV with its 1-based line.
///
/// Rows may have any number of fields; callers check the columns they need.
pub(crate) fn read_records(path: &Path) -> Result<Vec<(usize, StringRecord)>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        if record.len() == 1 && record[0].is_empty() {
            continue;
        }
        let line = record
            .position()
            .map_or(records.len() + 1, |p| p.line() as usize);
        records.push((line, record));
    }
    Ok(records)
}

fn csv_error(path: &Path, err: csv::Error) -> DataError {
    let line = err.position().map_or(0, |p| p.line() as usize);
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(e) => DataError::IoError(e),
        _ => DataError::malformed(path, line, message),
    }
}

/// Read a result file into per-sample probability rows.
///
/// # Errors
///
/// Returns [`DataError::Malformed`] for unparsable values or rows whose
/// column count differs from the first row.
pub fn read_results(path: impl AsRef<Path>) -> Result<Vec<Vec<f32>>> {
    let path = path.as_ref();

    let mut rows: Vec<Vec<f32>> = Vec::new();
    for (line, record) in read_records(path)? {
        let row = record
            .iter()
            .map(|v| {
                v.parse::<f32>()
                    .map_err(|_| DataError::malformed(path, line, format!("'{}' is not a number", v)))
            })
            .collect::<Result<Vec<f32>>>()?;

        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(DataError::malformed(
                    path,
                    line,
                    format!("expected {} columns, got {}", first.len(), row.len()),
                ));
            }
        }
        rows.push(row);
    }

    Ok(rows)
}

/// Read ground-truth labels from the third column of a manifest-style CSV.
///
/// # Errors
///
/// Returns [`DataError::Malformed`] for short rows or non-integer labels.
pub fn read_labels(path: impl AsRef<Path>) -> Result<Vec<usize>> {
    let path = path.as_ref();

    read_records(path)?
        .into_iter()
        .map(|(line, record)| {
            let field = record
                .get(LABEL_COLUMN)
                .ok_or_else(|| DataError::malformed(path, line, "missing label column"))?;
            field.parse::<usize>().map_err(|_| {
                DataError::malformed(path, line, format!("label '{}' is not a class index", field))
            })
        })
        .collect()
}
