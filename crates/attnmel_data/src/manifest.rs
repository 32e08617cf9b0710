//! Dataset manifests.
//!
//! A manifest is a headerless CSV with one `image_path,meta,label` row per
//! sample. Relative image paths are resolved against the manifest's
//! directory. The same file serves as the ground truth for metrics.

use std::path::{Path, PathBuf};

use crate::error::{DataError, Result};
use crate::io::read_records;

/// Column holding the integer class label.
pub const LABEL_COLUMN: usize = 2;

/// One manifest row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Resolved image path.
    pub image_path: PathBuf,
    /// Free-form metadata column, kept verbatim.
    pub meta: String,
    /// Class label.
    pub label: usize,
}

/// A parsed dataset manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Read a manifest from disk.
    ///
    /// Fields may be quoted, so the metadata column can hold commas. Blank
    /// lines are skipped. Line numbers in errors are 1-based.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::Malformed`] for rows with fewer than three
    /// columns or a non-integer label.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let root = path.parent().unwrap_or_else(|| Path::new(""));

        let mut entries = Vec::new();
        for (line, record) in read_records(path)? {
            if record.len() <= LABEL_COLUMN {
                return Err(DataError::malformed(
                    path,
                    line,
                    format!("expected at least 3 columns, got {}", record.len()),
                ));
            }

            let label = record[LABEL_COLUMN].parse::<usize>().map_err(|_| {
                DataError::malformed(
                    path,
                    line,
                    format!("label '{}' is not a class index", &record[LABEL_COLUMN]),
                )
            })?;

            entries.push(ManifestEntry {
                image_path: root.join(&record[0]),
                meta: record[1].to_string(),
                label,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Build a manifest from entries already in memory.
    #[must_use]
    pub fn from_entries(entries: Vec<ManifestEntry>) -> Self {
        Self {
            path: PathBuf::new(),
            entries,
        }
    }

    /// Path the manifest was read from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in file order.
    #[must_use]
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Get an entry.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::IndexOutOfBounds`] for an invalid index.
    pub fn get(&self, index: usize) -> Result<&ManifestEntry> {
        self.entries.get(index).ok_or(DataError::IndexOutOfBounds {
            index,
            length: self.entries.len(),
        })
    }

    /// Labels in file order.
    #[must_use]
    pub fn labels(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.label).collect()
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the manifest is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of samples per class, indexed by label.
    #[must_use]
    pub fn class_counts(&self) -> Vec<usize> {
        let n_classes = self.entries.iter().map(|e| e.label + 1).max().unwrap_or(0);
        let mut counts = vec![0; n_classes];
        for entry in &self.entries {
            counts[entry.label] += 1;
        }
        counts
    }
}
