use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::{PackingRecord, RawPackingRecord};
use crate::services::error::StoreError;

/// The original training dataset: a JSON array of packing records
#[derive(Debug, Clone)]
pub struct DatasetSource {
    path: PathBuf,
}

impl DatasetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load raw records; a missing file is an empty dataset
    ///
    /// Records are returned unvalidated so the training pipeline can report
    /// exactly which one is malformed.
    pub fn load(&self) -> Result<Vec<RawPackingRecord>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("Dataset {} not found, using empty dataset", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptDataset {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Write records in the canonical schema, replacing the file
    pub fn write(&self, records: &[PackingRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
