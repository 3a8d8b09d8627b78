use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::core::ModelArtifactPair;
use crate::services::error::StoreError;

const CURRENT_FILE: &str = "CURRENT";
const MODEL_FILE: &str = "model.json";
const LABELS_FILE: &str = "labels.json";
const FEATURES_FILE: &str = "features.json";
const MANIFEST_FILE: &str = "manifest.json";
const CYCLE_PREFIX: &str = "cycle-";

/// Metadata written next to each cycle's artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleManifest {
    pub cycle_id: String,
    pub created_at: DateTime<Utc>,
    pub records: usize,
    pub feedback_records: usize,
    pub label_width: usize,
    pub feature_width: usize,
}

/// A persisted artifact pair together with the cycle that produced it
#[derive(Debug, Clone)]
pub struct ActiveArtifacts {
    pub manifest: CycleManifest,
    pub pair: ModelArtifactPair,
}

impl ActiveArtifacts {
    pub fn cycle_id(&self) -> &str {
        &self.manifest.cycle_id
    }
}

/// Build a fresh cycle identifier; identifiers sort chronologically
pub fn new_cycle_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}{}-{}",
        CYCLE_PREFIX,
        Utc::now().format("%Y%m%dT%H%M%S%6f"),
        &suffix[..8]
    )
}

/// Durable storage for artifact pairs
///
/// Layout:
/// ```text
/// <root>/CURRENT                  name of the active cycle directory
/// <root>/cycle-<ts>-<id>/model.json
/// <root>/cycle-<ts>-<id>/labels.json
/// <root>/cycle-<ts>-<id>/features.json
/// <root>/cycle-<ts>-<id>/manifest.json
/// ```
/// A cycle directory is staged under a temporary name and renamed into
/// place once complete. `CURRENT` is then replaced by rename, so a reader
/// resolves either the old cycle or the new one.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a new cycle and make it the active one
    pub fn persist(
        &self,
        pair: &ModelArtifactPair,
        records: usize,
        feedback_records: usize,
    ) -> Result<ActiveArtifacts, StoreError> {
        let manifest = CycleManifest {
            cycle_id: new_cycle_id(),
            created_at: Utc::now(),
            records,
            feedback_records,
            label_width: pair.labels.width(),
            feature_width: pair.features.width(),
        };

        self.write_cycle(&manifest, pair).map_err(|e| {
            StoreError::Persistence(format!("failed writing cycle {}: {}", manifest.cycle_id, e))
        })?;
        self.set_current(&manifest.cycle_id).map_err(|e| {
            StoreError::Persistence(format!("failed activating cycle {}: {}", manifest.cycle_id, e))
        })?;

        tracing::info!("Persisted artifact pair {}", manifest.cycle_id);

        Ok(ActiveArtifacts {
            manifest,
            pair: pair.clone(),
        })
    }

    fn write_cycle(&self, manifest: &CycleManifest, pair: &ModelArtifactPair) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        let staging = self.root.join(format!(".{}.tmp", manifest.cycle_id));
        fs::create_dir(&staging)?;

        let result = (|| -> io::Result<()> {
            write_json(&staging.join(MODEL_FILE), &pair.model)?;
            write_json(&staging.join(LABELS_FILE), &pair.labels)?;
            write_json(&staging.join(FEATURES_FILE), &pair.features)?;
            write_json(&staging.join(MANIFEST_FILE), manifest)?;
            fs::rename(&staging, self.root.join(&manifest.cycle_id))
        })();

        if result.is_err() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                tracing::warn!("Failed to clean staging dir {}: {}", staging.display(), e);
            }
        }
        result
    }

    fn set_current(&self, cycle_id: &str) -> io::Result<()> {
        let tmp = self.root.join(format!("{}.tmp", CURRENT_FILE));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(cycle_id.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.root.join(CURRENT_FILE))
    }

    /// Name of the active cycle, if any cycle has been activated
    pub fn current_cycle_id(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.root.join(CURRENT_FILE)) {
            Ok(id) => {
                let id = id.trim().to_string();
                Ok(if id.is_empty() { None } else { Some(id) })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the active pair; `None` before the first completed cycle
    pub fn load_active(&self) -> Result<Option<ActiveArtifacts>, StoreError> {
        match self.current_cycle_id()? {
            Some(cycle_id) => self.load_cycle(&cycle_id).map(Some),
            None => Ok(None),
        }
    }

    /// Load one cycle's artifacts as a unit and check they belong together
    pub fn load_cycle(&self, cycle_id: &str) -> Result<ActiveArtifacts, StoreError> {
        let dir = self.root.join(cycle_id);
        let manifest: CycleManifest = read_json(&dir.join(MANIFEST_FILE))?;
        if manifest.cycle_id != cycle_id {
            return Err(StoreError::Persistence(format!(
                "manifest in {} names cycle {}",
                cycle_id, manifest.cycle_id
            )));
        }

        let pair = ModelArtifactPair {
            model: read_json(&dir.join(MODEL_FILE))?,
            labels: read_json(&dir.join(LABELS_FILE))?,
            features: read_json(&dir.join(FEATURES_FILE))?,
        };
        pair.validate()?;

        Ok(ActiveArtifacts { manifest, pair })
    }

    /// All completed cycle directories, oldest first
    pub fn list_cycles(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut cycles = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(CYCLE_PREFIX) && entry.file_type()?.is_dir() {
                cycles.push(name);
            }
        }
        cycles.sort();
        Ok(cycles)
    }

    /// Remove old cycles, keeping the newest `keep` plus the active one
    pub fn prune(&self, keep: usize) -> Result<usize, StoreError> {
        let current = self.current_cycle_id()?;
        let cycles = self.list_cycles()?;
        let cutoff = cycles.len().saturating_sub(keep);

        let mut removed = 0;
        for cycle in &cycles[..cutoff] {
            if current.as_deref() == Some(cycle.as_str()) {
                continue;
            }
            fs::remove_dir_all(self.root.join(cycle))?;
            removed += 1;
        }

        if removed > 0 {
            tracing::debug!("Pruned {} old artifact cycles", removed);
        }
        Ok(removed)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    file.sync_all()
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// The artifact pair currently used for serving
///
/// Readers take a cheap `Arc` clone and keep using it for the whole
/// request, so a concurrent swap never splits a pair.
#[derive(Debug, Default)]
pub struct ActiveModel {
    current: RwLock<Option<Arc<ActiveArtifacts>>>,
}

impl ActiveModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<ActiveArtifacts>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the active pair wholesale, returning the previous one
    pub fn swap(&self, next: ActiveArtifacts) -> Option<Arc<ActiveArtifacts>> {
        let next = Arc::new(next);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.replace(next)
    }

    pub fn cycle_id(&self) -> Option<String> {
        self.get().map(|a| a.cycle_id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ForestOptions, TrainingPipeline};
    use crate::models::{PackingRecord, TripProfile};
    use tempfile::TempDir;

    fn train(records: &[PackingRecord]) -> ModelArtifactPair {
        TrainingPipeline::new(ForestOptions {
            n_estimators: 5,
            ..ForestOptions::default()
        })
        .train(records)
        .unwrap()
    }

    fn corpus() -> Vec<PackingRecord> {
        vec![
            PackingRecord::new(TripProfile::new("beach", "hot", 7), ["sunscreen", "towel"]),
            PackingRecord::new(TripProfile::new("city", "cold", 3), ["coat", "map"]),
        ]
    }

    #[test]
    fn test_cycle_ids_sort_chronologically() {
        let a = new_cycle_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_cycle_id();

        assert!(a.starts_with(CYCLE_PREFIX));
        assert!(a < b);
    }

    #[test]
    fn test_persist_then_load_active() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(store.load_active().unwrap().is_none());

        let pair = train(&corpus());
        let persisted = store.persist(&pair, 2, 0).unwrap();
        let loaded = store.load_active().unwrap().unwrap();

        assert_eq!(loaded.cycle_id(), persisted.cycle_id());
        assert_eq!(loaded.pair, pair);
        assert_eq!(loaded.manifest.label_width, 4);
        assert_eq!(store.list_cycles().unwrap(), vec![persisted.cycle_id().to_string()]);
    }

    #[test]
    fn test_new_cycle_replaces_current() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let first = store.persist(&train(&corpus()), 2, 0).unwrap();
        let mut records = corpus();
        records.push(PackingRecord::new(TripProfile::new("business", "temperate", 2), ["laptop"]));
        let second = store.persist(&train(&records), 3, 1).unwrap();

        assert_ne!(first.cycle_id(), second.cycle_id());
        assert_eq!(store.current_cycle_id().unwrap().as_deref(), Some(second.cycle_id()));
        // The previous cycle is still intact on disk
        assert_eq!(store.load_cycle(first.cycle_id()).unwrap().pair.labels.width(), 4);
    }

    #[test]
    fn test_mismatched_files_fail_to_load() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let first = store.persist(&train(&corpus()), 2, 0).unwrap();
        let mut records = corpus();
        records.push(PackingRecord::new(TripProfile::new("business", "temperate", 2), ["laptop"]));
        let second = store.persist(&train(&records), 3, 0).unwrap();

        // Splice cycle one's label codec into cycle two
        fs::copy(
            dir.path().join(first.cycle_id()).join(LABELS_FILE),
            dir.path().join(second.cycle_id()).join(LABELS_FILE),
        )
        .unwrap();

        assert!(matches!(store.load_active(), Err(StoreError::Inconsistent(_))));
    }

    #[test]
    fn test_persist_failure_leaves_current_untouched() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("artifacts");
        fs::write(&blocker, b"not a directory").unwrap();
        let store = ArtifactStore::new(&blocker);

        let result = store.persist(&train(&corpus()), 2, 0);
        assert!(matches!(result, Err(StoreError::Persistence(_))));
    }

    #[test]
    fn test_prune_keeps_active_cycle() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let pair = train(&corpus());
        for _ in 0..3 {
            store.persist(&pair, 2, 0).unwrap();
        }

        assert_eq!(store.prune(1).unwrap(), 2);
        assert_eq!(store.list_cycles().unwrap().len(), 1);
        assert!(store.load_active().unwrap().is_some());
    }

    #[test]
    fn test_active_model_swap() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let active = ActiveModel::new();
        assert!(active.get().is_none());

        let first = store.persist(&train(&corpus()), 2, 0).unwrap();
        let first_id = first.cycle_id().to_string();
        assert!(active.swap(first).is_none());

        let held = active.get().unwrap();
        let second = store.persist(&train(&corpus()), 2, 0).unwrap();
        let previous = active.swap(second).unwrap();

        // A reader holding the old pair keeps a consistent view
        assert_eq!(held.cycle_id(), first_id);
        assert_eq!(previous.cycle_id(), first_id);
        assert_ne!(active.cycle_id().unwrap(), first_id);
    }
}
