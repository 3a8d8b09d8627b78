use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;

use crate::core::{ingest, synthetic, TrainingError, TrainingPipeline};
use crate::services::artifacts::{ActiveModel, ArtifactStore};
use crate::services::dataset::DatasetSource;
use crate::services::error::StoreError;
use crate::services::feedback::{BackupSet, FeedbackStore};

/// Stages of one retraining cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrainState {
    Idle,
    Loading,
    Training,
    Persisting,
    Archiving,
}

impl fmt::Display for RetrainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetrainState::Idle => "idle",
            RetrainState::Loading => "loading",
            RetrainState::Training => "training",
            RetrainState::Persisting => "persisting",
            RetrainState::Archiving => "archiving",
        };
        f.write_str(name)
    }
}

/// Errors that end a retraining cycle early
///
/// None of them are fatal to the loop; the next cycle starts from scratch.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("loading failed: {0}")]
    Load(StoreError),

    #[error("training failed: {0}")]
    Training(#[from] TrainingError),

    #[error("persisting failed: {0}")]
    Persist(StoreError),

    #[error("archiving failed: {0}")]
    Archive(StoreError),
}

/// Result of a cycle that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Trained {
        cycle_id: String,
        records: usize,
        feedback_consumed: usize,
    },
    /// Nothing to train on; artifacts and queue were left alone
    SkippedEmpty,
}

/// How to seed an empty deployment on first start
#[derive(Debug, Clone, Copy)]
pub struct BootstrapOptions {
    pub synthetic_records: usize,
    pub seed: u64,
}

/// Periodically retrains on the original dataset plus queued feedback
pub struct Retrainer {
    pipeline: TrainingPipeline,
    dataset: DatasetSource,
    feedback: Arc<FeedbackStore>,
    store: ArtifactStore,
    backups: BackupSet,
    active: Arc<ActiveModel>,
    keep_cycles: Option<usize>,
    state: Mutex<RetrainState>,
    cycle_lock: Mutex<()>,
    trigger: Notify,
}

impl Retrainer {
    pub fn new(
        pipeline: TrainingPipeline,
        dataset: DatasetSource,
        feedback: Arc<FeedbackStore>,
        store: ArtifactStore,
        backups: BackupSet,
        active: Arc<ActiveModel>,
    ) -> Self {
        Self {
            pipeline,
            dataset,
            feedback,
            store,
            backups,
            active,
            keep_cycles: None,
            state: Mutex::new(RetrainState::Idle),
            cycle_lock: Mutex::new(()),
            trigger: Notify::new(),
        }
    }

    /// Prune old cycle directories after each successful cycle
    pub fn with_keep_cycles(mut self, keep: Option<usize>) -> Self {
        self.keep_cycles = keep;
        self
    }

    pub fn state(&self) -> RetrainState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: RetrainState) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::info!("Retrain state: {} -> {}", *state, next);
        *state = next;
    }

    pub fn active(&self) -> &Arc<ActiveModel> {
        &self.active
    }

    /// Ask the loop to start a cycle without waiting for the next tick
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Run one complete cycle on the calling thread
    ///
    /// Cycles never overlap; a second caller waits for the first to finish.
    pub fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let _cycle = self.cycle_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let started = Instant::now();

        let result = self.run_stages();
        self.set_state(RetrainState::Idle);

        match &result {
            Ok(CycleOutcome::Trained {
                cycle_id,
                records,
                feedback_consumed,
            }) => tracing::info!(
                "Cycle {} complete in {:?}: {} records, {} feedback consumed",
                cycle_id,
                started.elapsed(),
                records,
                feedback_consumed
            ),
            Ok(CycleOutcome::SkippedEmpty) => {
                tracing::info!("No training data available, keeping current artifacts")
            }
            Err(e) => tracing::error!("Retraining cycle failed: {}", e),
        }
        result
    }

    fn run_stages(&self) -> Result<CycleOutcome, CycleError> {
        self.set_state(RetrainState::Loading);
        let raw = self.dataset.load().map_err(CycleError::Load)?;
        let feedback = self.feedback.snapshot().map_err(CycleError::Load)?;
        let mut records = ingest(raw)?;
        let original = records.len();
        records.extend(feedback.iter().cloned());
        tracing::info!(
            "Loaded {} original records and {} feedback records",
            original,
            feedback.len()
        );

        self.set_state(RetrainState::Training);
        let pair = match self.pipeline.train(&records) {
            Ok(pair) => pair,
            Err(TrainingError::EmptyDataset) => return Ok(CycleOutcome::SkippedEmpty),
            Err(e) => return Err(e.into()),
        };

        self.set_state(RetrainState::Persisting);
        let artifacts = self
            .store
            .persist(&pair, records.len(), feedback.len())
            .map_err(CycleError::Persist)?;
        let cycle_id = artifacts.cycle_id().to_string();
        self.active.swap(artifacts);

        self.set_state(RetrainState::Archiving);
        if !feedback.is_empty() {
            let backup = self.backups.write(&feedback).map_err(CycleError::Archive)?;
            // Records left in the queue are archived by the cycle that drains them
            if let Err(e) = self.feedback.drain_consumed(&feedback) {
                if let Err(discard) = self.backups.discard(&backup) {
                    tracing::warn!("Failed to discard backup {}: {}", backup.display(), discard);
                }
                return Err(CycleError::Archive(e));
            }
        }
        if let Some(keep) = self.keep_cycles {
            if let Err(e) = self.store.prune(keep) {
                tracing::warn!("Failed to prune old cycles: {}", e);
            }
        }

        Ok(CycleOutcome::Trained {
            cycle_id,
            records: records.len(),
            feedback_consumed: feedback.len(),
        })
    }

    /// Make sure an artifact pair is active before serving starts
    ///
    /// Order of preference: the pair already in memory, the persisted
    /// active pair, then a fresh cycle. A deployment with no data at all
    /// gets a synthetic dataset first.
    pub fn ensure_active(&self, bootstrap: BootstrapOptions) -> Result<Option<String>, CycleError> {
        if let Some(id) = self.active.cycle_id() {
            return Ok(Some(id));
        }

        match self.store.load_active() {
            Ok(Some(artifacts)) => {
                let id = artifacts.cycle_id().to_string();
                tracing::info!("Loaded active artifact pair {}", id);
                self.active.swap(artifacts);
                return Ok(Some(id));
            }
            Ok(None) => tracing::info!("No persisted artifact pair, training one"),
            Err(e) => tracing::warn!("Persisted artifact pair unusable, retraining: {}", e),
        }

        let feedback_empty = self.feedback.is_empty().map_err(CycleError::Load)?;
        if !self.dataset.exists() && feedback_empty && bootstrap.synthetic_records > 0 {
            let records = synthetic::generate(bootstrap.synthetic_records, bootstrap.seed);
            self.dataset.write(&records).map_err(CycleError::Load)?;
            tracing::info!(
                "Generated synthetic dataset with {} records at {}",
                records.len(),
                self.dataset.path().display()
            );
        }

        match self.run_cycle()? {
            CycleOutcome::Trained { cycle_id, .. } => Ok(Some(cycle_id)),
            CycleOutcome::SkippedEmpty => Ok(None),
        }
    }

    /// Retrain every `interval` or on [`trigger`](Self::trigger) until shutdown
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; startup already trained
        ticker.tick().await;

        tracing::info!("Retraining loop started (interval: {:?})", interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => {
                    tracing::info!("Manual retrain requested");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let this = Arc::clone(&self);
            if let Err(e) = tokio::task::spawn_blocking(move || this.run_cycle()).await {
                tracing::error!("Retraining task aborted: {}", e);
            }
        }

        tracing::info!("Retraining loop stopped");
    }
}
