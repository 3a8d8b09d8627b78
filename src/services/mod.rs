// Service exports
pub mod artifacts;
pub mod dataset;
pub mod error;
pub mod feedback;
pub mod recommender;
pub mod retrainer;

pub use artifacts::{ActiveArtifacts, ActiveModel, ArtifactStore, CycleManifest};
pub use dataset::DatasetSource;
pub use error::StoreError;
pub use feedback::{BackupSet, FeedbackStore};
pub use recommender::{Prediction, RecommendError, Recommender};
pub use retrainer::{BootstrapOptions, CycleError, CycleOutcome, RetrainState, Retrainer};
