//! Packing Advisor - packing list recommendations that learn from feedback
//!
//! This library provides the training and inference pipeline behind the
//! packing advisor service. A multi-output random forest maps a trip profile
//! to a set of items, and a retraining loop folds user corrections back into
//! the training set.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{FeatureCodec, ForestOptions, LabelCodec, ModelArtifactPair, RandomForest, TrainingPipeline};
pub use crate::models::{PackingRecord, TripProfile};
pub use crate::services::{ActiveModel, FeedbackStore, Recommender, Retrainer};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let records = vec![PackingRecord::new(TripProfile::new("city", "cold", 3), ["coat"])];
        let codec = FeatureCodec::fit(&records);
        assert_eq!(codec.width(), 3);
    }
}
