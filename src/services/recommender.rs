use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

use crate::core::{CodecError, UnknownCategory};
use crate::models::{PackingRecord, RawPackingRecord, TripProfile};
use crate::services::artifacts::ActiveModel;
use crate::services::error::StoreError;
use crate::services::feedback::FeedbackStore;

/// Errors surfaced to inference and feedback callers
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No trained model is active yet")]
    NoActiveModel,

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A recommendation and the cycle whose artifacts produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    pub items: BTreeSet<String>,
    pub cycle_id: String,
    /// Categories that were encoded as all-zero blocks
    pub unknown: Vec<UnknownCategory>,
}

/// Inference and feedback entry points used by the HTTP layer
pub struct Recommender {
    active: Arc<ActiveModel>,
    feedback: Arc<FeedbackStore>,
}

impl Recommender {
    pub fn new(active: Arc<ActiveModel>, feedback: Arc<FeedbackStore>) -> Self {
        Self { active, feedback }
    }

    pub fn feedback(&self) -> &Arc<FeedbackStore> {
        &self.feedback
    }

    pub fn active(&self) -> &Arc<ActiveModel> {
        &self.active
    }

    /// Recommend a packing list for a trip
    ///
    /// The whole request runs against one snapshot of the active pair.
    pub fn predict(&self, travel_type: &str, climate: &str, duration: i64) -> Result<Prediction, RecommendError> {
        let profile = validate_profile(travel_type, climate, duration)?;
        let artifacts = self.active.get().ok_or(RecommendError::NoActiveModel)?;

        let unknown = artifacts.pair.features.unknown_categories(&profile);
        let items = artifacts.pair.recommend(&profile)?;

        tracing::debug!(
            "Predicted {} items for {}/{}/{} with cycle {}",
            items.len(),
            profile.travel_type,
            profile.climate,
            profile.duration,
            artifacts.cycle_id()
        );

        Ok(Prediction {
            items,
            cycle_id: artifacts.cycle_id().to_string(),
            unknown,
        })
    }

    /// Queue a user's chosen items for the next training cycle
    pub fn submit_feedback<I, S>(
        &self,
        travel_type: &str,
        climate: &str,
        duration: i64,
        items: I,
    ) -> Result<PackingRecord, RecommendError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let raw = RawPackingRecord {
            travel_type: Some(travel_type.to_string()),
            climate: Some(climate.to_string()),
            duration: Some(duration),
            items: Some(items.into_iter().map(Into::into).collect()),
        };
        let record = raw
            .into_record(0)
            .map_err(|e| RecommendError::InvalidInput(format!("field '{}' is missing or invalid", e.field)))?;

        self.feedback.append(&record)?;
        Ok(record)
    }
}

fn validate_profile(travel_type: &str, climate: &str, duration: i64) -> Result<TripProfile, RecommendError> {
    let travel_type = travel_type.trim();
    if travel_type.is_empty() {
        return Err(RecommendError::InvalidInput("travel_type must not be empty".to_string()));
    }
    let climate = climate.trim();
    if climate.is_empty() {
        return Err(RecommendError::InvalidInput("climate must not be empty".to_string()));
    }
    let duration = u32::try_from(duration)
        .ok()
        .filter(|d| *d > 0)
        .ok_or_else(|| RecommendError::InvalidInput(format!("duration must be a positive number of days, got {}", duration)))?;

    Ok(TripProfile::new(travel_type, climate, duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_profile() {
        assert!(validate_profile("beach", "hot", 7).is_ok());
        assert!(matches!(validate_profile(" ", "hot", 7), Err(RecommendError::InvalidInput(_))));
        assert!(matches!(validate_profile("beach", "", 7), Err(RecommendError::InvalidInput(_))));
        assert!(matches!(validate_profile("beach", "hot", 0), Err(RecommendError::InvalidInput(_))));
        assert!(matches!(validate_profile("beach", "hot", -3), Err(RecommendError::InvalidInput(_))));
    }

    #[test]
    fn test_predict_without_model() {
        let recommender = Recommender::new(
            Arc::new(ActiveModel::new()),
            Arc::new(FeedbackStore::new("unused.jsonl")),
        );

        assert!(matches!(
            recommender.predict("beach", "hot", 7),
            Err(RecommendError::NoActiveModel)
        ));
    }
}
