use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::error::{CodecError, TrainingError};
use crate::core::feature_codec::FeatureCodec;
use crate::core::forest::{ForestOptions, RandomForest};
use crate::core::label_codec::LabelCodec;
use crate::models::{PackingRecord, RawPackingRecord, TripProfile};

/// The fitted codecs and classifier of one training cycle
///
/// The three parts are only meaningful together and are always persisted
/// and loaded as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifactPair {
    pub features: FeatureCodec,
    pub labels: LabelCodec,
    pub model: RandomForest,
}

impl ModelArtifactPair {
    /// Check that model and codecs agree on vector widths and that the
    /// model's trees are well formed
    pub fn validate(&self) -> Result<(), CodecError> {
        self.model.check_structure()?;
        if self.model.n_labels() != self.labels.width() {
            return Err(CodecError::WidthMismatch {
                expected: self.model.n_labels(),
                actual: self.labels.width(),
            });
        }
        if self.model.n_features() != self.features.width() {
            return Err(CodecError::WidthMismatch {
                expected: self.model.n_features(),
                actual: self.features.width(),
            });
        }
        Ok(())
    }

    /// Encode, predict and decode a single trip profile
    ///
    /// An empty set is a valid answer meaning nothing cleared the threshold.
    pub fn recommend(&self, profile: &TripProfile) -> Result<BTreeSet<String>, CodecError> {
        let row = self.features.encode(profile);
        let indicator = self.model.predict(&row)?;
        self.labels.inverse_transform(&indicator)
    }
}

/// Orchestrates codec fitting and model training
#[derive(Debug, Clone, Default)]
pub struct TrainingPipeline {
    options: ForestOptions,
}

impl TrainingPipeline {
    pub fn new(options: ForestOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ForestOptions {
        &self.options
    }

    /// Train a matched artifact pair on canonical records
    ///
    /// # Pipeline Stages
    /// 1. Validate every record
    /// 2. Fit the feature codec on the category columns
    /// 3. Fit the label codec on the item sets
    /// 4. Encode features and labels
    /// 5. Fit the forest on the encoded matrix
    pub fn train(&self, records: &[PackingRecord]) -> Result<ModelArtifactPair, TrainingError> {
        if records.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }
        for (index, record) in records.iter().enumerate() {
            validate_record(index, record)?;
        }

        let features = FeatureCodec::fit(records);
        let labels = LabelCodec::fit(records.iter().map(|r| &r.items));

        let x: Vec<Vec<f64>> = records.iter().map(|r| features.encode(&r.profile)).collect();
        let y = records
            .iter()
            .map(|r| labels.transform(&r.items))
            .collect::<Result<Vec<_>, _>>()?;

        let model = RandomForest::fit(&x, &y, &self.options)?;

        tracing::info!(
            "Trained on {} records: {} feature columns, {} labels",
            records.len(),
            features.width(),
            labels.width()
        );

        let pair = ModelArtifactPair {
            features,
            labels,
            model,
        };
        pair.validate()?;
        Ok(pair)
    }

    /// Validate raw records and train on them, failing on the first malformed one
    pub fn train_raw(&self, raw: Vec<RawPackingRecord>) -> Result<ModelArtifactPair, TrainingError> {
        let records = ingest(raw)?;
        self.train(&records)
    }
}

/// Convert raw records into canonical ones without dropping any
pub fn ingest(raw: Vec<RawPackingRecord>) -> Result<Vec<PackingRecord>, TrainingError> {
    raw.into_iter()
        .enumerate()
        .map(|(index, r)| r.into_record(index).map_err(TrainingError::from))
        .collect()
}

fn validate_record(index: usize, record: &PackingRecord) -> Result<(), TrainingError> {
    let malformed = |field: &str| TrainingError::MalformedRecord {
        index,
        field: field.to_string(),
    };

    if record.profile.travel_type.trim().is_empty() {
        return Err(malformed("travel_type"));
    }
    if record.profile.climate.trim().is_empty() {
        return Err(malformed("climate"));
    }
    if record.profile.duration == 0 {
        return Err(malformed("duration"));
    }
    if record.items.is_empty() || record.items.iter().any(|i| i.trim().is_empty()) {
        return Err(malformed("items"));
    }
    Ok(())
}
