use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::error::CodecError;
use crate::models::{PackingRecord, TripProfile};

/// A category value that was not present when the codec was fit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory {
    pub field: &'static str,
    pub value: String,
}

/// One-hot encoder for the categorical trip fields
///
/// Layout of an encoded row: `[travel_type one-hot | climate one-hot | duration]`.
/// Both vocabularies are sorted so the layout is reproducible from the
/// same training corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureCodec {
    travel_types: Vec<String>,
    climates: Vec<String>,
}

impl FeatureCodec {
    /// Learn both vocabularies from a training corpus
    pub fn fit<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a PackingRecord>,
    {
        let mut travel_types = BTreeSet::new();
        let mut climates = BTreeSet::new();
        for record in records {
            travel_types.insert(record.profile.travel_type.clone());
            climates.insert(record.profile.climate.clone());
        }

        Self {
            travel_types: travel_types.into_iter().collect(),
            climates: climates.into_iter().collect(),
        }
    }

    /// Number of columns in an encoded row
    pub fn width(&self) -> usize {
        self.travel_types.len() + self.climates.len() + 1
    }

    pub fn travel_types(&self) -> &[String] {
        &self.travel_types
    }

    pub fn climates(&self) -> &[String] {
        &self.climates
    }

    /// Encode a profile into a numeric row
    ///
    /// An unseen category leaves its one-hot block all zero. This is logged
    /// but never fails the request.
    pub fn encode(&self, profile: &TripProfile) -> Vec<f64> {
        let mut row = vec![0.0; self.width()];

        match self.travel_types.binary_search(&profile.travel_type) {
            Ok(idx) => row[idx] = 1.0,
            Err(_) => tracing::warn!(
                "Unknown travel_type '{}' at inference, using zero encoding",
                profile.travel_type
            ),
        }

        let offset = self.travel_types.len();
        match self.climates.binary_search(&profile.climate) {
            Ok(idx) => row[offset + idx] = 1.0,
            Err(_) => tracing::warn!(
                "Unknown climate '{}' at inference, using zero encoding",
                profile.climate
            ),
        }

        row[self.width() - 1] = f64::from(profile.duration);
        row
    }

    /// Category values in `profile` that fall outside the fitted vocabularies
    pub fn unknown_categories(&self, profile: &TripProfile) -> Vec<UnknownCategory> {
        let mut unknown = Vec::new();
        if self.travel_types.binary_search(&profile.travel_type).is_err() {
            unknown.push(UnknownCategory {
                field: "travel_type",
                value: profile.travel_type.clone(),
            });
        }
        if self.climates.binary_search(&profile.climate).is_err() {
            unknown.push(UnknownCategory {
                field: "climate",
                value: profile.climate.clone(),
            });
        }
        unknown
    }

    /// Ensure a row produced elsewhere has this codec's layout
    pub fn check_width(&self, row: &[f64]) -> Result<(), CodecError> {
        if row.len() != self.width() {
            return Err(CodecError::WidthMismatch {
                expected: self.width(),
                actual: row.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<PackingRecord> {
        vec![
            PackingRecord::new(TripProfile::new("mountain", "cold", 5), ["boots"]),
            PackingRecord::new(TripProfile::new("beach", "hot", 7), ["sunscreen"]),
            PackingRecord::new(TripProfile::new("beach", "temperate", 2), ["towel"]),
        ]
    }

    #[test]
    fn test_vocabularies_are_sorted() {
        let codec = FeatureCodec::fit(&corpus());

        assert_eq!(codec.travel_types(), ["beach", "mountain"]);
        assert_eq!(codec.climates(), ["cold", "hot", "temperate"]);
        assert_eq!(codec.width(), 6);
    }

    #[test]
    fn test_encode_layout() {
        let codec = FeatureCodec::fit(&corpus());
        let row = codec.encode(&TripProfile::new("mountain", "hot", 9));

        assert_eq!(row, vec![0.0, 1.0, 0.0, 1.0, 0.0, 9.0]);
    }

    #[test]
    fn test_unknown_category_yields_zero_block() {
        let codec = FeatureCodec::fit(&corpus());
        let profile = TripProfile::new("beach", "arid", 4);
        let row = codec.encode(&profile);

        assert_eq!(row, vec![1.0, 0.0, 0.0, 0.0, 0.0, 4.0]);
        assert_eq!(
            codec.unknown_categories(&profile),
            vec![UnknownCategory {
                field: "climate",
                value: "arid".to_string()
            }]
        );
    }

    #[test]
    fn test_check_width() {
        let codec = FeatureCodec::fit(&corpus());

        assert!(codec.check_width(&[0.0; 6]).is_ok());
        assert_eq!(
            codec.check_width(&[0.0; 4]),
            Err(CodecError::WidthMismatch { expected: 6, actual: 4 })
        );
    }
}
