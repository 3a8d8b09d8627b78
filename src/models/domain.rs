use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// A record that failed validation at the ingestion boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record {index} is malformed: {field}")]
pub struct MalformedRecord {
    pub index: usize,
    pub field: String,
}

/// The (travel type, climate, duration) tuple describing a trip
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripProfile {
    pub travel_type: String,
    pub climate: String,
    /// Trip length in days
    pub duration: u32,
}

impl TripProfile {
    pub fn new(travel_type: impl Into<String>, climate: impl Into<String>, duration: u32) -> Self {
        Self {
            travel_type: travel_type.into(),
            climate: climate.into(),
            duration,
        }
    }
}

/// One training example or one feedback submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackingRecord {
    #[serde(flatten)]
    pub profile: TripProfile,
    pub items: BTreeSet<String>,
}

impl PackingRecord {
    pub fn new<I, S>(profile: TripProfile, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            profile,
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}

/// A packing record as found in external sources
///
/// Every field is optional so that a missing field surfaces as a
/// [`MalformedRecord`] instead of a generic parse failure. Legacy field
/// names are accepted here and nowhere else.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPackingRecord {
    #[serde(default, alias = "type_voyage")]
    pub travel_type: Option<String>,
    #[serde(default, alias = "climat")]
    pub climate: Option<String>,
    #[serde(default, alias = "duree")]
    pub duration: Option<i64>,
    #[serde(default, alias = "objets", alias = "objets_recommandes")]
    pub items: Option<Vec<String>>,
}

impl RawPackingRecord {
    /// Validate and convert into the canonical schema
    ///
    /// `index` is the record's position in its source and is only used for
    /// error reporting.
    pub fn into_record(self, index: usize) -> Result<PackingRecord, MalformedRecord> {
        let missing = |field: &str| MalformedRecord {
            index,
            field: field.to_string(),
        };

        let travel_type = non_blank(self.travel_type).ok_or_else(|| missing("travel_type"))?;
        let climate = non_blank(self.climate).ok_or_else(|| missing("climate"))?;
        let duration = self
            .duration
            .filter(|d| *d > 0)
            .and_then(|d| u32::try_from(d).ok())
            .ok_or_else(|| missing("duration"))?;

        let items: BTreeSet<String> = self
            .items
            .ok_or_else(|| missing("items"))?
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            return Err(missing("items"));
        }

        Ok(PackingRecord {
            profile: TripProfile {
                travel_type,
                climate,
                duration,
            },
            items,
        })
    }
}

impl From<PackingRecord> for RawPackingRecord {
    fn from(record: PackingRecord) -> Self {
        Self {
            travel_type: Some(record.profile.travel_type),
            climate: Some(record.profile.climate),
            duration: Some(i64::from(record.profile.duration)),
            items: Some(record.items.into_iter().collect()),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
