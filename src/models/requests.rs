use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request for a packing recommendation
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PredictRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "type_voyage")]
    pub travel_type: String,
    #[validate(length(min = 1))]
    #[serde(alias = "climat")]
    pub climate: String,
    #[validate(range(min = 1))]
    #[serde(alias = "duree")]
    pub duration: u32,
}

/// User-submitted correction of a packing list
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FeedbackRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "type_voyage")]
    pub travel_type: String,
    #[validate(length(min = 1))]
    #[serde(alias = "climat")]
    pub climate: String,
    #[validate(range(min = 1))]
    #[serde(alias = "duree")]
    pub duration: u32,
    #[validate(length(min = 1))]
    #[serde(alias = "objets", alias = "objets_recommandes")]
    pub items: Vec<String>,
}
