use serde::{Deserialize, Serialize};

/// Response for the predict endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub recommended_items: Vec<String>,
    pub cycle_id: String,
}

/// Response for the feedback endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub success: bool,
    pub feedback_id: String,
}

/// Response for a manual retrain trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainResponse {
    pub accepted: bool,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub cycle_id: Option<String>,
    pub retrain_state: String,
    pub pending_feedback: usize,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
