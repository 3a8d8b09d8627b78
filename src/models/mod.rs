// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{MalformedRecord, PackingRecord, RawPackingRecord, TripProfile};
pub use requests::{FeedbackRequest, PredictRequest};
pub use responses::{ErrorResponse, FeedbackResponse, HealthResponse, PredictResponse, RetrainResponse};
