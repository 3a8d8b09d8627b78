use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use validator::Validate;

use crate::models::{
    ErrorResponse, FeedbackRequest, FeedbackResponse, HealthResponse, PredictRequest, PredictResponse,
    RetrainResponse,
};
use crate::services::{RecommendError, Recommender, Retrainer};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub recommender: Arc<Recommender>,
    pub retrainer: Arc<Retrainer>,
    /// Whether the background loop is running and listening for triggers
    pub retrain_loop: bool,
}

/// Configure all packing-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/predict", web::post().to(predict))
        .route("/feedback", web::post().to(feedback))
        .route("/retrain", web::post().to(retrain));
}

fn error_response(err: &RecommendError) -> HttpResponse {
    let body = |error: &str, status_code: u16| ErrorResponse {
        error: error.to_string(),
        message: err.to_string(),
        status_code,
    };

    match err {
        RecommendError::InvalidInput(_) => HttpResponse::BadRequest().json(body("invalid_input", 400)),
        RecommendError::NoActiveModel => {
            HttpResponse::ServiceUnavailable().json(body("no_active_model", 503))
        }
        RecommendError::Codec(_) | RecommendError::Store(_) => {
            HttpResponse::InternalServerError().json(body("internal_error", 500))
        }
    }
}

fn validation_failed(errors: validator::ValidationErrors) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: "invalid_input".to_string(),
        message: errors.to_string(),
        status_code: 400,
    })
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let cycle_id = state.recommender.active().cycle_id();
    let feedback = Arc::clone(state.recommender.feedback());
    let pending_feedback = match web::block(move || feedback.len()).await {
        Ok(Ok(count)) => count,
        Ok(Err(e)) => {
            tracing::warn!("Failed to count pending feedback: {}", e);
            0
        }
        Err(e) => {
            tracing::warn!("Feedback count task failed: {}", e);
            0
        }
    };

    let status = if cycle_id.is_some() { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        cycle_id,
        retrain_state: state.retrainer.state().to_string(),
        pending_feedback,
    })
}

/// Predict endpoint
///
/// POST /api/v1/predict
///
/// Request body:
/// ```json
/// {
///   "travel_type": "beach",
///   "climate": "hot",
///   "duration": 7
/// }
/// ```
async fn predict(state: web::Data<AppState>, req: web::Json<PredictRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for predict request: {:?}", errors);
        return validation_failed(errors);
    }

    match state
        .recommender
        .predict(&req.travel_type, &req.climate, i64::from(req.duration))
    {
        Ok(prediction) => {
            for unknown in &prediction.unknown {
                tracing::info!("Predicted with unseen {} '{}'", unknown.field, unknown.value);
            }
            HttpResponse::Ok().json(PredictResponse {
                recommended_items: prediction.items.into_iter().collect(),
                cycle_id: prediction.cycle_id,
            })
        }
        Err(e) => {
            tracing::error!("Prediction failed: {}", e);
            error_response(&e)
        }
    }
}

/// Feedback endpoint
///
/// POST /api/v1/feedback
///
/// Request body:
/// ```json
/// {
///   "travel_type": "city",
///   "climate": "cold",
///   "duration": 3,
///   "items": ["coat", "map"]
/// }
/// ```
async fn feedback(state: web::Data<AppState>, req: web::Json<FeedbackRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for feedback request: {:?}", errors);
        return validation_failed(errors);
    }

    let recommender = Arc::clone(&state.recommender);
    let req = req.into_inner();
    let result = web::block(move || {
        recommender.submit_feedback(&req.travel_type, &req.climate, i64::from(req.duration), req.items)
    })
    .await;

    match result {
        Ok(Ok(record)) => {
            tracing::info!(
                "Feedback received for {}/{} ({} items)",
                record.profile.travel_type,
                record.profile.climate,
                record.items.len()
            );
            HttpResponse::Ok().json(FeedbackResponse {
                success: true,
                feedback_id: uuid::Uuid::new_v4().to_string(),
            })
        }
        Ok(Err(e)) => {
            tracing::error!("Failed to record feedback: {}", e);
            error_response(&e)
        }
        Err(e) => {
            tracing::error!("Feedback task failed: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "internal_error".to_string(),
                message: e.to_string(),
                status_code: 500,
            })
        }
    }
}

/// Manual retrain trigger
///
/// POST /api/v1/retrain
///
/// With the background loop running this only wakes it up. Otherwise the
/// cycle runs on a blocking worker before the response is sent.
async fn retrain(state: web::Data<AppState>) -> impl Responder {
    if state.retrain_loop {
        state.retrainer.trigger();
        return HttpResponse::Accepted().json(RetrainResponse { accepted: true });
    }

    let retrainer = Arc::clone(&state.retrainer);
    match web::block(move || retrainer.run_cycle()).await {
        Ok(Ok(_)) => HttpResponse::Accepted().json(RetrainResponse { accepted: true }),
        Ok(Err(e)) => HttpResponse::InternalServerError().json(ErrorResponse {
            error: "retrain_failed".to_string(),
            message: e.to_string(),
            status_code: 500,
        }),
        Err(e) => HttpResponse::InternalServerError().json(ErrorResponse {
            error: "internal_error".to_string(),
            message: e.to_string(),
            status_code: 500,
        }),
    }
}
