use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use packing_advisor::config::Settings;
use packing_advisor::core::TrainingPipeline;
use packing_advisor::routes::{self, packing::AppState};
use packing_advisor::services::{
    ActiveModel, ArtifactStore, BackupSet, BootstrapOptions, DatasetSource, FeedbackStore, Recommender, Retrainer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_input".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match settings.logging.format.as_str() {
        "pretty" => subscriber.pretty().init(),
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    init_logging(&settings);
    info!("Starting packing advisor service...");

    let active = Arc::new(ActiveModel::new());
    let feedback = Arc::new(FeedbackStore::new(&settings.storage.feedback_path));
    let retrainer = Arc::new(
        Retrainer::new(
            TrainingPipeline::new(settings.training.forest_options()),
            DatasetSource::new(&settings.storage.dataset_path),
            Arc::clone(&feedback),
            ArtifactStore::new(&settings.storage.artifacts_dir),
            BackupSet::new(&settings.storage.backup_dir),
            Arc::clone(&active),
        )
        .with_keep_cycles(settings.retrain.keep_cycles),
    );

    // Make sure a model is active before accepting requests
    let bootstrap = BootstrapOptions {
        synthetic_records: settings.training.synthetic_records,
        seed: settings.training.seed,
    };
    let startup = Arc::clone(&retrainer);
    match tokio::task::spawn_blocking(move || startup.ensure_active(bootstrap)).await {
        Ok(Ok(Some(cycle_id))) => info!("Serving artifact pair {}", cycle_id),
        Ok(Ok(None)) => warn!("No training data; predictions unavailable until feedback arrives"),
        Ok(Err(e)) => error!("Initial training failed, predictions unavailable: {}", e),
        Err(e) => error!("Initial training task failed: {}", e),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let retrain_loop = settings.retrain.enabled;
    let loop_handle = if retrain_loop {
        let interval = Duration::from_secs(settings.retrain.interval_secs.max(1));
        Some(tokio::spawn(Arc::clone(&retrainer).run(interval, shutdown_rx)))
    } else {
        info!("Retraining loop disabled");
        None
    };

    let app_state = AppState {
        recommender: Arc::new(Recommender::new(active, feedback)),
        retrainer,
        retrain_loop,
    };

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    let result = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = loop_handle {
        if let Err(e) = handle.await {
            error!("Retraining loop ended abnormally: {}", e);
        }
    }

    result
}
