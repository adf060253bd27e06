use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use fairmatch::config::Settings;
use fairmatch::core::{AllocationOrchestrator, CandidateRegistry};
use fairmatch::routes::{self, AppState};
use fairmatch::services::{EventDispatcher, OfferNotifier, PostgresClient, ProjectClient};
use std::sync::Arc;
use std::time::Duration;
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
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    init_logging(&settings.logging.level, &settings.logging.format);

    info!("Starting Fairmatch allocation service...");

    // PostgreSQL is optional; without it the pool lives in memory only
    let postgres = match &settings.database.url {
        Some(url) => {
            let db_max_conn = settings.database.max_connections.unwrap_or(10);
            let client = PostgresClient::from_settings(
                url,
                Some(db_max_conn),
                settings.database.min_connections,
                settings.database.acquire_timeout_secs,
                settings.database.idle_timeout_secs,
            )
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {}", e);
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
            })?;

            info!("PostgreSQL client initialized (max: {} connections)", db_max_conn);
            Some(Arc::new(client))
        }
        None => {
            warn!("No database configured, candidate pool is in-memory only");
            None
        }
    };

    let registry = match &postgres {
        Some(pg) => {
            let registry = CandidateRegistry::with_store(pg.clone());
            let loaded = registry.hydrate().await.map_err(|e| {
                error!("Failed to load candidates: {}", e);
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
            })?;
            info!("Loaded {} candidates", loaded);
            registry
        }
        None => CandidateRegistry::new(),
    };

    let engine_config = settings.orchestrator_config();
    let orchestrator = AllocationOrchestrator::start(Arc::new(registry), engine_config, postgres.clone());

    info!(
        "Allocation engine started (window: {:?}, max offers: {})",
        engine_config.lifecycle.decision_window, engine_config.max_offers_per_request
    );

    // Collaborators are optional; offers and handoffs are logged when absent
    let notifier = match &settings.notifications.redis_url {
        Some(url) => match OfferNotifier::new(url, settings.notifications.channel_prefix.clone()).await {
            Ok(n) => {
                info!("Offer notifier connected");
                Some(Arc::new(n))
            }
            Err(e) => {
                error!("Failed to connect to Redis ({}), offers will not be pushed", e);
                None
            }
        },
        None => None,
    };

    let projects = match &settings.projects.endpoint {
        Some(endpoint) => {
            let timeout = Duration::from_secs(settings.projects.timeout_secs);
            match ProjectClient::new(endpoint.clone(), timeout) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    error!("Failed to build project client: {}", e);
                    None
                }
            }
        }
        None => None,
    };

    let dispatcher = EventDispatcher::new(notifier, projects);
    tokio::spawn(dispatcher.run(orchestrator.attach_dispatcher().await));

    // Build application state
    let app_state = AppState {
        orchestrator,
        postgres,
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
