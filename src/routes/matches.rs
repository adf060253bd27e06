use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::core::{AllocationError, AllocationOrchestrator};
use crate::models::{
    ErrorResponse, HealthResponse, MatchResponse, RequestStatusResponse, RespondRequest, SubmitRequest,
    SubmitResponse,
};
use crate::services::PostgresClient;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AllocationOrchestrator>,
    pub postgres: Option<Arc<PostgresClient>>,
}

/// Configure request and match routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/requests", web::post().to(submit_request))
        .route("/requests/{id}", web::get().to(get_request_status))
        .route("/requests/{id}/settle", web::post().to(retry_settlement))
        .route("/matches/{id}", web::get().to(get_match))
        .route("/matches/{id}/respond", web::post().to(respond_to_match));
}

/// Render an allocation error as a JSON response
pub fn error_response(err: &AllocationError) -> HttpResponse {
    let status = actix_web::http::StatusCode::from_u16(err.status_code())
        .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);

    HttpResponse::build(status).json(ErrorResponse {
        error: err.kind().to_string(),
        message: err.to_string(),
        status_code: status.as_u16(),
    })
}

pub fn validation_error(errors: validator::ValidationErrors) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: "Validation failed".to_string(),
        message: errors.to_string(),
        status_code: 400,
    })
}

fn parse_id(raw: &str) -> Result<Uuid, HttpResponse> {
    Uuid::parse_str(raw).map_err(|e| {
        HttpResponse::BadRequest().json(ErrorResponse {
            error: "Invalid id".to_string(),
            message: e.to_string(),
            status_code: 400,
        })
    })
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let status = match &state.postgres {
        Some(pg) if !pg.health_check().await.unwrap_or(false) => "degraded",
        _ => "healthy",
    };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Submit a request for allocation
///
/// POST /api/v1/requests
///
/// Request body:
/// ```json
/// {
///   "category": "Web Development",
///   "description": "string",
///   "budget": 1500.0
/// }
/// ```
async fn submit_request(
    state: web::Data<AppState>,
    req: web::Json<SubmitRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for submit request: {:?}", errors);
        return validation_error(errors);
    }

    let request = req.into_inner().into_service_request();
    let request_id = request.request_id;

    match state.orchestrator.submit(request).await {
        Ok(handle) => HttpResponse::Created().json(SubmitResponse {
            request_id: handle.request_id(),
            offer: handle.offer().clone(),
        }),
        Err(e) => {
            match &e {
                AllocationError::NoCandidatesAvailable { .. } => {
                    tracing::info!("Request {} queued: {}", request_id, e)
                }
                _ => tracing::error!("Failed to allocate request {}: {}", request_id, e),
            }
            error_response(&e)
        }
    }
}

/// Current allocation status of a request
///
/// GET /api/v1/requests/{id}
async fn get_request_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let request_id = match parse_id(&path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.orchestrator.request_status(request_id).await {
        Ok(status) => HttpResponse::Ok().json(RequestStatusResponse { request_id, status }),
        Err(e) => error_response(&e),
    }
}

/// Retry the win bookkeeping and handoff of an accepted request
///
/// POST /api/v1/requests/{id}/settle
async fn retry_settlement(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let request_id = match parse_id(&path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.orchestrator.retry_settlement(request_id).await {
        Ok(offer) => HttpResponse::Ok().json(MatchResponse { offer }),
        Err(e) => {
            tracing::warn!("Settlement retry for request {} failed: {}", request_id, e);
            error_response(&e)
        }
    }
}

/// Fetch a live or recently resolved match
///
/// GET /api/v1/matches/{id}
async fn get_match(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let match_id = match parse_id(&path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.orchestrator.get_match(match_id).await {
        Ok(offer) => HttpResponse::Ok().json(MatchResponse { offer }),
        Err(e) => error_response(&e),
    }
}

/// Accept or decline a pending match
///
/// POST /api/v1/matches/{id}/respond
///
/// Request body:
/// ```json
/// { "decision": "accept|decline" }
/// ```
async fn respond_to_match(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<RespondRequest>,
) -> impl Responder {
    let match_id = match parse_id(&path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.orchestrator.respond(match_id, req.decision).await {
        Ok(offer) => HttpResponse::Ok().json(MatchResponse { offer }),
        Err(e) => {
            tracing::info!("Decision on match {} rejected: {}", match_id, e);
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CandidateRegistry, OrchestratorConfig};
    use crate::models::{Candidate, MatchState};
    use actix_web::{test, App};

    async fn test_state() -> AppState {
        let registry = Arc::new(CandidateRegistry::new());
        registry
            .register(Candidate {
                candidate_id: "c1".to_string(),
                display_name: "C1".to_string(),
                categories: vec!["Design".to_string()],
                rating: 4.5,
                completed_jobs: 30,
                match_streak: 0,
                last_match_at: None,
                is_available: true,
            })
            .await
            .unwrap();

        AppState {
            orchestrator: AllocationOrchestrator::start(registry, OrchestratorConfig::default(), None),
            postgres: None,
        }
    }

    #[actix_web::test]
    async fn test_submit_and_accept() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state().await))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/requests")
            .set_json(serde_json::json!({ "category": "Design", "description": "logo" }))
            .to_request();
        let submitted: SubmitResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(submitted.offer.candidate_id, "c1");

        let req = test::TestRequest::post()
            .uri(&format!("/matches/{}/respond", submitted.offer.match_id))
            .set_json(serde_json::json!({ "decision": "accept" }))
            .to_request();
        let accepted: MatchResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(accepted.offer.state, MatchState::Accepted);

        let req = test::TestRequest::post()
            .uri(&format!("/matches/{}/respond", submitted.offer.match_id))
            .set_json(serde_json::json!({ "decision": "decline" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 409);
    }

    #[actix_web::test]
    async fn test_submit_without_candidates_is_unprocessable() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state().await))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/requests")
            .set_json(serde_json::json!({ "category": "Plumbing" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status().as_u16(), 422);
    }

    #[actix_web::test]
    async fn test_unknown_match_is_404() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state().await))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/matches/{}", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status().as_u16(), 404);
    }

    #[actix_web::test]
    async fn test_settle_needs_a_failed_settlement() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state().await))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/requests")
            .set_json(serde_json::json!({ "category": "Design" }))
            .to_request();
        let submitted: SubmitResponse = test::call_and_read_body_json(&app, req).await;

        // Still offered, nothing to settle
        let req = test::TestRequest::post()
            .uri(&format!("/requests/{}/settle", submitted.request_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 404);

        let req = test::TestRequest::post().uri("/requests/not-a-uuid/settle").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
    }
}
