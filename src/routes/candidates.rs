use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use crate::core::{AllocationError, AVAILABILITY_WEIGHT, CATEGORY_FIT_WEIGHT, RATING_TIER_WEIGHT};
use crate::models::{
    AvailabilityRequest, BreakdownQuery, BreakdownResponse, Candidate, RegisterCandidateRequest,
    ServiceRequest, WeightsResponse,
};
use crate::routes::matches::{error_response, validation_error, AppState};

/// Configure candidate pool routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/candidates", web::post().to(register_candidate))
        .route("/candidates/{id}", web::get().to(get_candidate))
        .route("/candidates/{id}/availability", web::put().to(set_availability))
        .route("/candidates/{id}/breakdown", web::get().to(get_breakdown));
}

/// Register a candidate or update its profile
///
/// Outcome counters of a known candidate are kept.
///
/// POST /api/v1/candidates
async fn register_candidate(
    state: web::Data<AppState>,
    req: web::Json<RegisterCandidateRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_error(errors);
    }

    let candidate: Candidate = req.into_inner().into();
    let candidate_id = candidate.candidate_id.clone();

    match state.orchestrator.register_candidate(candidate).await {
        Ok(offers) => {
            if !offers.is_empty() {
                tracing::info!("Registering {} produced {} offers", candidate_id, offers.len());
            }
            match state.orchestrator.registry().get(&candidate_id).await {
                Ok(stored) => HttpResponse::Created().json(stored),
                Err(e) => error_response(&AllocationError::from(e)),
            }
        }
        Err(e) => {
            tracing::error!("Failed to register candidate {}: {}", candidate_id, e);
            error_response(&e)
        }
    }
}

/// GET /api/v1/candidates/{id}
async fn get_candidate(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.orchestrator.registry().get(&path).await {
        Ok(candidate) => HttpResponse::Ok().json(candidate),
        Err(e) => error_response(&AllocationError::from(e)),
    }
}

/// Toggle availability; going online retries queued requests
///
/// PUT /api/v1/candidates/{id}/availability
async fn set_availability(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<AvailabilityRequest>,
) -> impl Responder {
    let candidate_id = path.into_inner();

    match state
        .orchestrator
        .set_availability(&candidate_id, req.is_available)
        .await
    {
        Ok(offers) => HttpResponse::Ok().json(serde_json::json!({
            "candidateId": candidate_id,
            "isAvailable": req.is_available,
            "offers": offers,
        })),
        Err(e) => error_response(&e),
    }
}

/// Score breakdown of a candidate against a hypothetical request
///
/// GET /api/v1/candidates/{id}/breakdown?category=Design&description=logo
async fn get_breakdown(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<BreakdownQuery>,
) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_error(errors);
    }

    let query = query.into_inner();
    let request = ServiceRequest::new(query.category, query.description, None);

    match state.orchestrator.breakdown(&path, &request).await {
        Ok(scores) => HttpResponse::Ok().json(BreakdownResponse {
            candidate_id: path.into_inner(),
            scores,
            weights: WeightsResponse {
                category_fit: CATEGORY_FIT_WEIGHT,
                availability: AVAILABILITY_WEIGHT,
                rating_tier: RATING_TIER_WEIGHT,
            },
        }),
        Err(e) => error_response(&e),
    }
}
