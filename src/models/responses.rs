use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::domain::{AllocationStatus, Match, ScoreBreakdown};

/// Response for a submitted request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
    pub offer: Match,
}

/// Response carrying a single match record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResponse {
    #[serde(rename = "match")]
    pub offer: Match,
}

/// Current allocation status of a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStatusResponse {
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
    #[serde(flatten)]
    pub status: AllocationStatus,
}

/// Explanatory score breakdown for one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownResponse {
    #[serde(rename = "candidateId")]
    pub candidate_id: String,
    pub scores: ScoreBreakdown,
    pub weights: WeightsResponse,
}

/// The fixed composite weights, echoed for display
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeightsResponse {
    #[serde(rename = "categoryFit")]
    pub category_fit: f64,
    pub availability: f64,
    #[serde(rename = "ratingTier")]
    pub rating_tier: f64,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
