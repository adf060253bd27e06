use thiserror::Error;
use uuid::Uuid;

use crate::models::MatchState;
use crate::services::PostgresError;

/// Errors surfaced by the candidate registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown candidate: {0}")]
    UnknownCandidate(String),

    #[error("Storage error: {0}")]
    Storage(#[from] PostgresError),
}

/// Errors surfaced by allocation and match resolution
#[derive(Debug, Error)]
pub enum AllocationError {
    /// No eligible candidate; the request is retained for a later retry
    #[error("No candidates available for request {request_id}")]
    NoCandidatesAvailable { request_id: Uuid },

    #[error("Not found: {0}")]
    NotFound(String),

    /// A decision arrived after the match reached a terminal state
    #[error("Match {match_id} already resolved as {state}")]
    AlreadyResolved { match_id: Uuid, state: MatchState },

    /// The request used up its offer budget and must be resubmitted
    #[error("Request {request_id} exhausted its {offers} offers")]
    RetryLimitExceeded { request_id: Uuid, offers: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] PostgresError),
}

impl From<RegistryError> for AllocationError {
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::UnknownCandidate(id) => AllocationError::NotFound(format!("candidate {}", id)),
            RegistryError::Storage(e) => AllocationError::Storage(e),
        }
    }
}

impl AllocationError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AllocationError::NoCandidatesAvailable { .. } => 422,
            AllocationError::NotFound(_) => 404,
            AllocationError::AlreadyResolved { .. } => 409,
            AllocationError::RetryLimitExceeded { .. } => 422,
            AllocationError::Storage(_) => 503,
        }
    }

    /// Short machine-readable error name
    pub fn kind(&self) -> &'static str {
        match self {
            AllocationError::NoCandidatesAvailable { .. } => "no_candidates_available",
            AllocationError::NotFound(_) => "not_found",
            AllocationError::AlreadyResolved { .. } => "already_resolved",
            AllocationError::RetryLimitExceeded { .. } => "retry_limit_exceeded",
            AllocationError::Storage(_) => "storage_unavailable",
        }
    }
}

/// Result type alias for allocation operations
pub type Result<T> = std::result::Result<T, AllocationError>;
