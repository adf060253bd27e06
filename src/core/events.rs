use serde::Serialize;
use uuid::Uuid;

use crate::models::{Match, ServiceRequest};

/// Outbound allocation events consumed by notification and project creation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AllocationEvent {
    /// A pending offer to push to the candidate's client
    MatchOffered { offer: Match },
    /// An offer reached a terminal state
    MatchResolved { offer: Match },
    /// An accepted offer, ready for project creation
    ProjectHandoff {
        request: ServiceRequest,
        #[serde(rename = "candidateId")]
        candidate_id: String,
        #[serde(rename = "matchId")]
        match_id: Uuid,
    },
    /// No eligible candidate; the request waits for a retry trigger
    RequestQueued {
        #[serde(rename = "requestId")]
        request_id: Uuid,
    },
    /// The request used up its offer budget
    RequestFailed {
        #[serde(rename = "requestId")]
        request_id: Uuid,
        offers: u32,
    },
}

impl AllocationEvent {
    pub fn request_id(&self) -> Uuid {
        match self {
            AllocationEvent::MatchOffered { offer } | AllocationEvent::MatchResolved { offer } => offer.request_id,
            AllocationEvent::ProjectHandoff { request, .. } => request.request_id,
            AllocationEvent::RequestQueued { request_id } | AllocationEvent::RequestFailed { request_id, .. } => {
                *request_id
            }
        }
    }
}
