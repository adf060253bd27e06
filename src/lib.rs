//! Fairmatch - fair allocation of service requests to candidates
//!
//! Scores every eligible candidate for an incoming request, applies the
//! new-entrant boost and streak rotation, and offers the request to one
//! candidate at a time with a bounded decision window.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{
    composite_score, score_candidate, AllocationError, AllocationOrchestrator, CandidateRegistry, MatchHandle,
    OrchestratorConfig, SelectionPolicy,
};
pub use crate::models::{AllocationStatus, Candidate, Decision, Match, MatchState, ScoreBreakdown, ServiceRequest};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Verify that the library exports work correctly
        let composite = composite_score(100.0, 100.0, 100.0);
        assert!((composite - 100.0).abs() < 1e-9);
        assert_eq!(OrchestratorConfig::default().max_offers_per_request, 5);
    }
}
