// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{AllocationStatus, Candidate, Decision, Match, MatchState, ScoreBreakdown, ServiceRequest};
pub use requests::{AvailabilityRequest, BreakdownQuery, RegisterCandidateRequest, RespondRequest, SubmitRequest};
pub use responses::{BreakdownResponse, ErrorResponse, HealthResponse, MatchResponse, RequestStatusResponse, SubmitResponse, WeightsResponse};
