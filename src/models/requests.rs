use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::domain::{Candidate, Decision, ServiceRequest};

/// Request to allocate a service request to a candidate
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitRequest {
    #[validate(length(min = 1, max = 120))]
    pub category: String,
    #[serde(default)]
    #[validate(length(max = 10000))]
    pub description: String,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub budget: Option<f64>,
}

impl SubmitRequest {
    pub fn into_service_request(self) -> ServiceRequest {
        ServiceRequest::new(self.category, self.description, self.budget)
    }
}

/// Candidate's decision on a pending match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondRequest {
    pub decision: Decision,
}

/// Register or replace a candidate in the pool
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterCandidateRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "candidate_id", rename = "candidateId")]
    pub candidate_id: String,
    #[serde(alias = "display_name", rename = "displayName", default)]
    pub display_name: String,
    #[validate(length(min = 1))]
    pub categories: Vec<String>,
    #[validate(range(min = 0.0, max = 5.0))]
    pub rating: f64,
    #[serde(alias = "completed_jobs", rename = "completedJobs", default)]
    pub completed_jobs: u32,
    #[serde(alias = "is_available", rename = "isAvailable", default)]
    pub is_available: bool,
}

impl From<RegisterCandidateRequest> for Candidate {
    fn from(value: RegisterCandidateRequest) -> Self {
        Candidate {
            candidate_id: value.candidate_id,
            display_name: value.display_name,
            categories: value.categories,
            rating: value.rating,
            completed_jobs: value.completed_jobs,
            match_streak: 0,
            last_match_at: None,
            is_available: value.is_available,
        }
    }
}

/// Toggle a candidate's availability flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    #[serde(alias = "is_available", rename = "isAvailable")]
    pub is_available: bool,
}

/// Query for a candidate's score breakdown against a hypothetical request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BreakdownQuery {
    #[validate(length(min = 1))]
    pub category: String,
    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_requires_category() {
        let req = SubmitRequest {
            category: String::new(),
            description: "landing page".to_string(),
            budget: Some(500.0),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_register_rejects_out_of_range_rating() {
        let req = RegisterCandidateRequest {
            candidate_id: "c1".to_string(),
            display_name: String::new(),
            categories: vec!["Design".to_string()],
            rating: 7.5,
            completed_jobs: 0,
            is_available: true,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_decision_parses_lowercase() {
        let req: RespondRequest = serde_json::from_str(r#"{"decision":"decline"}"#).unwrap();
        assert_eq!(req.decision, Decision::Decline);
    }
}
