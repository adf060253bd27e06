use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A worker that can receive match offers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "candidateId")]
    pub candidate_id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Rating on a 0-5 scale
    pub rating: f64,
    #[serde(rename = "completedJobs", default)]
    pub completed_jobs: u32,
    /// Consecutive match wins since the last reset
    #[serde(rename = "matchStreak", default)]
    pub match_streak: u32,
    #[serde(rename = "lastMatchAt", default)]
    pub last_match_at: Option<DateTime<Utc>>,
    #[serde(rename = "isAvailable", default = "default_true")]
    pub is_available: bool,
}

impl Candidate {
    /// Case-insensitive check against the declared category tags
    pub fn serves(&self, category: &str) -> bool {
        let wanted = category.trim();
        self.categories
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(wanted))
    }
}

fn default_true() -> bool { true }

/// An incoming buyer request to be matched to a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl ServiceRequest {
    pub fn new(category: impl Into<String>, description: impl Into<String>, budget: Option<f64>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            category: category.into(),
            description: description.into(),
            budget,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle state of a single offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum MatchState {
    Pending = 0,
    Accepted = 1,
    Declined = 2,
    Expired = 3,
}

impl MatchState {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => MatchState::Accepted,
            2 => MatchState::Declined,
            3 => MatchState::Expired,
            _ => MatchState::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != MatchState::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchState::Pending => "pending",
            MatchState::Accepted => "accepted",
            MatchState::Declined => "declined",
            MatchState::Expired => "expired",
        }
    }
}

impl std::fmt::Display for MatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate's answer to a pending offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Decline,
}

impl From<Decision> for MatchState {
    fn from(value: Decision) -> Self {
        match value {
            Decision::Accept => MatchState::Accepted,
            Decision::Decline => MatchState::Declined,
        }
    }
}

/// Component scores for one request/candidate pair, each in 0-100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    #[serde(rename = "categoryFit")]
    pub category_fit: f64,
    pub availability: f64,
    #[serde(rename = "ratingTier")]
    pub rating_tier: f64,
    /// Advisory only, never weighted into `composite`
    pub recency: f64,
    pub composite: f64,
}

/// A single offer of a request to one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    #[serde(rename = "matchId")]
    pub match_id: Uuid,
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
    #[serde(rename = "candidateId")]
    pub candidate_id: String,
    pub scores: ScoreBreakdown,
    pub state: MatchState,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    #[serde(rename = "resolvedAt")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn composite_score(&self) -> f64 {
        self.scores.composite
    }
}

/// Where a request currently stands in allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AllocationStatus {
    /// A pending offer is out to a candidate
    Offered { offer: Match },
    /// The offer was accepted and handed to project creation
    Accepted { offer: Match },
    /// No eligible candidate right now; the request is retained for retry
    Queued,
    /// The request used up its offer budget
    Failed { offers: u32 },
    /// The offer was accepted but the win could not be recorded; waits for
    /// a settlement retry before the project handoff
    SettlementFailed { offer: Match, reason: String },
}

impl AllocationStatus {
    /// True once no offer is outstanding
    pub fn is_settled(&self) -> bool {
        !matches!(self, AllocationStatus::Offered { .. })
    }

    pub fn offer(&self) -> Option<&Match> {
        match self {
            AllocationStatus::Offered { offer }
            | AllocationStatus::Accepted { offer }
            | AllocationStatus::SettlementFailed { offer, .. } => Some(offer),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [
            MatchState::Pending,
            MatchState::Accepted,
            MatchState::Declined,
            MatchState::Expired,
        ] {
            assert_eq!(MatchState::from_u8(state as u8), state);
        }
        assert!(!MatchState::Pending.is_terminal());
        assert!(MatchState::Expired.is_terminal());
    }

    #[test]
    fn test_serves_is_case_insensitive() {
        let candidate = Candidate {
            candidate_id: "c1".to_string(),
            display_name: "C1".to_string(),
            categories: vec!["Web Development".to_string()],
            rating: 4.0,
            completed_jobs: 0,
            match_streak: 0,
            last_match_at: None,
            is_available: true,
        };

        assert!(candidate.serves("web development"));
        assert!(candidate.serves(" Web Development "));
        assert!(!candidate.serves("Design"));
    }

    #[test]
    fn test_decision_maps_to_terminal_state() {
        assert_eq!(MatchState::from(Decision::Accept), MatchState::Accepted);
        assert_eq!(MatchState::from(Decision::Decline), MatchState::Declined);
    }
}
