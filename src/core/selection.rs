use std::cmp::Ordering;

use serde::Deserialize;

use crate::models::{Candidate, ScoreBreakdown};

/// Fairness rules applied on top of raw composite scores
///
/// Adjustments only change ranking order; the stored composite score of a
/// match is always the unadjusted one.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SelectionPolicy {
    /// Candidates with fewer completed jobs than this get the boost
    #[serde(default = "default_new_entrant_job_threshold")]
    pub new_entrant_job_threshold: u32,
    #[serde(default = "default_new_entrant_multiplier")]
    pub new_entrant_multiplier: f64,
    /// Streak at which a candidate is moved to the bottom of the ranking
    #[serde(default = "default_rotation_streak_threshold")]
    pub rotation_streak_threshold: u32,
}

fn default_new_entrant_job_threshold() -> u32 { 10 }
fn default_new_entrant_multiplier() -> f64 { 2.0 }
fn default_rotation_streak_threshold() -> u32 { 3 }

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            new_entrant_job_threshold: default_new_entrant_job_threshold(),
            new_entrant_multiplier: default_new_entrant_multiplier(),
            rotation_streak_threshold: default_rotation_streak_threshold(),
        }
    }
}

/// A scored candidate with its fairness adjustments applied
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub scores: ScoreBreakdown,
    /// Composite after the new-entrant boost, used for ordering only
    pub ranking_score: f64,
    pub boosted: bool,
    /// Rotated to the bottom after a winning streak
    pub rotated: bool,
}

/// Outcome of a selection round
#[derive(Debug, Clone)]
pub enum Selection {
    Winner(RankedCandidate),
    NoCandidates,
}

impl SelectionPolicy {
    /// Apply boost and rotation, then order best-first
    ///
    /// Order: non-rotated before rotated, then ranking score descending,
    /// then longest idle (never matched first), then candidate id.
    pub fn rank(&self, scored: Vec<(Candidate, ScoreBreakdown)>) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = scored
            .into_iter()
            .map(|(candidate, scores)| {
                let boosted = candidate.completed_jobs < self.new_entrant_job_threshold;
                let ranking_score = if boosted {
                    (scores.composite * self.new_entrant_multiplier).min(100.0)
                } else {
                    scores.composite
                };
                let rotated = candidate.match_streak >= self.rotation_streak_threshold;

                RankedCandidate {
                    candidate,
                    scores,
                    ranking_score,
                    boosted,
                    rotated,
                }
            })
            .collect();

        ranked.sort_by(compare_ranked);
        ranked
    }

    /// Pick the top candidate, or report that the pool is empty
    pub fn select(&self, scored: Vec<(Candidate, ScoreBreakdown)>) -> Selection {
        match self.rank(scored).into_iter().next() {
            Some(winner) => Selection::Winner(winner),
            None => Selection::NoCandidates,
        }
    }
}

fn compare_ranked(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    a.rotated
        .cmp(&b.rotated)
        .then_with(|| {
            b.ranking_score
                .partial_cmp(&a.ranking_score)
                .unwrap_or(Ordering::Equal)
        })
        // None sorts before Some, so never-matched candidates count as longest idle
        .then_with(|| a.candidate.last_match_at.cmp(&b.candidate.last_match_at))
        .then_with(|| a.candidate.candidate_id.cmp(&b.candidate.candidate_id))
}
