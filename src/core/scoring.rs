use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::{Candidate, ScoreBreakdown, ServiceRequest};

/// Composite weight of the category fit score
pub const CATEGORY_FIT_WEIGHT: f64 = 0.40;
/// Composite weight of the availability score
pub const AVAILABILITY_WEIGHT: f64 = 0.30;
/// Composite weight of the rating tier score
pub const RATING_TIER_WEIGHT: f64 = 0.30;

/// Highest rating a candidate can hold
pub const MAX_RATING: f64 = 5.0;

/// Recency points lost per hour since the last won match (zero after a week)
pub const RECENCY_DECAY_PER_HOUR: f64 = 100.0 / 168.0;

/// Score a candidate (0-100 per component) against a request
///
/// Scoring formula:
/// composite = (
///     category_fit * 0.40 +     # Declared category, else token overlap
///     availability * 0.30 +     # 100 when available, else 0
///     rating_tier  * 0.30       # Rating 0-5 mapped linearly to 0-100
/// )
///
/// `recency` is computed for display only and never enters the composite.
pub fn score_candidate(
    request: &ServiceRequest,
    candidate: &Candidate,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let category_fit = category_fit_score(request, candidate);
    let availability = if candidate.is_available { 100.0 } else { 0.0 };
    let rating_tier = rating_tier_score(candidate.rating);
    let recency = recency_score(candidate.last_match_at, now);

    ScoreBreakdown {
        category_fit,
        availability,
        rating_tier,
        recency,
        composite: composite_score(category_fit, availability, rating_tier),
    }
}

/// Weighted sum of the three ranking components
#[inline]
pub fn composite_score(category_fit: f64, availability: f64, rating_tier: f64) -> f64 {
    let total = category_fit * CATEGORY_FIT_WEIGHT
        + availability * AVAILABILITY_WEIGHT
        + rating_tier * RATING_TIER_WEIGHT;

    total.clamp(0.0, 100.0)
}

/// 100 for a declared category, otherwise the share of the candidate's
/// category tokens that appear in the request description
fn category_fit_score(request: &ServiceRequest, candidate: &Candidate) -> f64 {
    if candidate.serves(&request.category) {
        return 100.0;
    }

    let description = tokenize(&request.description);
    if description.is_empty() {
        return 0.0;
    }

    let declared: HashSet<String> = candidate
        .categories
        .iter()
        .flat_map(|c| tokenize(c))
        .collect();
    if declared.is_empty() {
        return 0.0;
    }

    let shared = declared.intersection(&description).count() as f64;
    shared / declared.len() as f64 * 100.0
}

#[inline]
fn rating_tier_score(rating: f64) -> f64 {
    rating.clamp(0.0, MAX_RATING) / MAX_RATING * 100.0
}

#[inline]
fn recency_score(last_match_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(last) = last_match_at else {
        return 0.0;
    };

    let hours = (now - last).num_seconds().max(0) as f64 / 3600.0;
    (100.0 - hours * RECENCY_DECAY_PER_HOUR).max(0.0)
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
        .collect()
}
