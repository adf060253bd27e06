//! Candidate registry
//!
//! Owns the pool of candidates and serializes every counter mutation behind
//! one async lock. When a store is attached, each mutation is written to it
//! before the in-memory state changes, so a storage failure leaves the pool
//! exactly as it was.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::error::RegistryError;
use crate::models::Candidate;
use crate::services::PostgresClient;

pub struct CandidateRegistry {
    candidates: Mutex<HashMap<String, Candidate>>,
    store: Option<Arc<PostgresClient>>,
}

impl CandidateRegistry {
    /// In-memory registry with no durable store
    pub fn new() -> Self {
        Self {
            candidates: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    /// Registry that writes through to PostgreSQL
    pub fn with_store(store: Arc<PostgresClient>) -> Self {
        Self {
            candidates: Mutex::new(HashMap::new()),
            store: Some(store),
        }
    }

    /// Replace the in-memory pool with the store's contents
    pub async fn hydrate(&self) -> Result<usize, RegistryError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let loaded = store.load_candidates().await?;
        let mut candidates = self.candidates.lock().await;
        candidates.clear();
        for candidate in loaded {
            candidates.insert(candidate.candidate_id.clone(), candidate);
        }

        info!("Registry hydrated with {} candidates", candidates.len());
        Ok(candidates.len())
    }

    /// Insert a candidate, or update the profile of an existing one
    ///
    /// For a known id only the profile fields (name, categories, rating,
    /// availability) change. Completed jobs, streak and last match time are
    /// owned by `record_outcome` and are kept from the stored record.
    pub async fn register(&self, candidate: Candidate) -> Result<Candidate, RegistryError> {
        let mut candidates = self.candidates.lock().await;

        let registered = match candidates.get(&candidate.candidate_id) {
            Some(existing) => Candidate {
                completed_jobs: existing.completed_jobs,
                match_streak: existing.match_streak,
                last_match_at: existing.last_match_at,
                ..candidate
            },
            None => candidate,
        };

        if let Some(store) = &self.store {
            store.upsert_candidate(&registered).await?;
        }

        debug!("Registered candidate {}", registered.candidate_id);
        candidates.insert(registered.candidate_id.clone(), registered.clone());
        Ok(registered)
    }

    pub async fn get(&self, candidate_id: &str) -> Result<Candidate, RegistryError> {
        self.candidates
            .lock()
            .await
            .get(candidate_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownCandidate(candidate_id.to_string()))
    }

    /// Available candidates that declare `category`, ordered by id
    pub async fn list_eligible(&self, category: &str) -> Result<Vec<Candidate>, RegistryError> {
        let candidates = self.candidates.lock().await;
        let mut eligible: Vec<Candidate> = candidates
            .values()
            .filter(|c| c.is_available && c.serves(category))
            .cloned()
            .collect();

        eligible.sort_by(|a, b| a.candidate_id.cmp(&b.candidate_id));
        Ok(eligible)
    }

    /// Flip a candidate's availability flag, returning the updated record
    pub async fn set_availability(
        &self,
        candidate_id: &str,
        is_available: bool,
    ) -> Result<Candidate, RegistryError> {
        let mut candidates = self.candidates.lock().await;
        let candidate = candidates
            .get_mut(candidate_id)
            .ok_or_else(|| RegistryError::UnknownCandidate(candidate_id.to_string()))?;

        if let Some(store) = &self.store {
            store.set_availability(candidate_id, is_available).await?;
        }

        candidate.is_available = is_available;
        Ok(candidate.clone())
    }

    /// Apply a settled match outcome
    ///
    /// A win increments the winner's completed jobs and streak, stamps its
    /// last match time, and resets every other nonzero streak to 0. A loss
    /// leaves all counters untouched.
    pub async fn record_outcome(&self, candidate_id: &str, won: bool) -> Result<Candidate, RegistryError> {
        let mut candidates = self.candidates.lock().await;
        let current = candidates
            .get(candidate_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownCandidate(candidate_id.to_string()))?;

        if !won {
            return Ok(current);
        }

        let mut winner = current;
        winner.completed_jobs = winner.completed_jobs.saturating_add(1);
        winner.match_streak = winner.match_streak.saturating_add(1);
        winner.last_match_at = Some(Utc::now());

        let reset_ids: Vec<String> = candidates
            .values()
            .filter(|c| c.candidate_id != candidate_id && c.match_streak > 0)
            .map(|c| c.candidate_id.clone())
            .collect();

        if let Some(store) = &self.store {
            store.apply_win(&winner, &reset_ids).await?;
        }

        for id in &reset_ids {
            if let Some(other) = candidates.get_mut(id) {
                other.match_streak = 0;
            }
        }
        candidates.insert(winner.candidate_id.clone(), winner.clone());

        debug!(
            "Recorded win for {} (jobs={}, streak={}, resets={})",
            winner.candidate_id,
            winner.completed_jobs,
            winner.match_streak,
            reset_ids.len()
        );
        Ok(winner)
    }

    pub async fn count(&self) -> usize {
        self.candidates.lock().await.len()
    }

    /// Drop a candidate from memory only, so the next outcome for it fails
    #[cfg(test)]
    pub(crate) async fn forget(&self, candidate_id: &str) {
        self.candidates.lock().await.remove(candidate_id);
    }
}

impl Default for CandidateRegistry {
    fn default() -> Self {
        Self::new()
    }
}
