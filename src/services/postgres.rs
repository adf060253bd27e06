use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use thiserror::Error;

use crate::models::{Candidate, Match, ServiceRequest};

/// Errors that can occur when interacting with PostgreSQL
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// Durable store for the candidate pool, requests and match records
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client and run pending migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, PostgresError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, PostgresError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Load every candidate in the pool
    pub async fn load_candidates(&self) -> Result<Vec<Candidate>, PostgresError> {
        let query = r#"
            SELECT candidate_id, display_name, categories, rating,
                   completed_jobs, match_streak, last_match_at, is_available
            FROM candidates
            ORDER BY candidate_id
        "#;

        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        let candidates = rows
            .iter()
            .map(candidate_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Loaded {} candidates from PostgreSQL", candidates.len());
        Ok(candidates)
    }

    /// Insert or replace a candidate
    pub async fn upsert_candidate(&self, candidate: &Candidate) -> Result<(), PostgresError> {
        let query = r#"
            INSERT INTO candidates (candidate_id, display_name, categories, rating,
                                    completed_jobs, match_streak, last_match_at, is_available)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (candidate_id)
            DO UPDATE SET
                display_name = EXCLUDED.display_name,
                categories = EXCLUDED.categories,
                rating = EXCLUDED.rating,
                completed_jobs = EXCLUDED.completed_jobs,
                match_streak = EXCLUDED.match_streak,
                last_match_at = EXCLUDED.last_match_at,
                is_available = EXCLUDED.is_available
        "#;

        sqlx::query(query)
            .bind(&candidate.candidate_id)
            .bind(&candidate.display_name)
            .bind(&candidate.categories)
            .bind(candidate.rating)
            .bind(i64::from(candidate.completed_jobs))
            .bind(i64::from(candidate.match_streak))
            .bind(candidate.last_match_at)
            .bind(candidate.is_available)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Update a candidate's availability flag
    pub async fn set_availability(&self, candidate_id: &str, is_available: bool) -> Result<(), PostgresError> {
        sqlx::query("UPDATE candidates SET is_available = $2 WHERE candidate_id = $1")
            .bind(candidate_id)
            .bind(is_available)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Persist a won match: the winner's counters and every streak reset
    ///
    /// Runs in one transaction so the rotation counters never diverge.
    pub async fn apply_win(
        &self,
        winner: &Candidate,
        reset_ids: &[String],
    ) -> Result<(), PostgresError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE candidates
            SET completed_jobs = $2, match_streak = $3, last_match_at = $4
            WHERE candidate_id = $1
            "#,
        )
        .bind(&winner.candidate_id)
        .bind(i64::from(winner.completed_jobs))
        .bind(i64::from(winner.match_streak))
        .bind(winner.last_match_at)
        .execute(&mut *tx)
        .await?;

        if !reset_ids.is_empty() {
            sqlx::query("UPDATE candidates SET match_streak = 0 WHERE candidate_id = ANY($1)")
                .bind(reset_ids)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "Persisted win for {} ({} streaks reset)",
            winner.candidate_id,
            reset_ids.len()
        );
        Ok(())
    }

    /// Record an incoming request
    pub async fn save_request(&self, request: &ServiceRequest) -> Result<(), PostgresError> {
        let query = r#"
            INSERT INTO service_requests (request_id, category, description, budget, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (request_id) DO NOTHING
        "#;

        sqlx::query(query)
            .bind(request.request_id)
            .bind(&request.category)
            .bind(&request.description)
            .bind(request.budget)
            .bind(request.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a match record or update its state
    pub async fn save_match(&self, offer: &Match) -> Result<(), PostgresError> {
        let query = r#"
            INSERT INTO matches (match_id, request_id, candidate_id, category_fit, availability,
                                 rating_tier, recency, composite, state, created_at, deadline, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (match_id)
            DO UPDATE SET
                state = EXCLUDED.state,
                resolved_at = EXCLUDED.resolved_at
        "#;

        sqlx::query(query)
            .bind(offer.match_id)
            .bind(offer.request_id)
            .bind(&offer.candidate_id)
            .bind(offer.scores.category_fit)
            .bind(offer.scores.availability)
            .bind(offer.scores.rating_tier)
            .bind(offer.scores.recency)
            .bind(offer.scores.composite)
            .bind(offer.state.as_str())
            .bind(offer.created_at)
            .bind(offer.deadline)
            .bind(offer.resolved_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, PostgresError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

fn candidate_from_row(row: &PgRow) -> Result<Candidate, PostgresError> {
    let candidate_id: String = row.try_get("candidate_id")?;
    let completed_jobs: i64 = row.try_get("completed_jobs")?;
    let match_streak: i64 = row.try_get("match_streak")?;
    let last_match_at: Option<DateTime<Utc>> = row.try_get("last_match_at")?;

    Ok(Candidate {
        completed_jobs: u32::try_from(completed_jobs)
            .map_err(|_| PostgresError::InvalidRow(format!("completed_jobs for {}", candidate_id)))?,
        match_streak: u32::try_from(match_streak)
            .map_err(|_| PostgresError::InvalidRow(format!("match_streak for {}", candidate_id)))?,
        display_name: row.try_get("display_name")?,
        categories: row.try_get("categories")?,
        rating: row.try_get("rating")?,
        last_match_at,
        is_available: row.try_get("is_available")?,
        candidate_id,
    })
}
