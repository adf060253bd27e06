use chrono::Utc;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Match;

/// Errors that can occur while delivering offers
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Payload pushed to a candidate's client for a pending offer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferNotification {
    #[serde(rename = "matchId")]
    pub match_id: Uuid,
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
    #[serde(rename = "candidateId")]
    pub candidate_id: String,
    #[serde(rename = "compositeScore")]
    pub composite_score: f64,
    pub deadline: chrono::DateTime<Utc>,
    /// Seconds left at publish time, for the client countdown
    #[serde(rename = "secondsRemaining")]
    pub seconds_remaining: i64,
}

impl OfferNotification {
    pub fn from_offer(offer: &Match) -> Self {
        Self {
            match_id: offer.match_id,
            request_id: offer.request_id,
            candidate_id: offer.candidate_id.clone(),
            composite_score: offer.scores.composite,
            deadline: offer.deadline,
            seconds_remaining: (offer.deadline - Utc::now()).num_seconds().max(0),
        }
    }
}

/// Publishes pending offers on per-candidate Redis channels
pub struct OfferNotifier {
    redis: ConnectionManager,
    channel_prefix: String,
}

impl OfferNotifier {
    pub async fn new(redis_url: &str, channel_prefix: impl Into<String>) -> Result<Self, NotifyError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        Ok(Self {
            redis,
            channel_prefix: channel_prefix.into(),
        })
    }

    /// Publish an offer, returning how many clients received it
    pub async fn publish_offer(&self, offer: &Match) -> Result<i64, NotifyError> {
        let channel = channel_name(&self.channel_prefix, &offer.candidate_id);
        let payload = serde_json::to_string(&OfferNotification::from_offer(offer))?;

        let mut conn = self.redis.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;

        tracing::trace!("Published offer {} on {} ({} receivers)", offer.match_id, channel, receivers);
        Ok(receivers)
    }
}

/// Channel a candidate's client subscribes to
pub fn channel_name(prefix: &str, candidate_id: &str) -> String {
    format!("{}:{}", prefix, candidate_id)
}
