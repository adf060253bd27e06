//! Match lifecycle manager
//!
//! Every match starts `pending` with a decision deadline. Accept, decline
//! and deadline expiry race on one atomic state field; the first
//! compare-and-set out of `pending` wins and all later attempts get
//! `AlreadyResolved`. A winning accept or decline aborts the deadline timer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::error::{AllocationError, Result};
use crate::models::{Decision, Match, MatchState, ScoreBreakdown};

/// Timing configuration for offers
#[derive(Debug, Clone, Copy)]
pub struct LifecycleConfig {
    /// Time a candidate has to answer an offer
    pub decision_window: Duration,
    /// How long resolved matches stay queryable
    pub resolved_retention: Duration,
    /// Most resolved matches kept at once; past this the oldest are evicted
    /// early and a late decision on them gets `NotFound`
    pub resolved_capacity: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            decision_window: Duration::from_secs(60),
            resolved_retention: Duration::from_secs(3600),
            resolved_capacity: 100_000,
        }
    }
}

struct MatchSlot {
    state: AtomicU8,
    record: RwLock<Match>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl MatchSlot {
    fn state(&self) -> MatchState {
        MatchState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Owns pending matches and their deadline timers
#[derive(Clone)]
pub struct MatchLifecycle {
    config: LifecycleConfig,
    live: Arc<RwLock<HashMap<Uuid, Arc<MatchSlot>>>>,
    resolved: moka::future::Cache<Uuid, Match>,
    expirations: mpsc::UnboundedSender<Match>,
}

impl MatchLifecycle {
    /// Create a manager plus the channel on which expired matches arrive
    pub fn new(config: LifecycleConfig) -> (Self, mpsc::UnboundedReceiver<Match>) {
        let (expirations, rx) = mpsc::unbounded_channel();
        let resolved = moka::future::CacheBuilder::new(config.resolved_capacity)
            .time_to_live(config.resolved_retention)
            .build();

        let lifecycle = Self {
            config,
            live: Arc::new(RwLock::new(HashMap::new())),
            resolved,
            expirations,
        };
        (lifecycle, rx)
    }

    /// Create a pending match and start its deadline timer
    pub async fn open(&self, request_id: Uuid, candidate_id: String, scores: ScoreBreakdown) -> Match {
        let created_at = Utc::now();
        let window_ms = i64::try_from(self.config.decision_window.as_millis()).unwrap_or(i64::MAX);
        let offer = Match {
            match_id: Uuid::new_v4(),
            request_id,
            candidate_id,
            scores,
            state: MatchState::Pending,
            created_at,
            deadline: created_at + chrono::Duration::milliseconds(window_ms),
            resolved_at: None,
        };

        let slot = Arc::new(MatchSlot {
            state: AtomicU8::new(MatchState::Pending as u8),
            record: RwLock::new(offer.clone()),
            timer: Mutex::new(None),
        });
        self.live.write().await.insert(offer.match_id, slot.clone());

        let expires_at = tokio::time::Instant::now() + self.config.decision_window;
        let lifecycle = self.clone();
        let match_id = offer.match_id;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            lifecycle.expire(match_id).await;
        });
        *slot.timer.lock().await = Some(handle);

        debug!(
            "Opened match {} for request {} -> {} (deadline {})",
            offer.match_id, offer.request_id, offer.candidate_id, offer.deadline
        );
        offer
    }

    /// Apply a candidate's decision to a pending match
    pub async fn resolve(&self, match_id: Uuid, decision: Decision) -> Result<Match> {
        let slot = self.live.read().await.get(&match_id).cloned();
        match slot {
            Some(slot) => self.transition(match_id, &slot, decision.into()).await,
            None => match self.resolved.get(&match_id).await {
                Some(resolved) => Err(AllocationError::AlreadyResolved {
                    match_id,
                    state: resolved.state,
                }),
                None => Err(AllocationError::NotFound(format!("match {}", match_id))),
            },
        }
    }

    /// Current snapshot of a live or recently resolved match
    pub async fn get(&self, match_id: Uuid) -> Result<Match> {
        let slot = self.live.read().await.get(&match_id).cloned();
        if let Some(slot) = slot {
            let mut snapshot = slot.record.read().await.clone();
            snapshot.state = slot.state();
            return Ok(snapshot);
        }

        self.resolved
            .get(&match_id)
            .await
            .ok_or_else(|| AllocationError::NotFound(format!("match {}", match_id)))
    }

    /// Number of matches still awaiting a decision
    pub async fn pending_count(&self) -> usize {
        self.live.read().await.len()
    }

    async fn expire(&self, match_id: Uuid) {
        let slot = self.live.read().await.get(&match_id).cloned();
        let Some(slot) = slot else {
            return;
        };

        match self.transition(match_id, &slot, MatchState::Expired).await {
            Ok(expired) => {
                info!("Match {} expired without a decision", match_id);
                if self.expirations.send(expired).is_err() {
                    debug!("Expiry for match {} dropped, no settlement listener", match_id);
                }
            }
            Err(e) => debug!("Deadline for match {} lost the race: {}", match_id, e),
        }
    }

    async fn transition(&self, match_id: Uuid, slot: &Arc<MatchSlot>, to: MatchState) -> Result<Match> {
        if let Err(current) = slot.state.compare_exchange(
            MatchState::Pending as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(AllocationError::AlreadyResolved {
                match_id,
                state: MatchState::from_u8(current),
            });
        }

        // The expiry path runs inside the timer task, which must not abort itself
        let timer = slot.timer.lock().await.take();
        if let Some(timer) = timer {
            if to != MatchState::Expired {
                timer.abort();
            }
        }

        let resolved = {
            let mut record = slot.record.write().await;
            record.state = to;
            record.resolved_at = Some(Utc::now());
            record.clone()
        };

        // Insert before removing so concurrent lookups never miss the match
        self.resolved.insert(match_id, resolved.clone()).await;
        self.live.write().await.remove(&match_id);

        debug!("Match {} resolved as {}", match_id, to);
        Ok(resolved)
    }
}
