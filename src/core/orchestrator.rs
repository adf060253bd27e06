//! Allocation orchestrator
//!
//! Drives one request at a time through registry lookup, scoring, selection
//! and a pending offer, and loops back on declines and expiries. Accepted
//! matches are handed to the project service through the dispatcher queue;
//! requests with nobody eligible wait in a queue for a retry trigger.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::error::{AllocationError, Result};
use crate::core::events::AllocationEvent;
use crate::core::lifecycle::{LifecycleConfig, MatchLifecycle};
use crate::core::registry::CandidateRegistry;
use crate::core::scoring::score_candidate;
use crate::core::selection::{Selection, SelectionPolicy};
use crate::models::{AllocationStatus, Candidate, Decision, Match, MatchState, ScoreBreakdown, ServiceRequest};
use crate::services::PostgresClient;

/// Tunables for the allocation pipeline
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub policy: SelectionPolicy,
    pub lifecycle: LifecycleConfig,
    /// Offers a request may receive before it fails with `RetryLimitExceeded`
    pub max_offers_per_request: u32,
    /// Capacity of the outbound event channel
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::default(),
            lifecycle: LifecycleConfig::default(),
            max_offers_per_request: 5,
            event_buffer: 1024,
        }
    }
}

/// Caller's view of a submitted request
///
/// Holds the first pending offer and follows the request through
/// re-selection until it is accepted, queued, or failed.
#[derive(Debug)]
pub struct MatchHandle {
    request_id: Uuid,
    offer: Match,
    status: watch::Receiver<AllocationStatus>,
}

impl MatchHandle {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The offer created by `submit`
    pub fn offer(&self) -> &Match {
        &self.offer
    }

    /// Poll the current status
    pub fn status(&self) -> AllocationStatus {
        self.status.borrow().clone()
    }

    /// Wait for the next status change (a re-offer, acceptance, queueing or failure)
    pub async fn changed(&mut self) -> AllocationStatus {
        if self.status.changed().await.is_err() {
            debug!("Status channel for request {} closed", self.request_id);
        }
        self.status.borrow_and_update().clone()
    }

    /// Wait until no offer is outstanding
    pub async fn settled(&mut self) -> AllocationStatus {
        let settled = self
            .status
            .wait_for(AllocationStatus::is_settled)
            .await
            .map(|status| status.clone());

        match settled {
            Ok(status) => status,
            Err(_) => self.status.borrow().clone(),
        }
    }
}

struct RequestAllocation {
    request: ServiceRequest,
    /// Candidates who declined or let an offer expire
    excluded: HashSet<String>,
    offers: u32,
    queued: bool,
    /// Set while an operator retry of a failed settlement is running
    settling: bool,
    status: watch::Sender<AllocationStatus>,
}

/// Allocation orchestrator
///
/// # Pipeline
/// 1. Registry lookup of eligible candidates (minus earlier decliners)
/// 2. Scoring
/// 3. Selection with new-entrant boost and rotation
/// 4. A pending match with a decision deadline
///
/// Declines and expiries loop back to step 1 for the same request until a
/// candidate accepts, the pool runs dry, or the offer budget is spent.
pub struct AllocationOrchestrator {
    registry: Arc<CandidateRegistry>,
    lifecycle: MatchLifecycle,
    policy: SelectionPolicy,
    max_offers_per_request: u32,
    requests: RwLock<HashMap<Uuid, RequestAllocation>>,
    finished: moka::future::Cache<Uuid, AllocationStatus>,
    events: broadcast::Sender<AllocationEvent>,
    /// Lossless queue of offers and handoffs for the attached dispatcher
    deliveries: RwLock<Option<mpsc::UnboundedSender<AllocationEvent>>>,
    store: Option<Arc<PostgresClient>>,
}

impl AllocationOrchestrator {
    /// Build the orchestrator and spawn its expiry settlement task
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        registry: Arc<CandidateRegistry>,
        config: OrchestratorConfig,
        store: Option<Arc<PostgresClient>>,
    ) -> Arc<Self> {
        let (lifecycle, expirations) = MatchLifecycle::new(config.lifecycle);
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let finished = moka::future::CacheBuilder::new(config.lifecycle.resolved_capacity)
            .time_to_live(config.lifecycle.resolved_retention)
            .build();

        let orchestrator = Arc::new(Self {
            registry,
            lifecycle,
            policy: config.policy,
            max_offers_per_request: config.max_offers_per_request.max(1),
            requests: RwLock::new(HashMap::new()),
            finished,
            events,
            deliveries: RwLock::new(None),
            store,
        });

        tokio::spawn(run_settlements(Arc::downgrade(&orchestrator), expirations));
        orchestrator
    }

    pub fn registry(&self) -> &Arc<CandidateRegistry> {
        &self.registry
    }

    /// Subscribe to outbound allocation events
    ///
    /// Observers that fall behind skip events. Collaborators that must see
    /// every offer and handoff use `attach_dispatcher` instead.
    pub fn subscribe(&self) -> broadcast::Receiver<AllocationEvent> {
        self.events.subscribe()
    }

    /// Open the lossless delivery queue for offers and project handoffs
    ///
    /// Only one dispatcher is attached at a time; attaching again replaces
    /// the previous queue. Nothing is queued before the first attach.
    pub async fn attach_dispatcher(&self) -> mpsc::UnboundedReceiver<AllocationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.deliveries.write().await = Some(tx);
        rx
    }

    /// Accept a request and offer it to the best eligible candidate
    ///
    /// With no eligible candidate the request is kept, queued for a retry
    /// trigger, and `NoCandidatesAvailable` is returned.
    pub async fn submit(&self, request: ServiceRequest) -> Result<MatchHandle> {
        if let Some(store) = &self.store {
            store.save_request(&request).await?;
        }

        let request_id = request.request_id;
        let (status_tx, mut status_rx) = watch::channel(AllocationStatus::Queued);

        info!(
            "Allocating request {} (category: {})",
            request_id, request.category
        );

        self.requests.write().await.insert(
            request_id,
            RequestAllocation {
                request,
                excluded: HashSet::new(),
                offers: 0,
                queued: false,
                settling: false,
                status: status_tx,
            },
        );

        let offer = self.offer_next(request_id).await?;
        // The first offer is reported by `offer()`, so `changed()` starts after it
        status_rx.borrow_and_update();

        Ok(MatchHandle {
            request_id,
            offer,
            status: status_rx,
        })
    }

    /// Apply a candidate's accept/decline decision
    ///
    /// The first terminal transition wins; anything later, including a
    /// decision after expiry, fails with `AlreadyResolved`.
    pub async fn respond(&self, match_id: Uuid, decision: Decision) -> Result<Match> {
        let resolved = self.lifecycle.resolve(match_id, decision).await?;

        info!(
            "Match {} {} by {}",
            resolved.match_id, resolved.state, resolved.candidate_id
        );

        self.settle(resolved.clone()).await?;
        Ok(resolved)
    }

    /// Live or recently resolved match
    pub async fn get_match(&self, match_id: Uuid) -> Result<Match> {
        self.lifecycle.get(match_id).await
    }

    /// Current allocation status of a request
    pub async fn request_status(&self, request_id: Uuid) -> Result<AllocationStatus> {
        if let Some(allocation) = self.requests.read().await.get(&request_id) {
            return Ok(allocation.status.borrow().clone());
        }

        self.finished
            .get(&request_id)
            .await
            .ok_or_else(|| AllocationError::NotFound(format!("request {}", request_id)))
    }

    /// Follow a request that is still being allocated, e.g. one that was
    /// queued by `submit`
    pub async fn watch_request(&self, request_id: Uuid) -> Result<watch::Receiver<AllocationStatus>> {
        self.requests
            .read()
            .await
            .get(&request_id)
            .map(|allocation| allocation.status.subscribe())
            .ok_or_else(|| AllocationError::NotFound(format!("request {}", request_id)))
    }

    /// Score breakdown of a candidate against a request, for display
    pub async fn breakdown(&self, candidate_id: &str, request: &ServiceRequest) -> Result<ScoreBreakdown> {
        let candidate = self.registry.get(candidate_id).await?;
        Ok(score_candidate(request, &candidate, Utc::now()))
    }

    /// Add a candidate or update its profile; an available one retries
    /// queued requests
    pub async fn register_candidate(&self, candidate: Candidate) -> Result<Vec<Match>> {
        let registered = self.registry.register(candidate).await?;

        if !registered.is_available {
            return Ok(Vec::new());
        }
        self.retry_where(|request| registered.serves(&request.category)).await
    }

    /// Set a candidate's availability; coming online retries queued
    /// requests in the candidate's categories
    pub async fn set_availability(&self, candidate_id: &str, is_available: bool) -> Result<Vec<Match>> {
        let candidate = self.registry.set_availability(candidate_id, is_available).await?;

        info!(
            "Candidate {} is now {}",
            candidate_id,
            if is_available { "available" } else { "unavailable" }
        );

        if !is_available {
            return Ok(Vec::new());
        }
        self.retry_where(|request| candidate.serves(&request.category)).await
    }

    /// Retry every queued request
    pub async fn retry_queued(&self) -> Result<Vec<Match>> {
        self.retry_where(|_| true).await
    }

    /// Finish an accepted match whose win could not be recorded
    ///
    /// Re-runs the win bookkeeping and the project handoff for a request in
    /// `SettlementFailed`. On another failure the request stays there.
    pub async fn retry_settlement(&self, request_id: Uuid) -> Result<Match> {
        let offer = {
            let mut requests = self.requests.write().await;
            let allocation = requests
                .get_mut(&request_id)
                .ok_or_else(|| AllocationError::NotFound(format!("request {}", request_id)))?;

            let failed = match &*allocation.status.borrow() {
                AllocationStatus::SettlementFailed { offer, .. } if !allocation.settling => Some(offer.clone()),
                _ => None,
            };
            let offer = failed
                .ok_or_else(|| AllocationError::NotFound(format!("unsettled request {}", request_id)))?;
            allocation.settling = true;
            offer
        };

        info!("Retrying settlement of match {} for request {}", offer.match_id, request_id);

        if let Err(e) = self.registry.record_outcome(&offer.candidate_id, true).await {
            error!("Settlement retry for match {} failed: {}", offer.match_id, e);
            self.mark_unsettled(&offer, &e.to_string()).await;
            return Err(e.into());
        }

        self.hand_off(offer.clone()).await;
        Ok(offer)
    }

    /// Number of requests waiting for a candidate
    pub async fn queued_count(&self) -> usize {
        self.requests.read().await.values().filter(|a| a.queued).count()
    }

    pub async fn pending_matches(&self) -> usize {
        self.lifecycle.pending_count().await
    }

    async fn retry_where<F>(&self, filter: F) -> Result<Vec<Match>>
    where
        F: Fn(&ServiceRequest) -> bool,
    {
        let candidates: Vec<Uuid> = self
            .requests
            .read()
            .await
            .iter()
            .filter(|(_, a)| a.queued && filter(&a.request))
            .map(|(id, _)| *id)
            .collect();

        let mut offers = Vec::new();
        for request_id in candidates {
            // Claim the request so a concurrent retry does not offer it twice
            if !self.claim_queued(request_id).await {
                continue;
            }

            match self.offer_next(request_id).await {
                Ok(offer) => offers.push(offer),
                Err(AllocationError::NoCandidatesAvailable { .. })
                | Err(AllocationError::RetryLimitExceeded { .. }) => {}
                Err(e) => {
                    if let Some(allocation) = self.requests.write().await.get_mut(&request_id) {
                        allocation.queued = true;
                    }
                    return Err(e);
                }
            }
        }

        if !offers.is_empty() {
            info!("Retried queued requests, {} new offers", offers.len());
        }
        Ok(offers)
    }

    /// Select the next candidate for a request and open a pending match
    async fn offer_next(&self, request_id: Uuid) -> Result<Match> {
        let (offers, winner) = loop {
            let (request, excluded, offers) = {
                let requests = self.requests.read().await;
                let allocation = requests
                    .get(&request_id)
                    .ok_or_else(|| AllocationError::NotFound(format!("request {}", request_id)))?;
                (allocation.request.clone(), allocation.excluded.clone(), allocation.offers)
            };

            let now = Utc::now();
            let scored: Vec<(Candidate, ScoreBreakdown)> = self
                .eligible(&request, &excluded)
                .await?
                .into_iter()
                .map(|c| {
                    let scores = score_candidate(&request, &c, now);
                    (c, scores)
                })
                .collect();

            debug!(
                "Request {} has {} eligible candidates ({} excluded)",
                request_id,
                scored.len(),
                excluded.len()
            );

            if let Selection::Winner(winner) = self.policy.select(scored) {
                break (offers, winner);
            }

            // Queue first, then look again: a candidate that came online after
            // the snapshot above found this request unqueued and skipped it
            self.mark_queued(request_id).await;
            if self.eligible(&request, &excluded).await?.is_empty() {
                self.finish_queue(request_id).await;
                return Err(AllocationError::NoCandidatesAvailable { request_id });
            }
            if !self.claim_queued(request_id).await {
                // A concurrent retry trigger already took the request
                return Err(AllocationError::NoCandidatesAvailable { request_id });
            }
        };

        if offers >= self.max_offers_per_request {
            self.fail(request_id, offers).await;
            return Err(AllocationError::RetryLimitExceeded { request_id, offers });
        }

        // Hold the request entry while opening so an early expiry cannot
        // settle before the offer is recorded
        let offer = {
            let mut requests = self.requests.write().await;
            let allocation = requests
                .get_mut(&request_id)
                .ok_or_else(|| AllocationError::NotFound(format!("request {}", request_id)))?;

            let offer = self
                .lifecycle
                .open(request_id, winner.candidate.candidate_id.clone(), winner.scores)
                .await;
            allocation.offers += 1;
            allocation.queued = false;
            allocation.status.send_replace(AllocationStatus::Offered { offer: offer.clone() });
            offer
        };

        info!(
            "Offered request {} to {} (score: {:.1}, ranking: {:.1}, boosted: {}, rotated: {})",
            request_id,
            offer.candidate_id,
            offer.scores.composite,
            winner.ranking_score,
            winner.boosted,
            winner.rotated
        );

        self.persist_match(&offer).await;
        self.deliver(AllocationEvent::MatchOffered { offer: offer.clone() }).await;
        Ok(offer)
    }

    /// Follow-up for a match that reached a terminal state
    async fn settle(&self, resolved: Match) -> Result<()> {
        self.persist_match(&resolved).await;
        self.emit(AllocationEvent::MatchResolved { offer: resolved.clone() });

        match resolved.state {
            MatchState::Accepted => {
                if let Err(e) = self.registry.record_outcome(&resolved.candidate_id, true).await {
                    error!(
                        "Failed to record win of match {} for {}: {}",
                        resolved.match_id, resolved.candidate_id, e
                    );
                    self.mark_unsettled(&resolved, &e.to_string()).await;
                    return Err(e.into());
                }

                self.hand_off(resolved).await;
            }
            MatchState::Declined | MatchState::Expired => {
                self.registry.record_outcome(&resolved.candidate_id, false).await?;

                match self.requests.write().await.get_mut(&resolved.request_id) {
                    Some(allocation) => {
                        allocation.excluded.insert(resolved.candidate_id.clone());
                    }
                    None => return Ok(()),
                }

                match self.offer_next(resolved.request_id).await {
                    Ok(_)
                    | Err(AllocationError::NoCandidatesAvailable { .. })
                    | Err(AllocationError::RetryLimitExceeded { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            MatchState::Pending => {
                warn!("Settle called on pending match {}", resolved.match_id);
            }
        }

        Ok(())
    }

    /// Available candidates for the request, minus earlier decliners
    async fn eligible(&self, request: &ServiceRequest, excluded: &HashSet<String>) -> Result<Vec<Candidate>> {
        let mut eligible = self.registry.list_eligible(&request.category).await?;
        eligible.retain(|c| !excluded.contains(&c.candidate_id));
        Ok(eligible)
    }

    /// Make the request visible to retry triggers
    async fn mark_queued(&self, request_id: Uuid) {
        if let Some(allocation) = self.requests.write().await.get_mut(&request_id) {
            allocation.queued = true;
        }
    }

    /// Take a queued request back; false when someone else already did
    async fn claim_queued(&self, request_id: Uuid) -> bool {
        match self.requests.write().await.get_mut(&request_id) {
            Some(allocation) if allocation.queued => {
                allocation.queued = false;
                true
            }
            _ => false,
        }
    }

    /// Publish the queued status unless a retry already claimed the request
    async fn finish_queue(&self, request_id: Uuid) {
        let still_queued = match self.requests.write().await.get_mut(&request_id) {
            Some(allocation) if allocation.queued => {
                allocation.status.send_replace(AllocationStatus::Queued);
                true
            }
            _ => false,
        };

        if still_queued {
            info!("No candidates for request {}, queued for retry", request_id);
            self.emit(AllocationEvent::RequestQueued { request_id });
        }
    }

    /// Close out an accepted request and queue its project handoff
    async fn hand_off(&self, accepted: Match) {
        let allocation = self.requests.write().await.remove(&accepted.request_id);
        let Some(allocation) = allocation else {
            return;
        };

        let status = AllocationStatus::Accepted { offer: accepted.clone() };
        allocation.status.send_replace(status.clone());
        self.finished.insert(accepted.request_id, status).await;

        info!(
            "Request {} matched to {}, handing off to project creation",
            accepted.request_id, accepted.candidate_id
        );
        self.deliver(AllocationEvent::ProjectHandoff {
            request: allocation.request,
            candidate_id: accepted.candidate_id,
            match_id: accepted.match_id,
        })
        .await;
    }

    /// Park an accepted request whose win could not be recorded
    async fn mark_unsettled(&self, accepted: &Match, reason: &str) {
        if let Some(allocation) = self.requests.write().await.get_mut(&accepted.request_id) {
            allocation.settling = false;
            allocation.status.send_replace(AllocationStatus::SettlementFailed {
                offer: accepted.clone(),
                reason: reason.to_string(),
            });
        }
    }

    async fn fail(&self, request_id: Uuid, offers: u32) {
        let status = AllocationStatus::Failed { offers };
        if let Some(allocation) = self.requests.write().await.remove(&request_id) {
            allocation.status.send_replace(status.clone());
        }
        self.finished.insert(request_id, status).await;

        warn!("Request {} exhausted {} offers", request_id, offers);
        self.emit(AllocationEvent::RequestFailed { request_id, offers });
    }

    async fn persist_match(&self, offer: &Match) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_match(offer).await {
                warn!("Failed to persist match {}: {}", offer.match_id, e);
            }
        }
    }

    /// Queue an event for the dispatcher, then broadcast it to observers
    async fn deliver(&self, event: AllocationEvent) {
        if let Some(deliveries) = self.deliveries.read().await.as_ref() {
            if deliveries.send(event.clone()).is_err() {
                warn!("Dispatcher queue closed, event for request {} not delivered", event.request_id());
            }
        }
        self.emit(event);
    }

    fn emit(&self, event: AllocationEvent) {
        if self.events.send(event).is_err() {
            debug!("No subscribers for allocation event");
        }
    }
}

/// Settle expired matches as they arrive from the lifecycle manager
async fn run_settlements(
    orchestrator: Weak<AllocationOrchestrator>,
    mut expirations: mpsc::UnboundedReceiver<Match>,
) {
    while let Some(expired) = expirations.recv().await {
        let Some(orchestrator) = orchestrator.upgrade() else {
            break;
        };

        if let Err(e) = orchestrator.settle(expired.clone()).await {
            error!(
                "Failed to settle expired match {} for request {}: {}",
                expired.match_id, expired.request_id, e
            );
        }
    }

    debug!("Settlement task stopped");
}
