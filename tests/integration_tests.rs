// Integration tests for Fairmatch

use std::sync::Arc;
use std::time::Duration;

use fairmatch::core::{
    AllocationError, AllocationEvent, AllocationOrchestrator, CandidateRegistry, LifecycleConfig,
    OrchestratorConfig,
};
use fairmatch::models::{AllocationStatus, Candidate, Decision, MatchState, ServiceRequest};
use tokio::sync::broadcast::error::TryRecvError;
use tokio_test::{assert_err, assert_ok};

fn create_candidate(id: &str, rating: f64, jobs: u32, streak: u32) -> Candidate {
    Candidate {
        candidate_id: id.to_string(),
        display_name: format!("Candidate {}", id),
        categories: vec!["Web Development".to_string()],
        rating,
        completed_jobs: jobs,
        match_streak: streak,
        last_match_at: None,
        is_available: true,
    }
}

async fn engine_with(candidates: Vec<Candidate>) -> Arc<AllocationOrchestrator> {
    engine_with_config(candidates, OrchestratorConfig::default()).await
}

async fn engine_with_config(candidates: Vec<Candidate>, config: OrchestratorConfig) -> Arc<AllocationOrchestrator> {
    let registry = Arc::new(CandidateRegistry::new());
    for candidate in candidates {
        registry.register(candidate).await.unwrap();
    }
    AllocationOrchestrator::start(registry, config, None)
}

fn web_request() -> ServiceRequest {
    ServiceRequest::new("Web Development", "Marketing site rebuild", Some(2500.0))
}

#[tokio::test]
async fn test_integration_new_entrant_wins_with_boost() {
    let engine = engine_with(vec![
        create_candidate("A", 4.9, 47, 0),
        create_candidate("B", 4.5, 3, 0),
    ])
    .await;

    let handle = assert_ok!(engine.submit(web_request()).await);

    assert_eq!(handle.offer().candidate_id, "B");
    assert_eq!(handle.offer().state, MatchState::Pending);
    // The stored composite is never the boosted one
    assert!((handle.offer().scores.composite - 97.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_integration_streak_rotation_beats_boost() {
    let engine = engine_with(vec![
        create_candidate("A", 4.9, 47, 0),
        create_candidate("B", 4.5, 3, 3),
    ])
    .await;

    let handle = assert_ok!(engine.submit(web_request()).await);

    assert_eq!(handle.offer().candidate_id, "A");
}

#[tokio::test]
async fn test_integration_empty_pool_queues_then_retries() {
    let mut offline = create_candidate("A", 4.9, 47, 0);
    offline.is_available = false;
    let engine = engine_with(vec![offline]).await;

    let request = web_request();
    let request_id = request.request_id;

    let err = assert_err!(engine.submit(request).await);
    assert!(matches!(err, AllocationError::NoCandidatesAvailable { request_id: id } if id == request_id));

    // The request is retained for a later attempt
    assert_eq!(engine.queued_count().await, 1);
    assert_eq!(assert_ok!(engine.request_status(request_id).await), AllocationStatus::Queued);
    let mut watcher = assert_ok!(engine.watch_request(request_id).await);

    let offers = assert_ok!(engine.set_availability("A", true).await);

    assert_ok!(watcher.changed().await);
    assert!(matches!(&*watcher.borrow(), AllocationStatus::Offered { offer } if offer.candidate_id == "A"));

    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].request_id, request_id);
    assert_eq!(offers[0].candidate_id, "A");
    assert_eq!(engine.queued_count().await, 0);
}

#[tokio::test]
async fn test_integration_queued_request_waits_for_matching_category() {
    let engine = engine_with(vec![]).await;
    let request = web_request();
    let request_id = request.request_id;

    assert_err!(engine.submit(request).await);

    let mut designer = create_candidate("D", 4.0, 20, 0);
    designer.categories = vec!["Design".to_string()];
    let offers = assert_ok!(engine.register_candidate(designer).await);
    assert!(offers.is_empty());

    let offers = assert_ok!(engine.register_candidate(create_candidate("W", 4.0, 20, 0)).await);
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].request_id, request_id);
    assert_eq!(offers[0].candidate_id, "W");
}

#[tokio::test(start_paused = true)]
async fn test_integration_expiry_reselects_without_expired_candidate() {
    let engine = engine_with(vec![
        create_candidate("A", 4.9, 47, 0),
        create_candidate("B", 4.0, 40, 0),
    ])
    .await;

    let mut handle = assert_ok!(engine.submit(web_request()).await);
    let first = handle.offer().clone();
    assert_eq!(first.candidate_id, "A");
    assert_eq!((first.deadline - first.created_at).num_seconds(), 60);

    // Paused time auto-advances to the deadline
    let status = handle.changed().await;

    let expired = assert_ok!(engine.get_match(first.match_id).await);
    assert_eq!(expired.state, MatchState::Expired);

    let AllocationStatus::Offered { offer } = status else {
        panic!("expected a fresh offer, got {:?}", status);
    };
    assert_eq!(offer.candidate_id, "B");
    assert_ne!(offer.match_id, first.match_id);

    // A decision after expiry loses
    let late = assert_err!(engine.respond(first.match_id, Decision::Accept).await);
    assert!(matches!(late, AllocationError::AlreadyResolved { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_integration_every_candidate_expires() {
    let engine = engine_with(vec![create_candidate("A", 4.9, 47, 0)]).await;

    let mut handle = assert_ok!(engine.submit(web_request()).await);
    let status = handle.settled().await;

    assert_eq!(status, AllocationStatus::Queued);
    assert_eq!(engine.queued_count().await, 1);

    // The expired candidate stays excluded for this request
    let offers = assert_ok!(engine.retry_queued().await);
    assert!(offers.is_empty());
}

#[tokio::test]
async fn test_integration_accept_updates_counters() {
    let engine = engine_with(vec![
        create_candidate("A", 4.9, 47, 0),
        create_candidate("B", 4.5, 30, 2),
        create_candidate("C", 3.0, 30, 1),
    ])
    .await;

    let mut handle = assert_ok!(engine.submit(web_request()).await);
    assert_eq!(handle.offer().candidate_id, "A");

    let accepted = assert_ok!(engine.respond(handle.offer().match_id, Decision::Accept).await);
    assert_eq!(accepted.state, MatchState::Accepted);
    assert!(accepted.resolved_at.is_some());

    let status = handle.settled().await;
    assert!(matches!(status, AllocationStatus::Accepted { .. }));

    let registry = engine.registry();
    let winner = registry.get("A").await.unwrap();
    assert_eq!(winner.completed_jobs, 48);
    assert_eq!(winner.match_streak, 1);
    assert!(winner.last_match_at.is_some());

    assert_eq!(registry.get("B").await.unwrap().match_streak, 0);
    assert_eq!(registry.get("C").await.unwrap().match_streak, 0);
    assert_eq!(registry.get("B").await.unwrap().completed_jobs, 30);
}

#[tokio::test]
async fn test_integration_decline_leaves_counters_and_reoffers() {
    let engine = engine_with(vec![
        create_candidate("A", 4.9, 47, 2),
        create_candidate("B", 4.0, 40, 0),
    ])
    .await;

    let handle = assert_ok!(engine.submit(web_request()).await);
    assert_eq!(handle.offer().candidate_id, "A");

    assert_ok!(engine.respond(handle.offer().match_id, Decision::Decline).await);

    let AllocationStatus::Offered { offer } = handle.status() else {
        panic!("expected a re-offer");
    };
    assert_eq!(offer.candidate_id, "B");

    let declined = engine.registry().get("A").await.unwrap();
    assert_eq!(declined.match_streak, 2);
    assert_eq!(declined.completed_jobs, 47);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_integration_accept_races_timeout() {
    let config = OrchestratorConfig {
        lifecycle: LifecycleConfig {
            decision_window: Duration::from_millis(20),
            ..LifecycleConfig::default()
        },
        ..OrchestratorConfig::default()
    };
    let engine = engine_with_config(vec![create_candidate("A", 4.9, 47, 0)], config).await;

    let handle = assert_ok!(engine.submit(web_request()).await);
    let match_id = handle.offer().match_id;

    tokio::time::sleep(Duration::from_millis(19)).await;
    let outcome = engine.respond(match_id, Decision::Accept).await;

    // Give a losing timer time to fire
    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = assert_ok!(engine.get_match(match_id).await);

    match outcome {
        Ok(accepted) => {
            assert_eq!(accepted.state, MatchState::Accepted);
            assert_eq!(settled.state, MatchState::Accepted);
            assert_eq!(engine.registry().get("A").await.unwrap().completed_jobs, 48);
        }
        Err(AllocationError::AlreadyResolved { state, .. }) => {
            assert_eq!(state, MatchState::Expired);
            assert_eq!(settled.state, MatchState::Expired);
            assert_eq!(engine.registry().get("A").await.unwrap().completed_jobs, 47);
        }
        Err(e) => panic!("unexpected error: {}", e),
    }
}

#[tokio::test]
async fn test_integration_offer_budget_exhausted() {
    let config = OrchestratorConfig {
        max_offers_per_request: 2,
        ..OrchestratorConfig::default()
    };
    let engine = engine_with_config(
        vec![
            create_candidate("A", 4.9, 47, 0),
            create_candidate("B", 4.5, 40, 0),
            create_candidate("C", 4.0, 40, 0),
        ],
        config,
    )
    .await;

    let mut handle = assert_ok!(engine.submit(web_request()).await);
    let request_id = handle.request_id();

    assert_ok!(engine.respond(handle.offer().match_id, Decision::Decline).await);
    let AllocationStatus::Offered { offer } = handle.status() else {
        panic!("expected a second offer");
    };
    assert_ok!(engine.respond(offer.match_id, Decision::Decline).await);

    assert_eq!(handle.settled().await, AllocationStatus::Failed { offers: 2 });
    assert_eq!(
        assert_ok!(engine.request_status(request_id).await),
        AllocationStatus::Failed { offers: 2 }
    );
}

#[tokio::test]
async fn test_integration_handoff_event_after_accept() {
    let engine = engine_with(vec![create_candidate("A", 4.9, 47, 0)]).await;
    let mut events = engine.subscribe();

    let request = web_request();
    let request_id = request.request_id;
    let handle = assert_ok!(engine.submit(request).await);
    assert_ok!(engine.respond(handle.offer().match_id, Decision::Accept).await);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    assert!(matches!(seen.first(), Some(AllocationEvent::MatchOffered { .. })));
    let handoff = seen.iter().find_map(|e| match e {
        AllocationEvent::ProjectHandoff { request, candidate_id, .. } => Some((request.request_id, candidate_id.clone())),
        _ => None,
    });
    assert_eq!(handoff, Some((request_id, "A".to_string())));
}

#[tokio::test]
async fn test_integration_dispatcher_sees_every_handoff_when_observers_lag() {
    let config = OrchestratorConfig {
        event_buffer: 2,
        ..OrchestratorConfig::default()
    };
    let engine = engine_with_config(vec![create_candidate("A", 4.9, 47, 0)], config).await;
    let mut deliveries = engine.attach_dispatcher().await;
    let mut observer = engine.subscribe();

    for _ in 0..2 {
        let handle = assert_ok!(engine.submit(web_request()).await);
        assert_ok!(engine.respond(handle.offer().match_id, Decision::Accept).await);
    }

    // Six broadcast events overflow a buffer of two
    assert!(matches!(observer.try_recv(), Err(TryRecvError::Lagged(_))));

    let mut offered = 0;
    let mut handed_off = 0;
    while let Ok(event) = deliveries.try_recv() {
        match event {
            AllocationEvent::MatchOffered { .. } => offered += 1,
            AllocationEvent::ProjectHandoff { .. } => handed_off += 1,
            other => panic!("unexpected delivery: {:?}", other),
        }
    }
    assert_eq!(offered, 2);
    assert_eq!(handed_off, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_integration_submit_racing_availability_gets_one_offer() {
    for _ in 0..50 {
        let mut offline = create_candidate("A", 4.9, 47, 0);
        offline.is_available = false;
        let engine = engine_with(vec![offline]).await;

        let submitting = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.submit(web_request()).await })
        };
        let coming_online = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.set_availability("A", true).await })
        };

        let submitted = submitting.await.unwrap();
        let retried = assert_ok!(coming_online.await.unwrap());

        // Whichever side wins, the request is offered exactly once and never stranded
        match &submitted {
            Ok(_) | Err(AllocationError::NoCandidatesAvailable { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
        assert_eq!(submitted.is_ok() as usize + retried.len(), 1);
        assert_eq!(engine.queued_count().await, 0);
        assert_eq!(engine.pending_matches().await, 1);
    }
}

#[tokio::test]
async fn test_integration_breakdown_matches_offer_scores() {
    let engine = engine_with(vec![create_candidate("A", 4.0, 47, 0)]).await;
    let request = web_request();

    let breakdown = assert_ok!(engine.breakdown("A", &request).await);
    let handle = assert_ok!(engine.submit(request).await);

    assert_eq!(breakdown.category_fit, handle.offer().scores.category_fit);
    assert_eq!(breakdown.composite, handle.offer().scores.composite);
    assert_eq!(breakdown.recency, 0.0);
}
