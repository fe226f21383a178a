//! Integration tests for the scrimmage matchmaking engine
//!
//! These tests validate the entire system working together over the
//! in-process store: the tick pipeline end to end, ticket lifecycle
//! consistency under concurrency, evaluator filtering, the assignment
//! watcher, and graceful shutdown of an in-flight tick.

mod fixtures;

use fixtures::{build_system, create_1v1_ticket, CountingStore, SlowAssigner};
use futures::future::BoxFuture;
use scrimmage::error::{EngineError, Result};
use scrimmage::pipeline::functions::{
    EvaluatorFn, MatchFunctionFn, RandomAssigner, Simple1v1MatchFunction,
};
use scrimmage::pool::Pool;
use scrimmage::store::memory::MemoryStore;
use scrimmage::ticket::index::{ALL_TICKETS_KEY, PENDING_TICKETS_KEY};
use scrimmage::types::{AssignmentGroup, Match, MatchProfile, Ticket};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn simple_1v1_profile() -> MatchProfile {
    MatchProfile::new("simple-1vs1", vec![Pool::unfiltered("test-pool")])
}

#[tokio::test]
async fn test_simple_1v1_match() {
    let store = MemoryStore::new();
    let system = build_system(
        Arc::new(store.clone()),
        Arc::new(RandomAssigner),
        None,
    );
    system
        .pipeline
        .register(simple_1v1_profile(), Arc::new(Simple1v1MatchFunction));

    let t1 = create_1v1_ticket(&system.ticket_service).await;
    let t2 = create_1v1_ticket(&system.ticket_service).await;

    system.pipeline.run_tick().await.unwrap();

    // Both tickets left the active index and share one connection.
    let a1 = system.assigner_service.get_assignment(&t1.id).await.unwrap();
    let a2 = system.assigner_service.get_assignment(&t2.id).await.unwrap();
    assert_eq!(a1.connection, a2.connection);
    assert!(a1.connection.starts_with("gs-"));
    for t in [&t1, &t2] {
        assert!(!store.set_contains(ALL_TICKETS_KEY, &t.id));
        assert!(!store.zset_contains(PENDING_TICKETS_KEY, &t.id));
    }

    // Each watch stream emits the assignment exactly once.
    for ticket in [&t1, &t2] {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = system.watcher.clone();
        let ticket_id = ticket.id.clone();
        let watch = tokio::spawn(async move {
            watcher
                .watch(&ticket_id, move |assignment| {
                    tx.send(assignment).map_err(|e| anyhow::anyhow!("{e}"))
                })
                .await
        });

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.connection, a1.connection);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(rx.try_recv().is_err(), "watch emitted more than once");
        watch.abort();
    }
}

#[tokio::test]
async fn test_unmatched_ticket_released() {
    let store = MemoryStore::new();
    let system = build_system(
        Arc::new(store.clone()),
        Arc::new(RandomAssigner),
        None,
    );
    system
        .pipeline
        .register(simple_1v1_profile(), Arc::new(Simple1v1MatchFunction));

    let tickets = vec![
        create_1v1_ticket(&system.ticket_service).await,
        create_1v1_ticket(&system.ticket_service).await,
        create_1v1_ticket(&system.ticket_service).await,
    ];

    system.pipeline.run_tick().await.unwrap();

    let mut assigned = Vec::new();
    let mut leftover = Vec::new();
    for t in &tickets {
        match system.assigner_service.get_assignment(&t.id).await {
            Ok(_) => assigned.push(t.id.clone()),
            Err(e) => {
                assert!(EngineError::is_assignment_not_found(&e));
                leftover.push(t.id.clone());
            }
        }
    }
    assert_eq!(assigned.len(), 2);
    assert_eq!(leftover.len(), 1);

    // The leftover is back to active and eligible next tick.
    let id = &leftover[0];
    assert!(store.set_contains(ALL_TICKETS_KEY, id));
    assert!(!store.zset_contains(PENDING_TICKETS_KEY, id));

    // Partner it and tick again.
    let partner = create_1v1_ticket(&system.ticket_service).await;
    system.pipeline.run_tick().await.unwrap();
    assert!(system.assigner_service.get_assignment(id).await.is_ok());
    assert!(system
        .assigner_service
        .get_assignment(&partner.id)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_evaluator_rejects_match() {
    let store = MemoryStore::new();

    // Deterministic match function: sort the pool by ticket ID, pair off,
    // and name the proposals m1, m2, ...
    let mmf = MatchFunctionFn(
        |profile: MatchProfile, pools: std::collections::HashMap<String, Vec<Ticket>>| {
            Box::pin(async move {
                let mut tickets: Vec<Ticket> =
                    pools.get("test-pool").cloned().unwrap_or_default();
                tickets.sort_by(|a, b| a.id.cmp(&b.id));

                let matches = tickets
                    .chunks_exact(2)
                    .enumerate()
                    .map(|(i, pair)| Match {
                        match_id: format!("m{}", i + 1),
                        match_profile: profile.name.clone(),
                        match_function: "pair-sorted".to_string(),
                        tickets: pair.to_vec(),
                        backfill: None,
                        extensions: Vec::new(),
                        allocate_gameserver: true,
                    })
                    .collect();
                Ok(matches)
            }) as BoxFuture<'static, Result<Vec<Match>>>
        },
    );

    let evaluator = EvaluatorFn(|_matches: Vec<Match>| {
        Box::pin(async move { Ok(vec!["m1".to_string()]) })
            as BoxFuture<'static, Result<Vec<String>>>
    });

    let system = build_system(
        Arc::new(store.clone()),
        Arc::new(RandomAssigner),
        Some(Arc::new(evaluator)),
    );
    system.pipeline.register(simple_1v1_profile(), Arc::new(mmf));

    let mut tickets = vec![
        create_1v1_ticket(&system.ticket_service).await,
        create_1v1_ticket(&system.ticket_service).await,
        create_1v1_ticket(&system.ticket_service).await,
        create_1v1_ticket(&system.ticket_service).await,
    ];
    tickets.sort_by(|a, b| a.id.cmp(&b.id));

    system.pipeline.run_tick().await.unwrap();

    // m1 = first sorted pair: assigned. m2's tickets: released to active.
    for t in &tickets[..2] {
        assert!(system.assigner_service.get_assignment(&t.id).await.is_ok());
        assert!(!store.set_contains(ALL_TICKETS_KEY, &t.id));
    }
    for t in &tickets[2..] {
        let err = system
            .assigner_service
            .get_assignment(&t.id)
            .await
            .unwrap_err();
        assert!(EngineError::is_assignment_not_found(&err));
        assert!(store.set_contains(ALL_TICKETS_KEY, &t.id));
        assert!(!store.zset_contains(PENDING_TICKETS_KEY, &t.id));
    }
}

#[tokio::test]
async fn test_delete_racing_claim_stays_consistent() {
    let store = MemoryStore::new();
    let system = build_system(
        Arc::new(store.clone()),
        Arc::new(RandomAssigner),
        None,
    );

    for _ in 0..10 {
        let ticket = create_1v1_ticket(&system.ticket_service).await;

        let delete = {
            let tickets = system.ticket_service.clone();
            let id = ticket.id.clone();
            tokio::spawn(async move { tickets.delete_ticket(&CancellationToken::new(), &id).await })
        };
        let claim = {
            let tickets = system.ticket_service.clone();
            tokio::spawn(async move {
                tickets
                    .claim_active_ticket_ids(&CancellationToken::new(), 100)
                    .await
            })
        };

        delete.await.unwrap().unwrap();
        claim.await.unwrap().unwrap();

        // The fetch lock serializes the two: the ticket is either fully
        // gone, or it was claimed first and the delete then cleared it.
        // It must never sit in pending without being in the live index.
        let in_all = store.set_contains(ALL_TICKETS_KEY, &ticket.id);
        let in_pending = store.zset_contains(PENDING_TICKETS_KEY, &ticket.id);
        assert!(
            !(in_pending && !in_all),
            "ticket {} present only in the pending index",
            ticket.id
        );
        assert!(!in_all && !in_pending, "delete must win eventually");
    }
}

#[tokio::test]
async fn test_watcher_polls_and_emits_once() {
    let store = CountingStore::new(MemoryStore::new());
    let system = build_system(
        Arc::new(store.clone()),
        Arc::new(RandomAssigner),
        None,
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let watcher = system.watcher.clone();
    let watch = tokio::spawn(async move {
        watcher
            .watch("watched-ticket", move |assignment| {
                tx.send(assignment).map_err(|e| anyhow::anyhow!("{e}"))
            })
            .await
    });

    // 100 ms poll interval: after ~350 ms at least three reads happened and
    // nothing was emitted.
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(store.assignment_get_count() >= 3);
    assert!(rx.try_recv().is_err());

    system
        .assigner_service
        .assign_tickets(&CancellationToken::new(), &[AssignmentGroup {
            ticket_ids: vec!["watched-ticket".to_string()],
            assignment: scrimmage::types::Assignment {
                connection: "gs-fixed".to_string(),
                extensions: Vec::new(),
            },
        }])
        .await
        .unwrap();

    let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.connection, "gs-fixed");

    // Identical re-reads never re-emit.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err());
    watch.abort();
}

#[tokio::test]
async fn test_inflight_tick_completes_across_shutdown() {
    let store = MemoryStore::new();
    let assigner = Arc::new(SlowAssigner::new(Duration::from_millis(200)));
    let started = assigner.started.clone();

    let system = build_system(Arc::new(store.clone()), assigner, None);
    system
        .pipeline
        .register(simple_1v1_profile(), Arc::new(Simple1v1MatchFunction));

    let t1 = create_1v1_ticket(&system.ticket_service).await;
    let t2 = create_1v1_ticket(&system.ticket_service).await;

    let shutdown = CancellationToken::new();
    let run = {
        let pipeline = system.pipeline.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { pipeline.run(shutdown).await })
    };

    // Cancel while the tick is inside the assigner, before AssignTickets.
    started.notified().await;
    shutdown.cancel();

    // The supervisor returns only after the in-flight tick completed.
    tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("supervisor did not stop")
        .unwrap();

    // That tick's matches are fully applied.
    let a1 = system.assigner_service.get_assignment(&t1.id).await.unwrap();
    let a2 = system.assigner_service.get_assignment(&t2.id).await.unwrap();
    assert_eq!(a1.connection, a2.connection);
    assert!(!store.set_contains(ALL_TICKETS_KEY, &t1.id));
    assert!(!store.set_contains(ALL_TICKETS_KEY, &t2.id));

    // No further tick fires after shutdown.
    let t3 = create_1v1_ticket(&system.ticket_service).await;
    let t4 = create_1v1_ticket(&system.ticket_service).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    for t in [&t3, &t4] {
        let err = system
            .assigner_service
            .get_assignment(&t.id)
            .await
            .unwrap_err();
        assert!(EngineError::is_assignment_not_found(&err));
        assert!(store.set_contains(ALL_TICKETS_KEY, &t.id));
    }
}

#[tokio::test]
async fn test_assigner_failure_defers_release() {
    let store = MemoryStore::new();

    struct ExplodingAssigner;
    #[async_trait::async_trait]
    impl scrimmage::pipeline::functions::Assigner for ExplodingAssigner {
        async fn assign(
            &self,
            _matches: &[Match],
        ) -> Result<Vec<AssignmentGroup>> {
            Err(anyhow::anyhow!("allocator offline"))
        }
    }

    let system = build_system(Arc::new(store.clone()), Arc::new(ExplodingAssigner), None);
    system
        .pipeline
        .register(simple_1v1_profile(), Arc::new(Simple1v1MatchFunction));

    let t1 = create_1v1_ticket(&system.ticket_service).await;
    let t2 = create_1v1_ticket(&system.ticket_service).await;

    let err = system.pipeline.run_tick().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::MatchAssignFailed { .. })
    ));

    // The deferred release put both tickets back to active.
    for t in [&t1, &t2] {
        assert!(store.set_contains(ALL_TICKETS_KEY, &t.id));
        assert!(!store.zset_contains(PENDING_TICKETS_KEY, &t.id));
    }
}
