//! Many concurrent commands against the server actors

use crate::fixtures::{create_test_registry, DUEL_SERVER, FULL_SERVER, TRIO_SERVER};
use futures::future::join_all;
use inhouse_queue::engine::ReadyCheckReply;
use inhouse_queue::error::QueueError;
use inhouse_queue::ready_check::ReadyResponse;
use inhouse_queue::types::{PlayerId, Role};
use std::collections::HashSet;
use std::time::Instant;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_concurrent_joins_on_one_server() {
    let registry = create_test_registry();
    let started = Instant::now();

    let joins = (0..40u64).map(|player| {
        let registry = registry.clone();
        let role = Role::ALL[(player % 5) as usize];
        async move { registry.join(FULL_SERVER, player, role).await }
    });
    for result in join_all(joins).await {
        assert_ok!(result);
    }

    let snapshot = registry.snapshot(FULL_SERVER).await.unwrap();
    assert_eq!(snapshot.queue.len(), 40);

    let unique: HashSet<PlayerId> = snapshot.queue.iter().map(|e| e.player_id).collect();
    assert_eq!(unique.len(), 40);

    // Exactly one check, even though enough players joined for four games
    let check = snapshot.ready_check.expect("a ready check should be pending");
    assert_eq!(check.slots.len(), 10);
    assert_eq!(registry.stats().ready_checks_started, 1);

    println!("40 concurrent joins processed in {:?}", started.elapsed());
}

#[tokio::test]
async fn test_duplicate_joins_race() {
    let registry = create_test_registry();

    let joins = (0..10).map(|_| {
        let registry = registry.clone();
        async move { registry.join(FULL_SERVER, 7, Role::Mid).await }
    });
    let results = join_all(joins).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, QueueError::AlreadyQueued { player_id: 7 })));
}

#[tokio::test]
async fn test_servers_are_independent() {
    let registry = create_test_registry();

    // The same players queue everywhere at once
    let joins = [DUEL_SERVER, TRIO_SERVER, FULL_SERVER]
        .into_iter()
        .flat_map(|server_id| {
            [(1, Role::Top), (2, Role::Jungle), (3, Role::Mid), (4, Role::Support)]
                .into_iter()
                .map(move |(player, role)| (server_id, player, role))
        })
        .map(|(server_id, player, role)| {
            let registry = registry.clone();
            async move { registry.join(server_id, player, role).await }
        });
    for result in join_all(joins).await {
        assert_ok!(result);
    }

    let duel = registry.snapshot(DUEL_SERVER).await.unwrap();
    let trio = registry.snapshot(TRIO_SERVER).await.unwrap();
    let full = registry.snapshot(FULL_SERVER).await.unwrap();

    // Roles outside a mode stay queued but are never offered
    let duel_check = duel.ready_check.expect("duel check should be pending");
    assert_eq!(duel_check.slots.len(), 2);
    assert_eq!(duel.queue.len(), 4);

    let trio_check = trio.ready_check.expect("trio check should be pending");
    assert_eq!(trio_check.slots.len(), 3);
    assert!(trio_check.slots.iter().all(|slot| slot.player_id != 2));

    assert!(full.ready_check.is_none());
    assert_eq!(full.queue.len(), 4);
    assert_eq!(registry.stats().servers_active, 3);
}

#[tokio::test]
async fn test_concurrent_accepts_create_one_game() {
    let registry = create_test_registry();

    for player in 0..10u64 {
        registry
            .join(FULL_SERVER, player, Role::ALL[(player % 5) as usize])
            .await
            .unwrap();
    }

    let accepts = (0..10u64).map(|player| {
        let registry = registry.clone();
        async move {
            registry
                .respond(FULL_SERVER, player, ReadyResponse::Accept)
                .await
        }
    });
    let replies = join_all(accepts).await;

    let created = replies
        .iter()
        .filter(|r| matches!(r, Ok(ReadyCheckReply::GameCreated(_))))
        .count();
    assert_eq!(created, 1);

    let snapshot = registry.snapshot(FULL_SERVER).await.unwrap();
    assert!(snapshot.queue.is_empty());
    assert!(snapshot.ready_check.is_none());
    assert_eq!(snapshot.games_awaiting_result.len(), 1);
}
