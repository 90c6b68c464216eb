//! End-to-end queue workflows through the server registry

use crate::fixtures::{
    create_test_registry, RecordingRenderer, DUEL_SERVER, FULL_SERVER, TRIO_SERVER,
};
use inhouse_queue::engine::snapshot::Transition;
use inhouse_queue::engine::{spawn_renderer, ReadyCheckReply, ServerRegistry, StateChange};
use inhouse_queue::error::{BarReason, QueueError};
use inhouse_queue::ready_check::{CancelReason, ReadyResponse};
use inhouse_queue::types::{GameCancelReason, GameOutcome, GameStatus, Role, ServerId, Side};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Collect every change published so far on `server_id`
///
/// A snapshot round-trip orders this after all earlier commands.
async fn drain(
    registry: &ServerRegistry,
    server_id: ServerId,
    events: &mut broadcast::Receiver<StateChange>,
) -> Vec<Transition> {
    registry.snapshot(server_id).await.unwrap();

    let mut transitions = Vec::new();
    while let Ok(change) = events.try_recv() {
        if change.server_id == server_id {
            transitions.push(change.transition);
        }
    }
    transitions
}

#[tokio::test]
async fn test_complete_duel_workflow() {
    let registry = create_test_registry();
    let mut events = registry.subscribe();

    // Step 1: top player queues, nothing to match yet
    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
    assert!(registry
        .snapshot(DUEL_SERVER)
        .await
        .unwrap()
        .ready_check
        .is_none());

    // Step 2: jungle player completes the role set
    registry.join(DUEL_SERVER, 2, Role::Jungle).await.unwrap();
    let snapshot = registry.snapshot(DUEL_SERVER).await.unwrap();
    let check = snapshot.ready_check.expect("ready check should be pending");
    assert_eq!(check.participants.len(), 2);
    assert!(check.remaining_seconds <= 60);

    // Step 3: both accept
    let reply = registry
        .respond(DUEL_SERVER, 1, ReadyResponse::Accept)
        .await
        .unwrap();
    assert_eq!(
        reply,
        ReadyCheckReply::Waiting {
            accepted: 1,
            total: 2
        }
    );

    let reply = registry
        .respond(DUEL_SERVER, 2, ReadyResponse::Accept)
        .await
        .unwrap();
    let ReadyCheckReply::GameCreated(game_id) = reply else {
        panic!("expected a game, got {:?}", reply);
    };

    // Step 4: game awaits a result and the queue is empty
    let snapshot = registry.snapshot(DUEL_SERVER).await.unwrap();
    assert!(snapshot.queue.is_empty());
    assert!(snapshot.ready_check.is_none());
    assert_eq!(snapshot.games_awaiting_result.len(), 1);
    assert_eq!(snapshot.games_awaiting_result[0].id, game_id);
    assert_eq!(
        snapshot.games_awaiting_result[0].status,
        GameStatus::AwaitingResult
    );

    let names: Vec<&str> = drain(&registry, DUEL_SERVER, &mut events)
        .await
        .iter()
        .map(Transition::name)
        .collect();
    assert_eq!(
        names,
        vec![
            "player_queued",
            "player_queued",
            "ready_check_started",
            "ready_check_answered",
            "game_created"
        ]
    );

    // Step 5: players in the game cannot queue until it is scored
    let error = registry
        .join(DUEL_SERVER, 1, Role::Top)
        .await
        .unwrap_err();
    assert_eq!(
        error,
        QueueError::PlayerBarred {
            player_id: 1,
            reason: BarReason::InGame(game_id)
        }
    );

    // Single-sided games are scored without rating changes
    let changes = registry
        .score_game(DUEL_SERVER, game_id, GameOutcome { winner: Side::Blue })
        .await
        .unwrap();
    assert!(changes.is_empty());

    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
    assert_eq!(registry.stats().games_scored, 1);
}

#[tokio::test]
async fn test_decline_frees_other_players() {
    let registry = create_test_registry();

    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
    registry.join(DUEL_SERVER, 2, Role::Jungle).await.unwrap();

    let reply = registry
        .respond(DUEL_SERVER, 1, ReadyResponse::Decline)
        .await
        .unwrap();
    assert_eq!(
        reply,
        ReadyCheckReply::Cancelled(CancelReason::Declined { player_id: 1 })
    );

    // B keeps its place, A is out of the queue but not barred
    let snapshot = registry.snapshot(DUEL_SERVER).await.unwrap();
    assert!(snapshot.ready_check.is_none());
    assert_eq!(snapshot.queued_for(Role::Jungle), vec![2]);
    assert!(snapshot.queued_for(Role::Top).is_empty());

    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
    let snapshot = registry.snapshot(DUEL_SERVER).await.unwrap();
    assert!(snapshot.ready_check.is_some());
}

#[tokio::test]
async fn test_duo_with_solo_forms_trio() {
    let registry = create_test_registry();

    registry
        .join_duo(TRIO_SERVER, (3, Role::Mid), (4, Role::Support))
        .await
        .unwrap();
    registry.join(TRIO_SERVER, 6, Role::Mid).await.unwrap();
    registry.join(TRIO_SERVER, 5, Role::Top).await.unwrap();

    let snapshot = registry.snapshot(TRIO_SERVER).await.unwrap();
    let check = snapshot.ready_check.expect("trio should be proposed");

    let mut players: Vec<_> = check.slots.iter().map(|s| (s.player_id, s.role)).collect();
    players.sort();
    assert_eq!(
        players,
        vec![(3, Role::Mid), (4, Role::Support), (5, Role::Top)]
    );
    // The unmatched mid player is untouched
    assert!(snapshot.queue.iter().any(|e| e.player_id == 6));
    assert!(snapshot.queue.iter().find(|e| e.player_id == 3).unwrap().duo == Some(4));
}

#[tokio::test]
async fn test_duo_with_same_roles_is_rejected() {
    let registry = create_test_registry();

    let error = registry
        .join_duo(TRIO_SERVER, (3, Role::Mid), (4, Role::Mid))
        .await
        .unwrap_err();
    assert_eq!(error, QueueError::SameRolesForDuo { role: Role::Mid });
    assert!(registry.snapshot(TRIO_SERVER).await.unwrap().queue.is_empty());
}

#[tokio::test]
async fn test_validation_errors_leave_state_unchanged() {
    let registry = create_test_registry();

    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
    let before = registry.snapshot(DUEL_SERVER).await.unwrap();

    assert_eq!(
        registry.join(DUEL_SERVER, 1, Role::Jungle).await.unwrap_err(),
        QueueError::AlreadyQueued { player_id: 1 }
    );
    assert!(matches!(
        registry
            .respond(DUEL_SERVER, 1, ReadyResponse::Accept)
            .await
            .unwrap_err(),
        QueueError::NoActiveCheck { .. }
    ));
    assert!(matches!(
        registry
            .score_game(
                DUEL_SERVER,
                inhouse_queue::utils::generate_game_id(),
                GameOutcome { winner: Side::Red }
            )
            .await
            .unwrap_err(),
        QueueError::UnknownGame { .. }
    ));

    let after = registry.snapshot(DUEL_SERVER).await.unwrap();
    assert_eq!(before.queue, after.queue);
    assert!(after.ready_check.is_none());
}

#[tokio::test]
async fn test_leave_during_ready_check_cancels_it() {
    let registry = create_test_registry();

    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
    registry.join(DUEL_SERVER, 2, Role::Jungle).await.unwrap();
    registry.join(DUEL_SERVER, 3, Role::Top).await.unwrap();

    assert!(registry.leave(DUEL_SERVER, 1).await.unwrap());

    // The next top player is matched with the remaining jungler
    let snapshot = registry.snapshot(DUEL_SERVER).await.unwrap();
    let check = snapshot.ready_check.expect("rematch expected");
    let mut players: Vec<_> = check.slots.iter().map(|s| s.player_id).collect();
    players.sort();
    assert_eq!(players, vec![2, 3]);
    assert!(!registry.leave(DUEL_SERVER, 1).await.unwrap());
}

#[tokio::test]
async fn test_reset_keeps_pending_ready_check() {
    let registry = create_test_registry();

    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
    registry.join(DUEL_SERVER, 2, Role::Jungle).await.unwrap();
    registry.join(DUEL_SERVER, 3, Role::Top).await.unwrap();

    assert_eq!(registry.reset_queue(DUEL_SERVER).await.unwrap(), 1);

    let snapshot = registry.snapshot(DUEL_SERVER).await.unwrap();
    assert!(snapshot.ready_check.is_some());
    assert!(!snapshot.queue.iter().any(|e| e.player_id == 3));

    registry
        .respond(DUEL_SERVER, 1, ReadyResponse::Accept)
        .await
        .unwrap();
    let reply = registry
        .respond(DUEL_SERVER, 2, ReadyResponse::Accept)
        .await
        .unwrap();
    assert!(matches!(reply, ReadyCheckReply::GameCreated(_)));
}

#[tokio::test(start_paused = true)]
async fn test_ready_check_times_out() {
    let registry = create_test_registry();

    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
    registry.join(DUEL_SERVER, 2, Role::Jungle).await.unwrap();
    registry
        .respond(DUEL_SERVER, 1, ReadyResponse::Accept)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(registry
        .snapshot(DUEL_SERVER)
        .await
        .unwrap()
        .ready_check
        .is_some());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let snapshot = registry.snapshot(DUEL_SERVER).await.unwrap();
    assert!(snapshot.ready_check.is_none());
    // Only the player who never answered is dropped
    assert_eq!(snapshot.queued_for(Role::Top), vec![1]);
    assert!(snapshot.queued_for(Role::Jungle).is_empty());

    let stats = registry.stats();
    assert_eq!(stats.ready_checks_timed_out, 1);
    assert_eq!(stats.games_created, 0);
}

#[tokio::test]
async fn test_cancel_game_and_double_scoring() {
    let registry = create_test_registry();

    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
    registry.join(DUEL_SERVER, 2, Role::Jungle).await.unwrap();
    registry
        .respond(DUEL_SERVER, 1, ReadyResponse::Accept)
        .await
        .unwrap();
    let ReadyCheckReply::GameCreated(game_id) = registry
        .respond(DUEL_SERVER, 2, ReadyResponse::Accept)
        .await
        .unwrap()
    else {
        panic!("expected a game");
    };

    registry
        .cancel_game(DUEL_SERVER, game_id, GameCancelReason::PlayersAgreed)
        .await
        .unwrap();

    assert!(matches!(
        registry
            .score_game(DUEL_SERVER, game_id, GameOutcome { winner: Side::Blue })
            .await
            .unwrap_err(),
        QueueError::AlreadyScored { .. }
    ));

    let snapshot = registry.snapshot(DUEL_SERVER).await.unwrap();
    assert!(snapshot.games_awaiting_result.is_empty());
    assert_eq!(snapshot.recent_games.last().unwrap().status, GameStatus::Cancelled);

    // Cancelled games no longer bar their players
    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
}

#[tokio::test]
async fn test_five_versus_five_updates_ratings() {
    let registry = create_test_registry();

    let mut player_id = 100;
    for _ in 0..2 {
        for role in Role::ALL {
            player_id += 1;
            registry.join(FULL_SERVER, player_id, role).await.unwrap();
        }
    }

    let snapshot = registry.snapshot(FULL_SERVER).await.unwrap();
    let check = snapshot.ready_check.expect("ten players make a game");
    assert_eq!(check.slots.iter().filter(|s| s.side == Side::Blue).count(), 5);
    assert!(check.blue_expected_score.is_some());

    let mut game_id = None;
    for slot in &check.slots {
        if let ReadyCheckReply::GameCreated(id) = registry
            .respond(FULL_SERVER, slot.player_id, ReadyResponse::Accept)
            .await
            .unwrap()
        {
            game_id = Some(id);
        }
    }
    let game_id = game_id.expect("last accept creates the game");

    let changes = registry
        .score_game(FULL_SERVER, game_id, GameOutcome { winner: Side::Red })
        .await
        .unwrap();
    assert_eq!(changes.len(), 10);

    let red: Vec<_> = check
        .slots
        .iter()
        .filter(|s| s.side == Side::Red)
        .map(|s| s.player_id)
        .collect();
    for change in &changes {
        let won = red.contains(&change.player_id);
        assert_eq!(change.new_rating.rating > change.old_rating.rating, won);
    }
}

#[tokio::test]
async fn test_renderer_sees_every_transition() {
    let registry = create_test_registry();
    let renderer = Arc::new(RecordingRenderer::new());
    let bridge = spawn_renderer(renderer.clone(), registry.subscribe());

    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
    registry.join(DUEL_SERVER, 2, Role::Jungle).await.unwrap();
    registry.leave(DUEL_SERVER, 2).await.unwrap();
    registry.snapshot(DUEL_SERVER).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while renderer.changes().len() < 4 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("renderer should catch up");

    assert_eq!(
        renderer.transition_names(),
        vec![
            "player_queued",
            "player_queued",
            "ready_check_started",
            "ready_check_cancelled"
        ]
    );
    assert_eq!(
        renderer.count(|t| matches!(
            t,
            Transition::ReadyCheckCancelled {
                reason: CancelReason::Left { player_id: 2 },
                ..
            }
        )),
        1
    );

    // Every change carries the server's snapshot after it was applied
    let last = renderer.changes().pop().unwrap();
    assert_eq!(last.snapshot.queued_for(Role::Top), vec![1]);

    bridge.abort();
}
