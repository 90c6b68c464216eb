//! Scheduler jobs running against live server actors

use crate::fixtures::{create_test_registry, ScriptedChecker, DUEL_SERVER, FULL_SERVER};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use inhouse_queue::engine::{ReadyCheckReply, ServerRegistry};
use inhouse_queue::ready_check::ReadyResponse;
use inhouse_queue::scheduler::{ResolvedGame, Resolution, Scheduler, SchedulerSettings};
use inhouse_queue::types::{GameId, GameStatus, Role, Side};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .unwrap()
}

fn settings() -> SchedulerSettings {
    SchedulerSettings {
        tick_interval: Duration::from_secs(60),
        queue_reset_time: NaiveTime::from_hms_opt(6, 0, 0),
        poll_results: true,
        result_poll_every: 1,
        result_min_age: Duration::ZERO,
    }
}

/// Queue and confirm a duel game on DUEL_SERVER
async fn duel_game(registry: &ServerRegistry) -> GameId {
    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
    registry.join(DUEL_SERVER, 2, Role::Jungle).await.unwrap();
    registry
        .respond(DUEL_SERVER, 1, ReadyResponse::Accept)
        .await
        .unwrap();
    match registry
        .respond(DUEL_SERVER, 2, ReadyResponse::Accept)
        .await
        .unwrap()
    {
        ReadyCheckReply::GameCreated(game_id) => game_id,
        other => panic!("expected a game, got {:?}", other),
    }
}

#[tokio::test]
async fn test_daily_reset_respects_server_settings() {
    let registry = create_test_registry();
    let mut scheduler = Scheduler::new(
        registry.clone(),
        Arc::new(ScriptedChecker::new()),
        SchedulerSettings {
            poll_results: false,
            ..settings()
        },
    );

    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
    registry.join(FULL_SERVER, 1, Role::Top).await.unwrap();

    assert!(!scheduler.tick(at(5, 59)).await.queue_reset);

    let report = scheduler.tick(at(6, 0)).await;
    assert!(report.queue_reset);
    assert_eq!(report.entries_removed, 1);

    // A second tick within the same minute does not reset again
    registry.join(DUEL_SERVER, 1, Role::Top).await.unwrap();
    assert!(!scheduler.tick(at(6, 0)).await.queue_reset);

    assert_eq!(registry.snapshot(DUEL_SERVER).await.unwrap().queue.len(), 1);
    assert_eq!(registry.snapshot(FULL_SERVER).await.unwrap().queue.len(), 1);
}

#[tokio::test]
async fn test_external_results_close_games() {
    let registry = create_test_registry();
    let checker = Arc::new(ScriptedChecker::new());
    let mut scheduler = Scheduler::new(registry.clone(), checker.clone(), settings());

    let game_id = duel_game(&registry).await;

    // Nothing known yet: the game stays open
    let report = scheduler.tick(at(12, 0)).await;
    assert!(report.polled);
    assert_eq!(report.resolved, 0);
    assert_eq!(checker.polls()[0].len(), 1);

    checker.resolve(ResolvedGame {
        server_id: DUEL_SERVER,
        game_id,
        resolution: Resolution::Winner(Side::Blue),
    });
    assert_eq!(scheduler.tick(at(12, 1)).await.resolved, 1);

    let snapshot = registry.snapshot(DUEL_SERVER).await.unwrap();
    assert!(snapshot.games_awaiting_result.is_empty());
    assert_eq!(snapshot.recent_games.last().unwrap().status, GameStatus::Scored);

    // Closed games are no longer offered to the result source
    scheduler.tick(at(12, 2)).await;
    assert_eq!(checker.polls().len(), 2);
}

#[tokio::test]
async fn test_void_results_cancel_games() {
    let registry = create_test_registry();
    let checker = Arc::new(ScriptedChecker::new());
    let mut scheduler = Scheduler::new(registry.clone(), checker.clone(), settings());

    let game_id = duel_game(&registry).await;
    checker.resolve(ResolvedGame {
        server_id: DUEL_SERVER,
        game_id,
        resolution: Resolution::Void,
    });

    assert_eq!(scheduler.tick(at(12, 0)).await.resolved, 1);
    let snapshot = registry.snapshot(DUEL_SERVER).await.unwrap();
    assert_eq!(
        snapshot.recent_games.last().unwrap().status,
        GameStatus::Cancelled
    );
    assert_eq!(registry.stats().games_cancelled, 1);
}

#[tokio::test]
async fn test_unreachable_result_source_is_retried() {
    let registry = create_test_registry();
    let checker = Arc::new(ScriptedChecker::new());
    let mut scheduler = Scheduler::new(registry.clone(), checker.clone(), settings());

    let game_id = duel_game(&registry).await;
    checker.resolve(ResolvedGame {
        server_id: DUEL_SERVER,
        game_id,
        resolution: Resolution::Winner(Side::Blue),
    });

    checker.set_failing(true);
    assert_eq!(scheduler.tick(at(12, 0)).await.resolved, 0);
    assert_eq!(
        registry
            .snapshot(DUEL_SERVER)
            .await
            .unwrap()
            .games_awaiting_result
            .len(),
        1
    );

    checker.set_failing(false);
    assert_eq!(scheduler.tick(at(12, 1)).await.resolved, 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_stops_on_shutdown() {
    let registry = create_test_registry();
    let scheduler = Scheduler::new(registry, Arc::new(ScriptedChecker::new()), settings());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let task = tokio::spawn(scheduler.run(shutdown_rx));
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert!(!task.is_finished());

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("scheduler should stop")
        .unwrap();
}
