//! Periodic engine-wide jobs
//!
//! One tick loop drives the daily queue reset and the polling of the
//! external result source. Everything it changes goes through the same
//! registry entry points that interactive commands use.

pub mod checker;

pub use checker::{NoopTournamentChecker, ResolvedGame, Resolution, TournamentChecker};

use crate::engine::registry::ServerRegistry;
use crate::error::QueueError;
use crate::metrics::MetricsCollector;
use crate::types::{GameCancelReason, GameOutcome};
use crate::utils::current_timestamp;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Scheduler tunables
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    /// Local wall-clock time of the daily queue reset
    pub queue_reset_time: Option<NaiveTime>,
    /// Whether to poll the external result source at all
    pub poll_results: bool,
    /// Poll every this many ticks, starting with the first one
    pub result_poll_every: u32,
    /// Games younger than this are not polled
    pub result_min_age: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            queue_reset_time: None,
            poll_results: false,
            result_poll_every: 5,
            result_min_age: Duration::from_secs(15 * 60),
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub queue_reset: bool,
    pub entries_removed: usize,
    pub polled: bool,
    pub resolved: usize,
}

/// Engine-wide periodic job runner
pub struct Scheduler {
    registry: Arc<ServerRegistry>,
    checker: Arc<dyn TournamentChecker>,
    settings: SchedulerSettings,
    ticks: u64,
    /// Minute in which the last reset ran
    last_reset: Option<(NaiveDate, u32, u32)>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<ServerRegistry>,
        checker: Arc<dyn TournamentChecker>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            registry,
            checker,
            settings,
            ticks: 0,
            last_reset: None,
            metrics: None,
        }
    }

    /// Record tick metrics in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Run one tick against the given local wall-clock time
    pub async fn tick(&mut self, now_local: NaiveDateTime) -> TickReport {
        let mut report = TickReport::default();

        if self.reset_due(now_local) {
            self.last_reset = Some(Self::minute_of(now_local));
            report.entries_removed = self.registry.reset_queues().await;
            report.queue_reset = true;
        }

        let every = u64::from(self.settings.result_poll_every.max(1));
        if self.settings.poll_results && self.ticks % every == 0 {
            report.polled = true;
            report.resolved = self.poll_results().await;
        }

        self.ticks += 1;
        report
    }

    /// Tick until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            "Scheduler started (tick every {:?}, reset at {:?})",
            self.settings.tick_interval, self.settings.queue_reset_time
        );

        let mut ticker = interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    let started = std::time::Instant::now();
                    let report = self.tick(chrono::Local::now().naive_local()).await;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_tick(&report, started.elapsed());
                    }
                    debug!(?report, "Scheduler tick");
                }
            }
        }
    }

    fn minute_of(now: NaiveDateTime) -> (NaiveDate, u32, u32) {
        (now.date(), now.hour(), now.minute())
    }

    fn reset_due(&self, now: NaiveDateTime) -> bool {
        let Some(reset_time) = self.settings.queue_reset_time else {
            return false;
        };

        now.hour() == reset_time.hour()
            && now.minute() == reset_time.minute()
            && self.last_reset != Some(Self::minute_of(now))
    }

    /// Ask the result source about old open games and apply its answers
    async fn poll_results(&self) -> usize {
        let min_age = chrono::Duration::from_std(self.settings.result_min_age)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let games = self
            .registry
            .games_awaiting_result(current_timestamp() - min_age)
            .await;
        if games.is_empty() {
            return 0;
        }

        debug!("Polling results for {} games", games.len());
        let resolved = match self.checker.check_results(games).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Result source unavailable, retrying next poll: {}", e);
                return 0;
            }
        };

        let mut applied = 0;
        for game in resolved {
            let result = match game.resolution {
                Resolution::Winner(winner) => self
                    .registry
                    .score_game(game.server_id, game.game_id, GameOutcome { winner })
                    .await
                    .map(|_| ()),
                Resolution::Void => {
                    self.registry
                        .cancel_game(game.server_id, game.game_id, GameCancelReason::Remake)
                        .await
                }
            };

            match result {
                Ok(()) => {
                    info!(
                        "Game {} on server {} resolved externally: {:?}",
                        game.game_id, game.server_id, game.resolution
                    );
                    applied += 1;
                }
                Err(QueueError::AlreadyScored { .. }) => {
                    debug!("Game {} was already resolved", game.game_id);
                }
                Err(e) => warn!("Failed to apply result for game {}: {}", game.game_id, e),
            }
        }

        applied
    }
}
