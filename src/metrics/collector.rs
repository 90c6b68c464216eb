//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the queue service using
//! Prometheus metrics. Engine metrics are derived from committed state changes.

use crate::engine::snapshot::{StateChange, Transition};
use crate::engine::EngineStats;
use crate::ready_check::check::{CancelReason, ReadyResponse};
use crate::scheduler::TickReport;
use crate::types::{GameCancelReason, Role};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the queue service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue-related metrics
    queue_metrics: QueueMetrics,

    /// Ready check metrics
    ready_check_metrics: ReadyCheckMetrics,

    /// Game-related metrics
    game_metrics: GameMetrics,

    /// Periodic job metrics
    scheduler_metrics: SchedulerMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,

    /// Servers with a running actor
    pub servers_active: IntGauge,
}

/// Queue-related metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Players queued, by solo or duo
    pub players_queued_total: IntCounterVec,

    /// Players who left the queue
    pub players_left_total: IntCounter,

    /// Entries removed by queue resets
    pub reset_entries_total: IntCounter,

    /// Players currently waiting, per server and role
    pub players_waiting: IntGaugeVec,
}

/// Ready check metrics
#[derive(Clone)]
pub struct ReadyCheckMetrics {
    pub started_total: IntCounter,
    pub confirmed_total: IntCounter,

    /// Cancelled checks by reason
    pub cancelled_total: IntCounterVec,

    /// Answers by response
    pub answers_total: IntCounterVec,

    /// Pending checks per server (0 or 1)
    pub active: IntGaugeVec,
}

/// Game-related metrics
#[derive(Clone)]
pub struct GameMetrics {
    pub created_total: IntCounter,

    /// Scored games by winning side
    pub scored_total: IntCounterVec,

    /// Cancelled games by reason
    pub cancelled_total: IntCounterVec,

    /// Games waiting for a result, per server
    pub awaiting_result: IntGaugeVec,
}

/// Periodic job metrics
#[derive(Clone)]
pub struct SchedulerMetrics {
    pub ticks_total: IntCounter,
    pub queue_resets_total: IntCounter,
    pub result_polls_total: IntCounter,
    pub results_resolved_total: IntCounter,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Scheduler tick duration
    pub tick_duration: Histogram,

    /// Renderer duration per transition
    pub render_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let ready_check_metrics = ReadyCheckMetrics::new(&registry)?;
        let game_metrics = GameMetrics::new(&registry)?;
        let scheduler_metrics = SchedulerMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            ready_check_metrics,
            game_metrics,
            scheduler_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn ready_check(&self) -> &ReadyCheckMetrics {
        &self.ready_check_metrics
    }

    pub fn game(&self) -> &GameMetrics {
        &self.game_metrics
    }

    pub fn scheduler(&self) -> &SchedulerMetrics {
        &self.scheduler_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Record one committed state change
    ///
    /// Counters follow the transition; gauges are set from the snapshot that
    /// came with it.
    pub fn record_state_change(&self, change: &StateChange) {
        match &change.transition {
            Transition::PlayerQueued { .. } => {
                self.queue_metrics
                    .players_queued_total
                    .with_label_values(&["solo"])
                    .inc();
            }
            Transition::DuoQueued { .. } => {
                self.queue_metrics
                    .players_queued_total
                    .with_label_values(&["duo"])
                    .inc_by(2);
            }
            Transition::PlayerLeft { .. } => self.queue_metrics.players_left_total.inc(),
            Transition::QueueReset { removed } => {
                self.queue_metrics.reset_entries_total.inc_by(*removed as u64);
            }
            Transition::ReadyCheckStarted { .. } => self.ready_check_metrics.started_total.inc(),
            Transition::ReadyCheckAnswered { response, .. } => {
                let response = match response {
                    ReadyResponse::Accept => "accept",
                    ReadyResponse::Decline => "decline",
                };
                self.ready_check_metrics
                    .answers_total
                    .with_label_values(&[response])
                    .inc();
            }
            Transition::ReadyCheckCancelled { reason, .. } => {
                let reason = match reason {
                    CancelReason::Declined { .. } => "declined",
                    CancelReason::Left { .. } => "left",
                    CancelReason::Timeout { .. } => "timeout",
                    CancelReason::ForceCancelled => "force_cancelled",
                };
                self.ready_check_metrics
                    .cancelled_total
                    .with_label_values(&[reason])
                    .inc();
            }
            Transition::GameCreated { .. } => {
                self.ready_check_metrics.confirmed_total.inc();
                self.game_metrics.created_total.inc();
            }
            Transition::GameScored { winner, .. } => {
                self.game_metrics
                    .scored_total
                    .with_label_values(&[winner.as_str()])
                    .inc();
            }
            Transition::GameCancelled { reason, .. } => {
                let reason = match reason {
                    GameCancelReason::PlayersAgreed => "players_agreed",
                    GameCancelReason::Admin => "admin",
                    GameCancelReason::Remake => "remake",
                };
                self.game_metrics
                    .cancelled_total
                    .with_label_values(&[reason])
                    .inc();
            }
        }

        let snapshot = &change.snapshot;
        let server = change.server_id.to_string();

        for role in Role::ALL {
            let waiting = snapshot.queue.iter().filter(|e| e.role == role).count();
            self.queue_metrics
                .players_waiting
                .with_label_values(&[server.as_str(), role.as_str()])
                .set(waiting as i64);
        }
        self.ready_check_metrics
            .active
            .with_label_values(&[server.as_str()])
            .set(i64::from(snapshot.ready_check.is_some()));
        self.game_metrics
            .awaiting_result
            .with_label_values(&[server.as_str()])
            .set(snapshot.games_awaiting_result.len() as i64);
    }

    /// Update gauges from engine stats
    pub fn update_from_engine_stats(&self, stats: &EngineStats) {
        self.service_metrics
            .servers_active
            .set(stats.servers_active as i64);
    }

    /// Record one scheduler tick
    pub fn record_tick(&self, report: &TickReport, duration: Duration) {
        self.scheduler_metrics.ticks_total.inc();
        if report.queue_reset {
            // Removed entries are counted from the QueueReset transitions
            self.scheduler_metrics.queue_resets_total.inc();
        }
        if report.polled {
            self.scheduler_metrics.result_polls_total.inc();
            self.scheduler_metrics
                .results_resolved_total
                .inc_by(report.resolved as u64);
        }

        self.performance_metrics
            .tick_duration
            .observe(duration.as_secs_f64());
    }

    /// Record how long a renderer took for one transition
    pub fn record_render(&self, transition: &str, duration: Duration) {
        self.performance_metrics
            .render_duration
            .with_label_values(&[transition])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("inhouse_queue_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "inhouse_queue_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("inhouse_queue_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        let servers_active = IntGauge::new(
            "inhouse_queue_servers_active",
            "Servers with a running actor",
        )?;
        registry.register(Box::new(servers_active.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
            servers_active,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let players_queued_total = IntCounterVec::new(
            Opts::new("inhouse_queue_players_queued_total", "Total players queued"),
            &["kind"],
        )?;
        registry.register(Box::new(players_queued_total.clone()))?;

        let players_left_total = IntCounter::new(
            "inhouse_queue_players_left_total",
            "Players who left the queue",
        )?;
        registry.register(Box::new(players_left_total.clone()))?;

        let reset_entries_total = IntCounter::new(
            "inhouse_queue_reset_entries_total",
            "Queue entries removed by resets",
        )?;
        registry.register(Box::new(reset_entries_total.clone()))?;

        let players_waiting = IntGaugeVec::new(
            Opts::new(
                "inhouse_queue_players_waiting",
                "Players currently waiting in queue",
            ),
            &["server", "role"],
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        Ok(Self {
            players_queued_total,
            players_left_total,
            reset_entries_total,
            players_waiting,
        })
    }
}

impl ReadyCheckMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let started_total = IntCounter::new(
            "inhouse_queue_ready_checks_started_total",
            "Ready checks started",
        )?;
        registry.register(Box::new(started_total.clone()))?;

        let confirmed_total = IntCounter::new(
            "inhouse_queue_ready_checks_confirmed_total",
            "Ready checks accepted by every participant",
        )?;
        registry.register(Box::new(confirmed_total.clone()))?;

        let cancelled_total = IntCounterVec::new(
            Opts::new(
                "inhouse_queue_ready_checks_cancelled_total",
                "Ready checks cancelled",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(cancelled_total.clone()))?;

        let answers_total = IntCounterVec::new(
            Opts::new("inhouse_queue_ready_check_answers_total", "Ready check answers"),
            &["response"],
        )?;
        registry.register(Box::new(answers_total.clone()))?;

        let active = IntGaugeVec::new(
            Opts::new("inhouse_queue_ready_check_active", "Pending ready checks"),
            &["server"],
        )?;
        registry.register(Box::new(active.clone()))?;

        Ok(Self {
            started_total,
            confirmed_total,
            cancelled_total,
            answers_total,
            active,
        })
    }
}

impl GameMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let created_total =
            IntCounter::new("inhouse_queue_games_created_total", "Total games created")?;
        registry.register(Box::new(created_total.clone()))?;

        let scored_total = IntCounterVec::new(
            Opts::new("inhouse_queue_games_scored_total", "Total games scored"),
            &["winner"],
        )?;
        registry.register(Box::new(scored_total.clone()))?;

        let cancelled_total = IntCounterVec::new(
            Opts::new("inhouse_queue_games_cancelled_total", "Total games cancelled"),
            &["reason"],
        )?;
        registry.register(Box::new(cancelled_total.clone()))?;

        let awaiting_result = IntGaugeVec::new(
            Opts::new(
                "inhouse_queue_games_awaiting_result",
                "Games waiting for a result",
            ),
            &["server"],
        )?;
        registry.register(Box::new(awaiting_result.clone()))?;

        Ok(Self {
            created_total,
            scored_total,
            cancelled_total,
            awaiting_result,
        })
    }
}

impl SchedulerMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let ticks_total =
            IntCounter::new("inhouse_queue_scheduler_ticks_total", "Scheduler ticks")?;
        registry.register(Box::new(ticks_total.clone()))?;

        let queue_resets_total = IntCounter::new(
            "inhouse_queue_scheduled_resets_total",
            "Daily queue resets performed",
        )?;
        registry.register(Box::new(queue_resets_total.clone()))?;

        let result_polls_total = IntCounter::new(
            "inhouse_queue_result_polls_total",
            "Tournament result polls",
        )?;
        registry.register(Box::new(result_polls_total.clone()))?;

        let results_resolved_total = IntCounter::new(
            "inhouse_queue_results_resolved_total",
            "Games resolved by the tournament result source",
        )?;
        registry.register(Box::new(results_resolved_total.clone()))?;

        Ok(Self {
            ticks_total,
            queue_resets_total,
            result_polls_total,
            results_resolved_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let tick_duration = Histogram::with_opts(
            HistogramOpts::new(
                "inhouse_queue_scheduler_tick_duration_seconds",
                "Scheduler tick duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let render_duration = HistogramVec::new(
            HistogramOpts::new(
                "inhouse_queue_render_duration_seconds",
                "Channel render duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["transition"],
        )?;
        registry.register(Box::new(render_duration.clone()))?;

        Ok(Self {
            tick_duration,
            render_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::snapshot::ServerSnapshot;
    use crate::queue::store::QueueEntry;
    use crate::types::Side;
    use crate::utils::{current_timestamp, generate_game_id};

    fn change(transition: Transition, queue: Vec<QueueEntry>) -> StateChange {
        StateChange {
            server_id: 9,
            transition,
            snapshot: ServerSnapshot {
                server_id: 9,
                mode: "5v5".to_string(),
                queue,
                ready_check: None,
                games_awaiting_result: Vec::new(),
                recent_games: Vec::new(),
                taken_at: current_timestamp(),
            },
        }
    }

    fn entry(player_id: u64, role: Role) -> QueueEntry {
        QueueEntry {
            player_id,
            server_id: 9,
            role,
            duo: None,
            queued_at: current_timestamp(),
            sequence: player_id,
        }
    }

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _queue = collector.queue();
        let _ready_check = collector.ready_check();
        let _game = collector.game();
        let _scheduler = collector.scheduler();
        let _performance = collector.performance();
    }

    #[test]
    fn test_state_changes_update_counters_and_gauges() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_state_change(&change(
            Transition::PlayerQueued {
                player_id: 1,
                role: Role::Mid,
            },
            vec![entry(1, Role::Mid)],
        ));
        collector.record_state_change(&change(
            Transition::DuoQueued {
                players: [(2, Role::Mid), (3, Role::Top)],
            },
            vec![entry(1, Role::Mid), entry(2, Role::Mid), entry(3, Role::Top)],
        ));

        let queue = collector.queue();
        assert_eq!(queue.players_queued_total.with_label_values(&["solo"]).get(), 1);
        assert_eq!(queue.players_queued_total.with_label_values(&["duo"]).get(), 2);
        assert_eq!(queue.players_waiting.with_label_values(&["9", "mid"]).get(), 2);
        assert_eq!(queue.players_waiting.with_label_values(&["9", "top"]).get(), 1);

        collector.record_state_change(&change(
            Transition::GameScored {
                game_id: generate_game_id(),
                winner: Side::Red,
            },
            Vec::new(),
        ));
        assert_eq!(
            collector.game().scored_total.with_label_values(&["red"]).get(),
            1
        );
        assert_eq!(queue.players_waiting.with_label_values(&["9", "mid"]).get(), 0);
    }

    #[test]
    fn test_cancellations_are_labelled() {
        let collector = MetricsCollector::new().unwrap();
        let check_id = crate::utils::generate_ready_check_id();

        collector.record_state_change(&change(
            Transition::ReadyCheckCancelled {
                check_id,
                reason: CancelReason::Timeout {
                    non_responders: vec![4],
                },
            },
            Vec::new(),
        ));

        let cancelled = &collector.ready_check().cancelled_total;
        assert_eq!(cancelled.with_label_values(&["timeout"]).get(), 1);
        assert_eq!(cancelled.with_label_values(&["declined"]).get(), 0);
    }

    #[test]
    fn test_tick_recording() {
        let collector = MetricsCollector::new().unwrap();
        let report = TickReport {
            queue_reset: true,
            entries_removed: 7,
            polled: true,
            resolved: 2,
        };

        collector.record_tick(&report, Duration::from_millis(3));

        assert_eq!(collector.scheduler().ticks_total.get(), 1);
        assert_eq!(collector.scheduler().queue_resets_total.get(), 1);
        assert_eq!(collector.scheduler().results_resolved_total.get(), 2);
        assert_eq!(collector.queue().reset_entries_total.get(), 0);
    }

    #[test]
    fn test_scheduled_reset_counts_entries_once() {
        let collector = MetricsCollector::new().unwrap();

        // A scheduled reset reaches the collector both as a transition and a tick
        collector.record_state_change(&change(Transition::QueueReset { removed: 3 }, Vec::new()));
        collector.record_tick(
            &TickReport {
                queue_reset: true,
                entries_removed: 3,
                polled: false,
                resolved: 0,
            },
            Duration::from_millis(1),
        );

        assert_eq!(collector.queue().reset_entries_total.get(), 3);
        assert_eq!(collector.scheduler().queue_resets_total.get(), 1);
    }

    #[test]
    fn test_engine_stats_and_health() {
        let collector = MetricsCollector::new().unwrap();
        let stats = EngineStats {
            servers_active: 3,
            ..Default::default()
        };

        collector.update_from_engine_stats(&stats);
        collector.update_health_status(2);
        collector.update_component_health("scheduler", true);

        assert_eq!(collector.service().servers_active.get(), 3);
        assert_eq!(collector.service().health_status.get(), 2);
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().unwrap();
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.elapsed();
        assert!(duration >= Duration::from_millis(10));

        let final_duration = timer.stop();
        assert!(final_duration >= Duration::from_millis(10));
    }
}
