//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the server
//! registry, the scheduler, the renderers and the monitoring endpoints
//! together and owns their background tasks.

use crate::config::AppConfig;
use crate::engine::renderer::{spawn_renderer, ChannelRenderer, TracingRenderer};
use crate::engine::{EngineComponents, EngineStats, ServerRegistry};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{
    HealthServer, InstrumentedRenderer, MetricsCollector, MetricsRenderer, MetricsService,
};
use crate::rating::{InMemoryRatingStorage, WengLinRatingCalculator};
use crate::queue::RoleMatchmaker;
use crate::scheduler::{NoopTournamentChecker, Scheduler, TournamentChecker};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Per-server engines
    registry: Arc<ServerRegistry>,

    /// Draws queue channels
    renderer: Arc<dyn ChannelRenderer>,

    /// External result source polled by the scheduler
    checker: Arc<dyn TournamentChecker>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Scheduler task, kept apart so health checks can inspect it
    scheduler_task: Mutex<Option<JoinHandle<()>>>,

    /// Stops the scheduler loop
    shutdown_tx: broadcast::Sender<()>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    started_at: Instant,
}

impl AppState {
    /// Initialize the application with a log renderer and no tournament integration
    pub fn new(config: AppConfig) -> Result<Arc<Self>, ServiceError> {
        Self::with_components(
            config,
            Arc::new(TracingRenderer),
            Arc::new(NoopTournamentChecker),
        )
    }

    /// Initialize the application with the given front end integrations
    pub fn with_components(
        config: AppConfig,
        renderer: Arc<dyn ChannelRenderer>,
        checker: Arc<dyn TournamentChecker>,
    ) -> Result<Arc<Self>, ServiceError> {
        info!("Initializing in-house queue service");
        info!(
            "Configuration: service={}, servers={}, ready_check_timeout={}s",
            config.service.name,
            config.servers.len(),
            config.ready_check.timeout_seconds
        );

        let registry = Arc::new(Self::initialize_engine(&config)?);
        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );
        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Arc::new_cyclic(|app_state: &Weak<AppState>| {
            let health_server = Arc::new(
                HealthServer::new(health_config, metrics_collector.clone())
                    .with_app_state(app_state.clone()),
            );

            Self {
                config,
                registry,
                renderer,
                checker,
                metrics_service: Arc::new(MetricsService::new(metrics_collector, health_server)),
                background_tasks: Mutex::new(Vec::new()),
                scheduler_task: Mutex::new(None),
                shutdown_tx,
                is_running: Arc::new(RwLock::new(false)),
                started_at: Instant::now(),
            }
        }))
    }

    /// Build the server registry from configuration
    fn initialize_engine(config: &AppConfig) -> Result<ServerRegistry, ServiceError> {
        info!("Initializing queue engine components");

        let config_store = config.config_store().map_err(|e| ServiceError::Configuration {
            message: format!("Invalid server settings: {}", e),
        })?;

        let rating_calculator = Arc::new(
            WengLinRatingCalculator::new(config.rating.clone()).map_err(|e| {
                ServiceError::Initialization {
                    message: format!("Failed to initialize rating calculator: {}", e),
                }
            })?,
        );
        let components = EngineComponents::new(
            Arc::new(RoleMatchmaker::new(rating_calculator.clone())),
            Arc::new(InMemoryRatingStorage::new()),
            rating_calculator,
        );

        Ok(ServerRegistry::new(
            Arc::new(config_store),
            components,
            config.engine_settings(),
        ))
    }

    /// Start all background services
    pub async fn start(&self) -> Result<(), ServiceError> {
        info!("Starting in-house queue service");

        // Mark as running
        *self.is_running.write().await = true;

        let spawned = self
            .registry
            .spawn_configured()
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to start server actors: {}", e),
            })?;
        info!("Started {} configured server actors", spawned);

        // Nothing can confirm a ready check that predates this process
        self.registry.cancel_all_ready_checks().await;

        self.start_metrics_service().await;
        self.start_renderers().await;
        self.start_scheduler().await?;
        self.start_health_metrics_task().await;

        info!("In-house queue service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of in-house queue service");

        // Mark as not running
        *self.is_running.write().await = false;

        // Stop the scheduler before the engines it drives
        if self.shutdown_tx.send(()).is_err() {
            debug!("Scheduler was not running");
        }
        let scheduler_task = self.scheduler_task.lock().await.take();
        if let Some(task) = scheduler_task {
            match tokio::time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(())) => info!("Scheduler stopped"),
                Ok(Err(e)) => warn!("Scheduler task failed: {}", e),
                Err(_) => warn!("Scheduler did not stop in time"),
            }
        }

        self.registry.shutdown().await;

        // Stop metrics service
        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("Metrics service stopped");
        }

        self.stop_background_tasks().await;

        let final_stats = self.registry.stats();
        info!("Final engine statistics: {:?}", final_stats);
        info!("In-house queue service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Get the server registry for queue operations
    pub fn registry(&self) -> Arc<ServerRegistry> {
        self.registry.clone()
    }

    /// Get metrics service
    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    pub fn engine_stats(&self) -> EngineStats {
        self.registry.stats()
    }

    /// Whether the scheduler loop is still running
    pub async fn scheduler_running(&self) -> bool {
        match self.scheduler_task.lock().await.as_ref() {
            Some(task) => !task.is_finished(),
            None => false,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Start metrics service
    async fn start_metrics_service(&self) {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });
        self.background_tasks.lock().await.push(metrics_handle);

        info!("Metrics service started on port {}", port);
    }

    /// Bridge state changes to the channel renderer and the metrics collector
    async fn start_renderers(&self) {
        let collector = self.metrics_service.collector();
        let renderer = Arc::new(InstrumentedRenderer::new(
            self.renderer.clone(),
            collector.clone(),
        ));

        let mut tasks = self.background_tasks.lock().await;
        tasks.push(spawn_renderer(renderer, self.registry.subscribe()));
        tasks.push(spawn_renderer(
            Arc::new(MetricsRenderer::new(collector)),
            self.registry.subscribe(),
        ));

        info!("Renderer bridges started");
    }

    async fn start_scheduler(&self) -> Result<(), ServiceError> {
        let settings =
            self.config
                .scheduler_settings()
                .map_err(|e| ServiceError::Configuration {
                    message: format!("Invalid scheduler settings: {}", e),
                })?;

        let scheduler = Scheduler::new(self.registry.clone(), self.checker.clone(), settings)
            .with_metrics(self.metrics_service.collector());
        let shutdown_rx = self.shutdown_tx.subscribe();

        *self.scheduler_task.lock().await = Some(tokio::spawn(scheduler.run(shutdown_rx)));
        Ok(())
    }

    /// Periodically refresh service-level gauges
    async fn start_health_metrics_task(&self) {
        info!("Starting health metrics task (30s interval)...");

        let metrics_collector = self.metrics_service.collector();
        let registry = self.registry.clone();
        let is_running = self.is_running.clone();
        let started_at = self.started_at;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            info!("Health metrics task started");

            while *is_running.read().await {
                interval.tick().await;

                let uptime_seconds = started_at.elapsed().as_secs() as i64;
                metrics_collector
                    .service()
                    .uptime_seconds
                    .set(uptime_seconds);

                let stats = registry.stats();
                metrics_collector.update_from_engine_stats(&stats);

                let registry_healthy = stats.servers_active == registry.server_ids().len();
                metrics_collector.update_component_health("server_registry", registry_healthy);
                metrics_collector.update_health_status(if registry_healthy { 2 } else { 1 });

                debug!(
                    "Updated service health metrics - uptime: {}s, servers: {}",
                    uptime_seconds, stats.servers_active
                );
            }

            info!("Health metrics task stopped");
        });

        self.background_tasks.lock().await.push(task);
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        let task_count = tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("All {} background tasks stopped", task_count);
    }
}
