//! Metrics and monitoring for the queue service
//!
//! This module provides metrics collection, health monitoring,
//! and performance tracking for the queue service.

pub mod collector;
pub mod health;

pub use collector::{
    GameMetrics, MetricsCollector, PerformanceMetrics, QueueMetrics, ReadyCheckMetrics,
    SchedulerMetrics, ServiceMetrics,
};
pub use health::{HealthEndpoints, HealthServer};

use crate::engine::renderer::ChannelRenderer;
use crate::engine::snapshot::StateChange;
use async_trait::async_trait;
use std::sync::Arc;

/// Unified metrics service that combines all monitoring capabilities
#[derive(Clone)]
pub struct MetricsService {
    collector: Arc<MetricsCollector>,
    health_server: Arc<HealthServer>,
}

impl MetricsService {
    /// Create a new metrics service
    pub fn new(collector: Arc<MetricsCollector>, health_server: Arc<HealthServer>) -> Self {
        Self {
            collector,
            health_server,
        }
    }

    /// Get the metrics collector
    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Get the health server
    pub fn health_server(&self) -> Arc<HealthServer> {
        self.health_server.clone()
    }

    /// Start the metrics service (health endpoints)
    pub async fn start(&self) -> anyhow::Result<()> {
        self.health_server.start().await
    }

    /// Stop the metrics service
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.health_server.stop().await
    }
}

/// Renderer that feeds state changes into the collector
pub struct MetricsRenderer {
    collector: Arc<MetricsCollector>,
}

impl MetricsRenderer {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl ChannelRenderer for MetricsRenderer {
    async fn render(&self, change: &StateChange) -> anyhow::Result<()> {
        self.collector.record_state_change(change);
        Ok(())
    }
}

/// Wraps a renderer and records how long each render takes
pub struct InstrumentedRenderer {
    inner: Arc<dyn ChannelRenderer>,
    collector: Arc<MetricsCollector>,
}

impl InstrumentedRenderer {
    pub fn new(inner: Arc<dyn ChannelRenderer>, collector: Arc<MetricsCollector>) -> Self {
        Self { inner, collector }
    }
}

#[async_trait]
impl ChannelRenderer for InstrumentedRenderer {
    async fn render(&self, change: &StateChange) -> anyhow::Result<()> {
        let timer = self.collector.start_timer();
        let result = self.inner.render(change).await;
        self.collector
            .record_render(change.transition.name(), timer.stop());
        result
    }
}
