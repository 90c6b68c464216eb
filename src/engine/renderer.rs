//! Channel renderer interface and bridge
//!
//! Renderers are told about every committed state change. They draw queue
//! channels and are never consulted for decisions.

use crate::engine::snapshot::StateChange;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Trait for anything that displays a server's queue
#[async_trait]
pub trait ChannelRenderer: Send + Sync {
    /// Render the state after `change`
    async fn render(&self, change: &StateChange) -> Result<()>;
}

/// Renderer that writes state changes to the log
#[derive(Debug, Clone, Default)]
pub struct TracingRenderer;

#[async_trait]
impl ChannelRenderer for TracingRenderer {
    async fn render(&self, change: &StateChange) -> Result<()> {
        let snapshot = &change.snapshot;
        info!(
            server_id = change.server_id,
            transition = change.transition.name(),
            queued = snapshot.queue.len(),
            ready_check = snapshot.ready_check.is_some(),
            games_awaiting_result = snapshot.games_awaiting_result.len(),
            "Queue state changed"
        );

        if let Some(check) = &snapshot.ready_check {
            debug!(
                "Ready check {} on server {}: {}s left",
                check.id, change.server_id, check.remaining_seconds
            );
        }

        Ok(())
    }
}

/// Forward state changes to a renderer until the channel closes
///
/// Renderer failures are logged and do not stop the bridge. If the renderer
/// falls behind, skipped changes are logged; the next change carries a full
/// snapshot anyway.
pub fn spawn_renderer(
    renderer: Arc<dyn ChannelRenderer>,
    receiver: broadcast::Receiver<StateChange>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut changes = BroadcastStream::new(receiver);

        while let Some(item) = changes.next().await {
            match item {
                Ok(change) => {
                    if let Err(e) = renderer.render(&change).await {
                        warn!(
                            "Renderer failed for server {} ({}): {}",
                            change.server_id,
                            change.transition.name(),
                            e
                        );
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("Renderer lagged behind, skipped {} state changes", skipped);
                }
            }
        }

        debug!("Renderer bridge stopped");
    })
}
