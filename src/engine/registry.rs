//! Registry of server actors
//!
//! The registry is built once at start-up and shared by reference. It spawns
//! a server's actor the first time a player queues there (or at start-up for
//! configured servers) and routes every operation to it. Lookups never spawn.

use crate::config::server::ConfigStore;
use crate::engine::actor::{ServerActor, ServerHandle};
use crate::engine::server::{ReadyCheckReply, ServerState};
use crate::engine::snapshot::{ServerSnapshot, StateChange};
use crate::engine::{EngineComponents, EngineSettings, EngineStats};
use crate::error::{EngineResult, QueueError};
use crate::ready_check::check::ReadyResponse;
use crate::types::{GameCancelReason, GameId, GameOutcome, PlayerId, RatingChange, Role, ServerId};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Open game of one server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerGame {
    pub server_id: ServerId,
    pub game_id: GameId,
}

/// Owner of all server actors
pub struct ServerRegistry {
    servers: RwLock<HashMap<ServerId, ServerHandle>>,
    config_store: Arc<dyn ConfigStore>,
    components: EngineComponents,
    settings: EngineSettings,
    events: broadcast::Sender<StateChange>,
    stats: Arc<RwLock<EngineStats>>,
}

impl ServerRegistry {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        components: EngineComponents,
        settings: EngineSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_buffer.max(1));

        Self {
            servers: RwLock::new(HashMap::new()),
            config_store,
            components,
            settings,
            events,
            stats: Arc::new(RwLock::new(EngineStats::default())),
        }
    }

    fn lock_error() -> QueueError {
        QueueError::InternalError {
            message: "Failed to acquire server registry lock".to_string(),
        }
    }

    /// Handle of a server, spawning its actor if needed
    pub fn server(&self, server_id: ServerId) -> EngineResult<ServerHandle> {
        {
            let servers = self.servers.read().map_err(|_| Self::lock_error())?;
            if let Some(handle) = servers.get(&server_id) {
                if handle.is_alive() {
                    return Ok(handle.clone());
                }
            }
        }

        let mut servers = self.servers.write().map_err(|_| Self::lock_error())?;
        // Another caller may have spawned it while we waited for the lock
        if let Some(handle) = servers.get(&server_id) {
            if handle.is_alive() {
                return Ok(handle.clone());
            }
            warn!("Server actor {} stopped unexpectedly, respawning", server_id);
        }

        let state = ServerState::new(
            server_id,
            self.config_store.server_settings(server_id),
            self.settings.clone(),
            self.components.clone(),
        );
        let handle = ServerActor::spawn(
            state,
            self.settings.command_buffer,
            self.events.clone(),
            self.stats.clone(),
        );
        servers.insert(server_id, handle.clone());
        info!("Spawned actor for server {}", server_id);

        Ok(handle)
    }

    /// Handle of a server whose actor was already spawned
    pub fn get(&self, server_id: ServerId) -> Option<ServerHandle> {
        match self.servers.read() {
            Ok(servers) => servers.get(&server_id).cloned(),
            Err(_) => None,
        }
    }

    /// Spawn actors for every server with explicit settings
    pub fn spawn_configured(&self) -> EngineResult<usize> {
        let server_ids = self.config_store.server_ids();
        for server_id in &server_ids {
            self.server(*server_id)?;
        }
        Ok(server_ids.len())
    }

    /// Servers with a running actor, in id order
    pub fn server_ids(&self) -> Vec<ServerId> {
        let mut ids: Vec<ServerId> = match self.servers.read() {
            Ok(servers) => servers.keys().copied().collect(),
            Err(_) => Vec::new(),
        };
        ids.sort_unstable();
        ids
    }

    fn handles(&self) -> Vec<ServerHandle> {
        let mut handles: Vec<ServerHandle> = match self.servers.read() {
            Ok(servers) => servers.values().cloned().collect(),
            Err(_) => Vec::new(),
        };
        handles.sort_by_key(|h| h.server_id());
        handles
    }

    /// Subscribe to state changes of every server
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    pub async fn join(&self, server_id: ServerId, player_id: PlayerId, role: Role) -> EngineResult<()> {
        self.server(server_id)?.join(player_id, role).await
    }

    pub async fn join_duo(
        &self,
        server_id: ServerId,
        first: (PlayerId, Role),
        second: (PlayerId, Role),
    ) -> EngineResult<()> {
        self.server(server_id)?.join_duo(first, second).await
    }

    pub async fn leave(&self, server_id: ServerId, player_id: PlayerId) -> EngineResult<bool> {
        match self.get(server_id) {
            Some(handle) => handle.leave(player_id).await,
            None => Ok(false),
        }
    }

    pub async fn respond(
        &self,
        server_id: ServerId,
        player_id: PlayerId,
        response: ReadyResponse,
    ) -> EngineResult<ReadyCheckReply> {
        match self.get(server_id) {
            Some(handle) => handle.respond(player_id, response).await,
            None => Err(QueueError::NoActiveCheck { player_id }),
        }
    }

    pub async fn reset_queue(&self, server_id: ServerId) -> EngineResult<usize> {
        match self.get(server_id) {
            Some(handle) => handle.reset_queue().await,
            None => Ok(0),
        }
    }

    pub async fn score_game(
        &self,
        server_id: ServerId,
        game_id: GameId,
        outcome: GameOutcome,
    ) -> EngineResult<Vec<RatingChange>> {
        match self.get(server_id) {
            Some(handle) => handle.score_game(game_id, outcome).await,
            None => Err(QueueError::UnknownGame { game_id }),
        }
    }

    pub async fn cancel_game(
        &self,
        server_id: ServerId,
        game_id: GameId,
        reason: GameCancelReason,
    ) -> EngineResult<()> {
        match self.get(server_id) {
            Some(handle) => handle.cancel_game(game_id, reason).await,
            None => Err(QueueError::UnknownGame { game_id }),
        }
    }

    /// Current state of a server
    ///
    /// A server without an actor has nothing queued, so its snapshot is built
    /// from its settings alone and no actor is spawned.
    pub async fn snapshot(&self, server_id: ServerId) -> EngineResult<ServerSnapshot> {
        match self.get(server_id) {
            Some(handle) => handle.snapshot().await,
            None => Ok(ServerState::new(
                server_id,
                self.config_store.server_settings(server_id),
                self.settings.clone(),
                self.components.clone(),
            )
            .snapshot(current_timestamp())),
        }
    }

    /// Reset the queue of every running server that has resets enabled
    ///
    /// Returns the number of entries removed.
    pub async fn reset_queues(&self) -> usize {
        let mut removed = 0;

        for handle in self.handles() {
            let server_id = handle.server_id();
            if !self.config_store.server_settings(server_id).queue_reset_enabled {
                continue;
            }
            match handle.reset_queue().await {
                Ok(count) => removed += count,
                Err(e) => warn!("Failed to reset queue of server {}: {}", server_id, e),
            }
        }

        info!("Queue reset removed {} entries", removed);
        removed
    }

    /// Force-cancel every pending ready check
    pub async fn cancel_all_ready_checks(&self) -> usize {
        let mut cancelled = 0;

        for handle in self.handles() {
            match handle.cancel_ready_check().await {
                Ok(Some(_)) => cancelled += 1,
                Ok(None) => {}
                Err(e) => warn!(
                    "Failed to cancel ready check of server {}: {}",
                    handle.server_id(),
                    e
                ),
            }
        }

        if cancelled > 0 {
            info!("Cancelled {} pending ready checks", cancelled);
        }
        cancelled
    }

    /// Open games created at or before `cutoff`, across all servers
    pub async fn games_awaiting_result(&self, cutoff: DateTime<Utc>) -> Vec<ServerGame> {
        let mut games = Vec::new();

        for handle in self.handles() {
            let server_id = handle.server_id();
            match handle.games_awaiting_result(cutoff).await {
                Ok(ids) => games.extend(ids.into_iter().map(|game_id| ServerGame { server_id, game_id })),
                Err(e) => warn!("Failed to list games of server {}: {}", server_id, e),
            }
        }

        games
    }

    pub fn stats(&self) -> EngineStats {
        let mut stats = match self.stats.read() {
            Ok(stats) => stats.clone(),
            Err(_) => EngineStats::default(),
        };
        stats.servers_active = self.handles().iter().filter(|h| h.is_alive()).count();
        stats
    }

    /// Cancel pending checks and stop every actor
    pub async fn shutdown(&self) {
        self.cancel_all_ready_checks().await;

        match self.servers.write() {
            Ok(mut servers) => {
                info!("Stopping {} server actors", servers.len());
                servers.clear();
            }
            Err(_) => warn!("Failed to acquire server registry lock during shutdown"),
        }
    }
}
