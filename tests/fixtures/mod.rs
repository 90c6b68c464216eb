//! Test fixtures and mock implementations for integration testing

use async_trait::async_trait;
use inhouse_queue::config::{GameMode, ServerSettings, StaticConfigStore};
use inhouse_queue::engine::registry::ServerGame;
use inhouse_queue::engine::snapshot::Transition;
use inhouse_queue::engine::{
    ChannelRenderer, EngineComponents, EngineSettings, ServerRegistry, StateChange,
};
use inhouse_queue::error::Result;
use inhouse_queue::scheduler::{ResolvedGame, TournamentChecker};
use inhouse_queue::types::{Role, ServerId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Server whose mode needs one top and one jungle player
pub const DUEL_SERVER: ServerId = 1;
/// Server whose mode needs top, mid and support
pub const TRIO_SERVER: ServerId = 2;
/// Server with the standard 5v5 mode and resets disabled
pub const FULL_SERVER: ServerId = 3;

pub fn duel_mode() -> GameMode {
    GameMode::single_side("duel", &[Role::Top, Role::Jungle])
}

pub fn trio_mode() -> GameMode {
    GameMode::single_side("trio", &[Role::Top, Role::Mid, Role::Support])
}

pub fn test_config_store() -> StaticConfigStore {
    let mut servers = HashMap::new();
    servers.insert(
        DUEL_SERVER,
        ServerSettings {
            queue_reset_enabled: true,
            game_mode: duel_mode(),
        },
    );
    servers.insert(
        TRIO_SERVER,
        ServerSettings {
            queue_reset_enabled: true,
            game_mode: trio_mode(),
        },
    );
    servers.insert(
        FULL_SERVER,
        ServerSettings {
            queue_reset_enabled: false,
            game_mode: GameMode::five_versus_five(),
        },
    );

    StaticConfigStore::with_servers(ServerSettings::default(), servers)
        .expect("test server settings are valid")
}

pub fn test_settings() -> EngineSettings {
    EngineSettings {
        ready_check_timeout: Duration::from_secs(60),
        ..EngineSettings::default()
    }
}

/// Registry over the test servers with in-memory ratings
pub fn create_test_registry() -> Arc<ServerRegistry> {
    Arc::new(ServerRegistry::new(
        Arc::new(test_config_store()),
        EngineComponents::default(),
        test_settings(),
    ))
}

/// Renderer that captures every state change it is given
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    changes: Mutex<Vec<StateChange>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<StateChange> {
        self.changes
            .lock()
            .map(|changes| changes.clone())
            .unwrap_or_default()
    }

    /// Names of the captured transitions, in order
    pub fn transition_names(&self) -> Vec<&'static str> {
        self.changes()
            .iter()
            .map(|change| change.transition.name())
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&Transition) -> bool) -> usize {
        self.changes()
            .iter()
            .filter(|change| matches(&change.transition))
            .count()
    }
}

#[async_trait]
impl ChannelRenderer for RecordingRenderer {
    async fn render(&self, change: &StateChange) -> Result<()> {
        if let Ok(mut changes) = self.changes.lock() {
            changes.push(change.clone());
        }
        Ok(())
    }
}

/// Result source answering from a fixed script
#[derive(Debug, Default)]
pub struct ScriptedChecker {
    results: Mutex<Vec<ResolvedGame>>,
    polls: Mutex<Vec<Vec<ServerGame>>>,
    fail: Mutex<bool>,
}

impl ScriptedChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `result` from the next poll on
    pub fn resolve(&self, result: ResolvedGame) {
        if let Ok(mut results) = self.results.lock() {
            results.push(result);
        }
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut fail) = self.fail.lock() {
            *fail = failing;
        }
    }

    /// Games handed to each poll so far
    pub fn polls(&self) -> Vec<Vec<ServerGame>> {
        self.polls
            .lock()
            .map(|polls| polls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TournamentChecker for ScriptedChecker {
    async fn check_results(&self, games: Vec<ServerGame>) -> Result<Vec<ResolvedGame>> {
        if let Ok(mut polls) = self.polls.lock() {
            polls.push(games.clone());
        }
        if self.fail.lock().map(|fail| *fail).unwrap_or(false) {
            anyhow::bail!("tournament API unreachable");
        }

        let results = self.results.lock().map(|r| r.clone()).unwrap_or_default();
        Ok(results
            .into_iter()
            .filter(|result| {
                games
                    .iter()
                    .any(|g| g.server_id == result.server_id && g.game_id == result.game_id)
            })
            .collect())
    }
}
