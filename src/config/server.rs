//! Per-server settings and the read-only configuration store
//!
//! Each server picks a game mode (the roles to fill and how many sides play)
//! and whether its queue is cleared by the daily reset.

use crate::error::{QueueError, Result};
use crate::types::{Role, ServerId, Side};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Role requirements of a game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMode {
    /// Mode name used in logs and snapshots
    pub name: String,
    /// Roles every side has to fill, exactly once each
    pub roles: Vec<Role>,
    /// Number of sides (1 or 2)
    pub sides: u8,
}

impl GameMode {
    /// Standard five-versus-five mode
    pub fn five_versus_five() -> Self {
        Self {
            name: "5v5".to_string(),
            roles: Role::ALL.to_vec(),
            sides: 2,
        }
    }

    /// Single-sided mode with the given roles
    pub fn single_side(name: &str, roles: &[Role]) -> Self {
        Self {
            name: name.to_string(),
            roles: roles.to_vec(),
            sides: 1,
        }
    }

    /// Sides taking part in a game of this mode
    pub fn sides(&self) -> &'static [Side] {
        if self.sides >= 2 {
            &Side::ALL
        } else {
            &Side::ALL[..1]
        }
    }

    /// Number of players needed for one game
    pub fn player_count(&self) -> usize {
        self.roles.len() * self.sides().len()
    }

    pub fn requires(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Validate the mode definition
    pub fn validate(&self) -> Result<()> {
        if self.roles.is_empty() {
            return Err(QueueError::ConfigurationError {
                message: format!("Game mode '{}' has no roles", self.name),
            }
            .into());
        }

        let unique: HashSet<_> = self.roles.iter().collect();
        if unique.len() != self.roles.len() {
            return Err(QueueError::ConfigurationError {
                message: format!("Game mode '{}' lists a role twice", self.name),
            }
            .into());
        }

        if !(1..=2).contains(&self.sides) {
            return Err(QueueError::ConfigurationError {
                message: format!("Game mode '{}' must have 1 or 2 sides", self.name),
            }
            .into());
        }

        Ok(())
    }
}

impl Default for GameMode {
    fn default() -> Self {
        Self::five_versus_five()
    }
}

/// Settings of one server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Whether the daily reset clears this server's queue
    pub queue_reset_enabled: bool,
    /// Game mode used for matchmaking
    pub game_mode: GameMode,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            queue_reset_enabled: true,
            game_mode: GameMode::default(),
        }
    }
}

/// Read-only access to per-server settings
pub trait ConfigStore: Send + Sync {
    /// Servers with explicit settings
    fn server_ids(&self) -> Vec<ServerId>;

    /// Settings for a server, falling back to defaults for unknown servers
    fn server_settings(&self, server_id: ServerId) -> ServerSettings;
}

/// Static configuration store built once at start-up
#[derive(Debug, Clone, Default)]
pub struct StaticConfigStore {
    defaults: ServerSettings,
    servers: HashMap<ServerId, ServerSettings>,
}

impl StaticConfigStore {
    /// Create a store where every server uses the default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with explicit per-server settings
    pub fn with_servers(
        defaults: ServerSettings,
        servers: HashMap<ServerId, ServerSettings>,
    ) -> Result<Self> {
        defaults.game_mode.validate()?;
        for settings in servers.values() {
            settings.game_mode.validate()?;
        }

        Ok(Self { defaults, servers })
    }

    /// Update one server's settings
    pub fn set_server(&mut self, server_id: ServerId, settings: ServerSettings) -> Result<()> {
        settings.game_mode.validate()?;
        self.servers.insert(server_id, settings);
        Ok(())
    }
}

impl ConfigStore for StaticConfigStore {
    fn server_ids(&self) -> Vec<ServerId> {
        let mut ids: Vec<_> = self.servers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn server_settings(&self, server_id: ServerId) -> ServerSettings {
        self.servers
            .get(&server_id)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }
}
