//! Main application configuration
//!
//! This module defines the configuration of the queue service, loaded from
//! environment variables or a TOML file, and its validation.

use crate::config::server::{GameMode, ServerSettings, StaticConfigStore};
use crate::engine::EngineSettings;
use crate::feedback::FeedbackOptions;
use crate::rating::weng_lin::ExtendedWengLinConfig;
use crate::scheduler::SchedulerSettings;
use crate::types::ServerId;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub scheduler: SchedulerConfig,
    pub ready_check: ReadyCheckConfig,
    pub matchmaking: MatchmakingConfig,
    pub rating: ExtendedWengLinConfig,
    pub feedback: FeedbackOptions,
    /// Per-server overrides of the matchmaking defaults
    pub servers: Vec<ServerOverride>,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Periodic job settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks
    pub tick_interval_seconds: u64,
    /// Local time of the daily queue reset, "HH:MM"
    pub queue_reset_time: Option<String>,
    /// Poll the tournament result source
    pub tournaments_enabled: bool,
    /// Poll results every this many ticks
    pub result_poll_every_ticks: u32,
    /// Minimum age of a game before its result is polled
    pub result_min_age_seconds: u64,
}

/// Ready check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadyCheckConfig {
    /// Seconds participants have to answer
    pub timeout_seconds: u64,
}

/// Matchmaking and engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Game mode of servers without an override
    pub default_mode: GameMode,
    /// Reset flag of servers without an override
    pub queue_reset_enabled: bool,
    /// Game transitions shown in snapshots
    pub recent_games: usize,
    /// Closed games kept per server
    pub closed_game_retention: usize,
    /// Per-server command channel capacity
    pub command_buffer: usize,
    /// State-change broadcast capacity
    pub event_buffer: usize,
}

/// Settings of one server that differ from the defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerOverride {
    pub server_id: ServerId,
    pub queue_reset_enabled: Option<bool>,
    pub game_mode: Option<GameMode>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "inhouse-queue".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 60,
            queue_reset_time: None,
            tournaments_enabled: false,
            result_poll_every_ticks: 5,
            result_min_age_seconds: 15 * 60,
        }
    }
}

impl Default for ReadyCheckConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
        }
    }
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            default_mode: GameMode::default(),
            queue_reset_enabled: true,
            recent_games: engine.recent_games,
            closed_game_retention: engine.closed_game_retention,
            command_buffer: engine.command_buffer,
            event_buffer: engine.event_buffer,
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", name, value)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still override it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Parse a TOML document, filling missing sections with defaults
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Some(name) = parse_env("SERVICE_NAME")? {
            self.service.name = name;
        }
        if let Some(log_level) = parse_env("LOG_LEVEL")? {
            self.service.log_level = log_level;
        }
        if let Some(port) = parse_env("HEALTH_PORT")? {
            self.service.health_port = port;
        }
        if let Some(timeout) = parse_env("SHUTDOWN_TIMEOUT_SECONDS")? {
            self.service.shutdown_timeout_seconds = timeout;
        }

        // Scheduler settings
        if let Some(interval) = parse_env("BACKGROUND_JOBS_INTERVAL")? {
            self.scheduler.tick_interval_seconds = interval;
        }
        if let Some(reset_time) = parse_env::<String>("QUEUE_RESET_TIME")? {
            self.scheduler.queue_reset_time = Some(reset_time).filter(|t| !t.is_empty());
        }
        if let Some(enabled) = parse_env("INHOUSE_BOT_TOURNAMENTS")? {
            self.scheduler.tournaments_enabled = enabled;
        }

        // Ready check and feedback settings
        if let Some(timeout) = parse_env("READY_CHECK_TIMEOUT_SECONDS")? {
            self.ready_check.timeout_seconds = timeout;
        }
        if let Some(prefix) = parse_env("INHOUSE_BOT_COMMAND_PREFIX")? {
            self.feedback.prefix = prefix;
        }
        self.feedback.tournaments_enabled = self.scheduler.tournaments_enabled;

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get ready check timeout as Duration
    pub fn ready_check_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_check.timeout_seconds)
    }

    /// Get scheduler tick interval as Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_interval_seconds)
    }

    /// Parsed daily reset time
    pub fn queue_reset_time(&self) -> Result<Option<NaiveTime>> {
        self.scheduler
            .queue_reset_time
            .as_deref()
            .map(|time| {
                NaiveTime::parse_from_str(time, "%H:%M")
                    .map_err(|_| anyhow!("Invalid queue reset time (expected HH:MM): {}", time))
            })
            .transpose()
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            ready_check_timeout: self.ready_check_timeout(),
            recent_games: self.matchmaking.recent_games,
            closed_game_retention: self.matchmaking.closed_game_retention,
            command_buffer: self.matchmaking.command_buffer,
            event_buffer: self.matchmaking.event_buffer,
        }
    }

    pub fn scheduler_settings(&self) -> Result<SchedulerSettings> {
        Ok(SchedulerSettings {
            tick_interval: self.tick_interval(),
            queue_reset_time: self.queue_reset_time()?,
            poll_results: self.scheduler.tournaments_enabled,
            result_poll_every: self.scheduler.result_poll_every_ticks,
            result_min_age: Duration::from_secs(self.scheduler.result_min_age_seconds),
        })
    }

    /// Build the per-server settings store
    pub fn config_store(&self) -> Result<StaticConfigStore> {
        let defaults = ServerSettings {
            queue_reset_enabled: self.matchmaking.queue_reset_enabled,
            game_mode: self.matchmaking.default_mode.clone(),
        };

        let servers: HashMap<ServerId, ServerSettings> = self
            .servers
            .iter()
            .map(|entry| {
                let settings = ServerSettings {
                    queue_reset_enabled: entry
                        .queue_reset_enabled
                        .unwrap_or(defaults.queue_reset_enabled),
                    game_mode: entry
                        .game_mode
                        .clone()
                        .unwrap_or_else(|| defaults.game_mode.clone()),
                };
                (entry.server_id, settings)
            })
            .collect();

        StaticConfigStore::with_servers(defaults, servers)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.ready_check.timeout_seconds == 0 {
        return Err(anyhow!("Ready check timeout must be greater than 0"));
    }
    if config.scheduler.tick_interval_seconds == 0 {
        return Err(anyhow!("Scheduler tick interval must be greater than 0"));
    }
    if config.scheduler.result_poll_every_ticks == 0 {
        return Err(anyhow!("Result poll cadence must be at least 1 tick"));
    }
    config.queue_reset_time()?;

    // Validate matchmaking settings
    if config.matchmaking.command_buffer == 0 || config.matchmaking.event_buffer == 0 {
        return Err(anyhow!("Channel buffers must be greater than 0"));
    }
    let mut seen = std::collections::HashSet::new();
    for entry in &config.servers {
        if !seen.insert(entry.server_id) {
            return Err(anyhow!("Server {} is configured twice", entry.server_id));
        }
    }
    config.config_store()?;

    config.rating.validate()?;

    Ok(())
}
