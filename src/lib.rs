//! In-house queue - role-based matchmaking for community games
//!
//! This crate provides per-server role queues with solo and duo entries,
//! ready checks, game tracking with Weng-Lin rating updates, and the
//! periodic jobs that reset queues and poll tournament results.

pub mod config;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod game;
pub mod metrics;
pub mod queue;
pub mod rating;
pub mod ready_check;
pub mod scheduler;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{EngineResult, QueueError, Result};
pub use types::*;

// Re-export key components
pub use config::{ConfigStore, GameMode, ServerSettings, StaticConfigStore};
pub use engine::{ChannelRenderer, ServerHandle, ServerRegistry, ServerSnapshot, StateChange};
pub use scheduler::{Scheduler, TournamentChecker};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
