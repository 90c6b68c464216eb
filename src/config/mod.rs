//! Configuration management for the queue service
//!
//! This module handles configuration loading from environment variables and
//! TOML files, validation, default values and the per-server settings store.

pub mod app;
pub mod server;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, ServerOverride, ServiceSettings};
pub use server::{ConfigStore, GameMode, ServerSettings, StaticConfigStore};
