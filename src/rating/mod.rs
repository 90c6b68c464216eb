//! Rating system integration using Weng-Lin (OpenSkill) algorithm
//!
//! This module provides rating calculations for scored team games, storage
//! interfaces, and the team-strength estimate used to balance sides.

pub mod calculator;
pub mod storage;
pub mod weng_lin;

// Re-export commonly used types
pub use calculator::{RatingCalculationResult, RatingCalculator};
pub use storage::{InMemoryRatingStorage, RatingEntry, RatingStorage};
pub use weng_lin::{ExtendedWengLinConfig, WengLinRatingCalculator};
