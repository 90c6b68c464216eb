//! Rating calculator trait
//!
//! Ratings are the only long-lived output of a scored game: the engine feeds
//! the two teams and the winner in, and stores what comes out.

use crate::error::EngineResult;
use crate::types::{PlayerId, PlayerRating, RatingChange, Side};
use serde::{Deserialize, Serialize};

/// Result of a rating calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingCalculationResult {
    /// Rating changes for all players of both teams
    pub rating_changes: Vec<RatingChange>,
    /// Probability the winning team had before the game (0.0 to 1.0)
    pub winner_expected_score: f64,
}

/// Trait for calculating rating changes after team games
pub trait RatingCalculator: Send + Sync {
    /// Calculate rating changes for a two-team game
    ///
    /// # Arguments
    /// * `blue` - Blue side players with their current ratings
    /// * `red` - Red side players with their current ratings
    /// * `winner` - Side that won the game
    fn calculate_team_game(
        &self,
        blue: &[(PlayerId, PlayerRating)],
        red: &[(PlayerId, PlayerRating)],
        winner: Side,
    ) -> EngineResult<RatingCalculationResult>;

    /// Probability that `team` beats `opponents`
    fn expected_team_score(&self, team: &[PlayerRating], opponents: &[PlayerRating]) -> f64;

    /// Get the initial rating for new players
    fn get_initial_rating(&self) -> PlayerRating;
}
