//! Weng-Lin (OpenSkill) rating system implementation
//!
//! This module provides a concrete implementation of the rating calculator
//! using the Weng-Lin algorithm from the skillratings crate.

use crate::error::{EngineResult, QueueError};
use crate::rating::calculator::{RatingCalculationResult, RatingCalculator};
use crate::types::{PlayerId, PlayerRating, RatingChange, Side};
use serde::{Deserialize, Serialize};
use skillratings::weng_lin::{weng_lin_multi_team, WengLinConfig, WengLinRating};
use skillratings::MultiTeamOutcome;
use tracing::warn;

/// Extended configuration for the Weng-Lin rating system
/// This wraps the skillratings WengLinConfig with additional parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedWengLinConfig {
    /// Core Weng-Lin parameters
    pub weng_lin_config: WengLinConfig,
    /// Initial rating for new players
    pub initial_rating: f64,
    /// Initial uncertainty for new players
    pub initial_uncertainty: f64,
}

impl Default for ExtendedWengLinConfig {
    fn default() -> Self {
        Self {
            weng_lin_config: WengLinConfig {
                beta: 200.0,
                uncertainty_tolerance: 0.0001,
            },
            initial_rating: 1500.0,
            initial_uncertainty: 200.0,
        }
    }
}

impl ExtendedWengLinConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> EngineResult<()> {
        if self.weng_lin_config.beta <= 0.0 {
            return Err(QueueError::ConfigurationError {
                message: "Beta must be positive".to_string(),
            });
        }

        if self.weng_lin_config.uncertainty_tolerance < 0.0 {
            return Err(QueueError::ConfigurationError {
                message: "Uncertainty tolerance must be non-negative".to_string(),
            });
        }

        if self.initial_uncertainty <= 0.0 {
            return Err(QueueError::ConfigurationError {
                message: "Initial uncertainty must be positive".to_string(),
            });
        }

        Ok(())
    }
}

/// Weng-Lin rating calculator implementation
#[derive(Debug, Clone)]
pub struct WengLinRatingCalculator {
    config: ExtendedWengLinConfig,
}

impl WengLinRatingCalculator {
    /// Create a new Weng-Lin rating calculator
    pub fn new(config: ExtendedWengLinConfig) -> EngineResult<Self> {
        config.validate()?;

        Ok(Self { config })
    }

    /// Get default rating for new players
    pub fn default_rating(&self) -> PlayerRating {
        PlayerRating {
            rating: self.config.initial_rating,
            uncertainty: self.config.initial_uncertainty,
        }
    }

    /// Collapse a team into one rating: summed skill, combined uncertainty
    fn team_rating(team: &[PlayerRating]) -> WengLinRating {
        WengLinRating {
            rating: team.iter().map(|r| r.rating).sum(),
            uncertainty: team
                .iter()
                .map(|r| r.uncertainty.powi(2))
                .sum::<f64>()
                .sqrt(),
        }
    }
}

impl Default for WengLinRatingCalculator {
    fn default() -> Self {
        Self {
            config: ExtendedWengLinConfig::default(),
        }
    }
}

impl RatingCalculator for WengLinRatingCalculator {
    fn calculate_team_game(
        &self,
        blue: &[(PlayerId, PlayerRating)],
        red: &[(PlayerId, PlayerRating)],
        winner: Side,
    ) -> EngineResult<RatingCalculationResult> {
        if blue.is_empty() || red.is_empty() {
            return Err(QueueError::RatingCalculationFailed {
                reason: "Both teams need at least one player".to_string(),
            });
        }

        let rank = |side: Side| if side == winner { 1 } else { 2 };

        let blue_ratings: Vec<WengLinRating> = blue.iter().map(|(_, r)| r.clone().into()).collect();
        let red_ratings: Vec<WengLinRating> = red.iter().map(|(_, r)| r.clone().into()).collect();

        let teams = [
            (blue_ratings.as_slice(), MultiTeamOutcome::new(rank(Side::Blue))),
            (red_ratings.as_slice(), MultiTeamOutcome::new(rank(Side::Red))),
        ];

        // Calculate new ratings using Weng-Lin
        let new_ratings = weng_lin_multi_team(&teams, &self.config.weng_lin_config);

        let mut rating_changes = Vec::with_capacity(blue.len() + red.len());
        for (team_index, (side, players)) in [(Side::Blue, blue), (Side::Red, red)].iter().enumerate()
        {
            for (player_index, (player_id, old_rating)) in players.iter().enumerate() {
                let Some(new_rating) = new_ratings
                    .get(team_index)
                    .and_then(|team| team.get(player_index))
                else {
                    warn!("Missing rating result for player {}", player_id);
                    continue;
                };

                rating_changes.push(RatingChange {
                    player_id: *player_id,
                    old_rating: old_rating.clone(),
                    new_rating: (*new_rating).into(),
                    won: *side == winner,
                });
            }
        }

        let (winners, losers) = match winner {
            Side::Blue => (blue, red),
            Side::Red => (red, blue),
        };
        let winner_expected_score = self.expected_team_score(
            &winners.iter().map(|(_, r)| r.clone()).collect::<Vec<_>>(),
            &losers.iter().map(|(_, r)| r.clone()).collect::<Vec<_>>(),
        );

        Ok(RatingCalculationResult {
            rating_changes,
            winner_expected_score,
        })
    }

    fn expected_team_score(&self, team: &[PlayerRating], opponents: &[PlayerRating]) -> f64 {
        if team.is_empty() || opponents.is_empty() {
            return 0.5; // Neutral expectation when a side is missing
        }

        let (expected_win, _expected_loss) = skillratings::weng_lin::expected_score(
            &Self::team_rating(team),
            &Self::team_rating(opponents),
            &self.config.weng_lin_config,
        );

        expected_win
    }

    fn get_initial_rating(&self) -> PlayerRating {
        self.default_rating()
    }
}
