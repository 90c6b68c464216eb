//! Common types used throughout the queue engine

use serde::{Deserialize, Serialize};
use skillratings::weng_lin::WengLinRating;
use std::str::FromStr;
use uuid::Uuid;

/// Chat platform identifier of a player
pub type PlayerId = u64;

/// Chat platform identifier of a server (guild)
pub type ServerId = u64;

/// Unique identifier for games
pub type GameId = Uuid;

/// Unique identifier for ready checks
pub type ReadyCheckId = Uuid;

/// In-game role a player queues for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Top,
    Jungle,
    Mid,
    Bot,
    Support,
}

impl Role {
    /// All roles in display order
    pub const ALL: [Role; 5] = [Role::Top, Role::Jungle, Role::Mid, Role::Bot, Role::Support];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Top => "top",
            Role::Jungle => "jungle",
            Role::Mid => "mid",
            Role::Bot => "bot",
            Role::Support => "support",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "top" => Ok(Role::Top),
            "jungle" | "jgl" | "jg" | "jungler" => Ok(Role::Jungle),
            "mid" | "middle" => Ok(Role::Mid),
            "bot" | "bottom" | "adc" => Ok(Role::Bot),
            "support" | "sup" | "supp" => Ok(Role::Support),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Team side in a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Blue,
    Red,
}

impl Side {
    /// Sides in assignment order
    pub const ALL: [Side; 2] = [Side::Blue, Side::Red];

    pub fn opponent(&self) -> Side {
        match self {
            Side::Blue => Side::Red,
            Side::Red => Side::Blue,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Blue => "blue",
            Side::Red => "red",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rating information for a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRating {
    pub rating: f64,
    pub uncertainty: f64,
}

impl Default for PlayerRating {
    fn default() -> Self {
        Self {
            rating: 1500.0,
            uncertainty: 200.0,
        }
    }
}

impl From<WengLinRating> for PlayerRating {
    fn from(rating: WengLinRating) -> Self {
        Self {
            rating: rating.rating,
            uncertainty: rating.uncertainty,
        }
    }
}

impl From<PlayerRating> for WengLinRating {
    fn from(rating: PlayerRating) -> Self {
        Self {
            rating: rating.rating,
            uncertainty: rating.uncertainty,
        }
    }
}

/// Rating change information for a player after a scored game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingChange {
    pub player_id: PlayerId,
    pub old_rating: PlayerRating,
    pub new_rating: PlayerRating,
    pub won: bool,
}

/// Lifecycle status of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    AwaitingResult,
    Scored,
    Cancelled,
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameStatus::AwaitingResult => write!(f, "AwaitingResult"),
            GameStatus::Scored => write!(f, "Scored"),
            GameStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Result reported for a finished game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOutcome {
    pub winner: Side,
}

/// Why a game was voided
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameCancelReason {
    /// Players agreed to void the game
    PlayersAgreed,
    /// An admin voided the game
    Admin,
    /// The external result source reported the game as void
    Remake,
}
