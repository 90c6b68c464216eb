//! External result source
//!
//! Tournament games are scored by an outside service. The scheduler hands
//! it the games still waiting for a result and applies whatever comes back.

use crate::engine::registry::ServerGame;
use crate::error::Result;
use crate::types::{GameId, ServerId, Side};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How an external source resolved a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Winner(Side),
    /// The game did not count, e.g. a remake
    Void,
}

/// Outcome reported for one game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGame {
    pub server_id: ServerId,
    pub game_id: GameId,
    pub resolution: Resolution,
}

/// Trait for polling an external source of game results
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TournamentChecker: Send + Sync {
    /// Look up results for games still awaiting one
    ///
    /// Games without a known result are simply left out of the answer.
    async fn check_results(&self, games: Vec<ServerGame>) -> Result<Vec<ResolvedGame>>;
}

/// Checker for deployments without tournament integration
#[derive(Debug, Clone, Default)]
pub struct NoopTournamentChecker;

#[async_trait]
impl TournamentChecker for NoopTournamentChecker {
    async fn check_results(&self, _games: Vec<ServerGame>) -> Result<Vec<ResolvedGame>> {
        Ok(Vec::new())
    }
}
