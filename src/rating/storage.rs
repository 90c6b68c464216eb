//! Rating storage interface and implementations
//!
//! Ratings are tracked per server: the same player can be strong on one
//! server's in-house ladder and new on another's.

use crate::error::{EngineResult, QueueError};
use crate::types::{PlayerId, PlayerRating, ServerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Storage entry for a player's rating with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingEntry {
    pub server_id: ServerId,
    pub player_id: PlayerId,
    pub rating: PlayerRating,
    pub games_played: u64,
    pub wins: u64,
    pub last_updated: DateTime<Utc>,
}

impl RatingEntry {
    /// Create a new rating entry for a new player
    pub fn new(server_id: ServerId, player_id: PlayerId, initial_rating: PlayerRating) -> Self {
        Self {
            server_id,
            player_id,
            rating: initial_rating,
            games_played: 0,
            wins: 0,
            last_updated: Utc::now(),
        }
    }

    /// Update the rating after a scored game
    pub fn record_game(&mut self, new_rating: PlayerRating, won: bool) {
        self.rating = new_rating;
        self.games_played += 1;
        if won {
            self.wins += 1;
        }
        self.last_updated = Utc::now();
    }
}

/// Trait for rating storage operations
pub trait RatingStorage: Send + Sync {
    /// Get a player's rating entry on a server
    fn get_rating(
        &self,
        server_id: ServerId,
        player_id: PlayerId,
    ) -> EngineResult<Option<RatingEntry>>;

    /// Get ratings for multiple players of one server
    fn get_ratings(
        &self,
        server_id: ServerId,
        player_ids: &[PlayerId],
    ) -> EngineResult<HashMap<PlayerId, RatingEntry>>;

    /// Store multiple rating updates atomically
    fn store_ratings(&self, entries: Vec<RatingEntry>) -> EngineResult<()>;

    /// Get total number of rated players on a server
    fn get_player_count(&self, server_id: ServerId) -> EngineResult<usize>;
}

/// In-memory rating storage implementation
#[derive(Debug, Default)]
pub struct InMemoryRatingStorage {
    ratings: RwLock<HashMap<(ServerId, PlayerId), RatingEntry>>,
}

impl InMemoryRatingStorage {
    /// Create a new in-memory rating storage
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_error() -> QueueError {
        QueueError::InternalError {
            message: "Failed to acquire ratings lock".to_string(),
        }
    }
}

impl RatingStorage for InMemoryRatingStorage {
    fn get_rating(
        &self,
        server_id: ServerId,
        player_id: PlayerId,
    ) -> EngineResult<Option<RatingEntry>> {
        let ratings = self.ratings.read().map_err(|_| Self::lock_error())?;

        Ok(ratings.get(&(server_id, player_id)).cloned())
    }

    fn get_ratings(
        &self,
        server_id: ServerId,
        player_ids: &[PlayerId],
    ) -> EngineResult<HashMap<PlayerId, RatingEntry>> {
        let ratings = self.ratings.read().map_err(|_| Self::lock_error())?;

        let mut result = HashMap::new();
        for player_id in player_ids {
            if let Some(entry) = ratings.get(&(server_id, *player_id)) {
                result.insert(*player_id, entry.clone());
            }
        }

        Ok(result)
    }

    fn store_ratings(&self, entries: Vec<RatingEntry>) -> EngineResult<()> {
        let mut ratings = self.ratings.write().map_err(|_| Self::lock_error())?;

        for entry in entries {
            ratings.insert((entry.server_id, entry.player_id), entry);
        }

        Ok(())
    }

    fn get_player_count(&self, server_id: ServerId) -> EngineResult<usize> {
        let ratings = self.ratings.read().map_err(|_| Self::lock_error())?;

        Ok(ratings.keys().filter(|(server, _)| *server == server_id).count())
    }
}
