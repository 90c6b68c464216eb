//! Game records and their lifecycle
//!
//! Games are created from confirmed ready checks and stay `AwaitingResult`
//! until they are scored or cancelled. Closed games are kept for a while so
//! a repeated score or cancel reports `AlreadyScored` instead of
//! `UnknownGame`.

use crate::error::{EngineResult, QueueError};
use crate::queue::matchmaker::{CandidateGame, CandidateSlot};
use crate::queue::store::QueueStore;
use crate::types::{GameCancelReason, GameId, GameOutcome, GameStatus, PlayerId, ServerId, Side};
use crate::utils::generate_game_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// A committed game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub server_id: ServerId,
    pub mode: String,
    pub participants: Vec<CandidateSlot>,
    pub blue_expected_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub status: GameStatus,
    pub outcome: Option<GameOutcome>,
    pub cancel_reason: Option<GameCancelReason>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Game {
    pub fn is_awaiting_result(&self) -> bool {
        self.status == GameStatus::AwaitingResult
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.participants.iter().any(|p| p.player_id == player_id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.participants.iter().map(|p| p.player_id).collect()
    }

    /// Players of one side
    pub fn team(&self, side: Side) -> Vec<PlayerId> {
        self.participants
            .iter()
            .filter(|p| p.side == side)
            .map(|p| p.player_id)
            .collect()
    }

    /// Whether both sides play, so the result can be rated
    pub fn is_two_sided(&self) -> bool {
        Side::ALL.iter().all(|side| self.participants.iter().any(|p| p.side == *side))
    }
}

/// One recorded change of a game's status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameTransition {
    pub game_id: GameId,
    pub status: GameStatus,
    pub winner: Option<Side>,
    pub at: DateTime<Utc>,
}

/// Owner of one server's games
#[derive(Debug)]
pub struct GameLifecycle {
    server_id: ServerId,
    games: HashMap<GameId, Game>,
    closed_order: VecDeque<GameId>,
    recent: VecDeque<GameTransition>,
    recent_limit: usize,
    closed_retention: usize,
}

impl GameLifecycle {
    pub fn new(server_id: ServerId, recent_limit: usize, closed_retention: usize) -> Self {
        Self {
            server_id,
            games: HashMap::new(),
            closed_order: VecDeque::new(),
            recent: VecDeque::new(),
            recent_limit,
            closed_retention,
        }
    }

    /// Turn a confirmed candidate into a game, removing its players from the queue
    ///
    /// Fails with [`QueueError::StaleCandidate`] and changes nothing if any
    /// participant is no longer queued.
    pub fn create(
        &mut self,
        candidate: &CandidateGame,
        queue: &mut QueueStore,
        now: DateTime<Utc>,
    ) -> EngineResult<&Game> {
        queue.remove_participants(&candidate.player_ids())?;

        let game = Game {
            id: generate_game_id(),
            server_id: self.server_id,
            mode: candidate.mode.clone(),
            participants: candidate.slots.clone(),
            blue_expected_score: candidate.blue_expected_score,
            created_at: now,
            status: GameStatus::AwaitingResult,
            outcome: None,
            cancel_reason: None,
            closed_at: None,
        };
        let game_id = game.id;

        info!(
            "Game {} created on server {} with {} players",
            game_id,
            self.server_id,
            game.participants.len()
        );
        self.record(game_id, GameStatus::AwaitingResult, None, now);
        let game = self.games.entry(game_id).or_insert(game);

        Ok(game)
    }

    /// Record the result of a game
    pub fn score(
        &mut self,
        game_id: GameId,
        outcome: GameOutcome,
        now: DateTime<Utc>,
    ) -> EngineResult<Game> {
        let game = self.open_game(game_id)?;
        game.status = GameStatus::Scored;
        game.outcome = Some(outcome);
        game.closed_at = Some(now);
        let closed = game.clone();

        info!(
            "Game {} on server {} scored, {} side won",
            game_id, self.server_id, outcome.winner
        );
        self.close(game_id, GameStatus::Scored, Some(outcome.winner), now);

        Ok(closed)
    }

    /// Void a game
    pub fn cancel(
        &mut self,
        game_id: GameId,
        reason: GameCancelReason,
        now: DateTime<Utc>,
    ) -> EngineResult<Game> {
        let game = self.open_game(game_id)?;
        game.status = GameStatus::Cancelled;
        game.cancel_reason = Some(reason.clone());
        game.closed_at = Some(now);
        let closed = game.clone();

        info!(
            "Game {} on server {} cancelled: {:?}",
            game_id, self.server_id, reason
        );
        self.close(game_id, GameStatus::Cancelled, None, now);

        Ok(closed)
    }

    pub fn get(&self, game_id: GameId) -> Option<&Game> {
        self.games.get(&game_id)
    }

    /// Open game the player takes part in
    pub fn player_game(&self, player_id: PlayerId) -> Option<GameId> {
        self.games
            .values()
            .find(|g| g.is_awaiting_result() && g.contains(player_id))
            .map(|g| g.id)
    }

    /// Games waiting for a result, oldest first
    pub fn awaiting_result(&self) -> Vec<&Game> {
        let mut games: Vec<&Game> = self
            .games
            .values()
            .filter(|g| g.is_awaiting_result())
            .collect();
        games.sort_by_key(|g| (g.created_at, g.id));
        games
    }

    /// Open games created at or before `cutoff`
    pub fn awaiting_result_since(&self, cutoff: DateTime<Utc>) -> Vec<GameId> {
        self.awaiting_result()
            .into_iter()
            .filter(|g| g.created_at <= cutoff)
            .map(|g| g.id)
            .collect()
    }

    /// Latest transitions, oldest first
    pub fn recent(&self) -> Vec<GameTransition> {
        self.recent.iter().cloned().collect()
    }

    /// Number of closed games still retained
    pub fn closed_count(&self) -> usize {
        self.closed_order.len()
    }

    fn open_game(&mut self, game_id: GameId) -> EngineResult<&mut Game> {
        let game = self
            .games
            .get_mut(&game_id)
            .ok_or(QueueError::UnknownGame { game_id })?;

        if !game.is_awaiting_result() {
            return Err(QueueError::AlreadyScored {
                game_id,
                status: game.status,
            });
        }

        Ok(game)
    }

    fn close(&mut self, game_id: GameId, status: GameStatus, winner: Option<Side>, now: DateTime<Utc>) {
        self.record(game_id, status, winner, now);
        self.closed_order.push_back(game_id);

        while self.closed_order.len() > self.closed_retention {
            if let Some(pruned) = self.closed_order.pop_front() {
                self.games.remove(&pruned);
                debug!("Pruned closed game {} on server {}", pruned, self.server_id);
            }
        }
    }

    fn record(&mut self, game_id: GameId, status: GameStatus, winner: Option<Side>, now: DateTime<Utc>) {
        self.recent.push_back(GameTransition {
            game_id,
            status,
            winner,
            at: now,
        });
        while self.recent.len() > self.recent_limit {
            self.recent.pop_front();
        }
    }
}
