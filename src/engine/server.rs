//! Linearized state of one server
//!
//! `ServerState` combines the queue, the ready check engine and the games of
//! a server. Every method runs to completion without awaiting, and the only
//! caller is the server's actor task, so all mutations are applied one at a
//! time. Committed transitions are buffered and drained by the actor.

use crate::config::server::ServerSettings;
use crate::engine::snapshot::{ReadyCheckView, ServerSnapshot, Transition};
use crate::engine::{EngineComponents, EngineSettings};
use crate::error::{BarReason, EngineResult, QueueError};
use crate::game::lifecycle::GameLifecycle;
use crate::queue::store::QueueStore;
use crate::ready_check::check::{CancelReason, ReadyCheck, ReadyResponse};
use crate::ready_check::engine::{ReadyCheckEngine, RespondOutcome};
use crate::rating::storage::RatingEntry;
use crate::types::{
    GameCancelReason, GameId, GameOutcome, PlayerId, PlayerRating, RatingChange, ReadyCheckId,
    Role, ServerId, Side,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// What happened after a ready check answer
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyCheckReply {
    /// Waiting on other participants
    Waiting { accepted: usize, total: usize },
    /// Everyone accepted and the game was created
    GameCreated(GameId),
    /// The check was cancelled
    Cancelled(CancelReason),
}

/// State of one server
pub struct ServerState {
    server_id: ServerId,
    settings: ServerSettings,
    engine_settings: EngineSettings,
    components: EngineComponents,
    queue: QueueStore,
    ready_checks: ReadyCheckEngine,
    games: GameLifecycle,
    transitions: Vec<Transition>,
}

impl ServerState {
    pub fn new(
        server_id: ServerId,
        settings: ServerSettings,
        engine_settings: EngineSettings,
        components: EngineComponents,
    ) -> Self {
        let timeout = chrono::Duration::from_std(engine_settings.ready_check_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));

        Self {
            server_id,
            queue: QueueStore::new(server_id),
            ready_checks: ReadyCheckEngine::new(server_id, timeout),
            games: GameLifecycle::new(
                server_id,
                engine_settings.recent_games,
                engine_settings.closed_game_retention,
            ),
            settings,
            engine_settings,
            components,
            transitions: Vec::new(),
        }
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    pub fn games(&self) -> &GameLifecycle {
        &self.games
    }

    /// The pending ready check, if any
    pub fn active_check(&self) -> Option<&ReadyCheck> {
        self.ready_checks.active()
    }

    pub fn ready_check_timeout(&self) -> std::time::Duration {
        self.engine_settings.ready_check_timeout
    }

    /// Transitions committed since the last call
    pub fn take_transitions(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }

    /// Queue a player for one role
    pub fn join(&mut self, player_id: PlayerId, role: Role, now: DateTime<Utc>) -> EngineResult<()> {
        self.check_bar(player_id)?;
        self.queue.join(player_id, role, now)?;

        info!("Player {} queued as {} on server {}", player_id, role, self.server_id);
        self.transitions.push(Transition::PlayerQueued { player_id, role });
        self.try_matchmaking(now);

        Ok(())
    }

    /// Queue two players together
    pub fn join_duo(
        &mut self,
        first: (PlayerId, Role),
        second: (PlayerId, Role),
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if first.1 == second.1 {
            return Err(QueueError::SameRolesForDuo { role: first.1 });
        }
        self.check_bar(first.0)?;
        self.check_bar(second.0)?;
        self.queue.join_duo(first, second, now)?;

        info!(
            "Players {} ({}) and {} ({}) queued as duo on server {}",
            first.0, first.1, second.0, second.1, self.server_id
        );
        self.transitions.push(Transition::DuoQueued {
            players: [first, second],
        });
        self.try_matchmaking(now);

        Ok(())
    }

    /// Remove a player from the queue
    ///
    /// Leaving while part of the pending ready check declines it. Returns
    /// whether the player had anything to leave.
    pub fn leave(&mut self, player_id: PlayerId, now: DateTime<Utc>) -> bool {
        if let Some((check, reason)) = self.ready_checks.withdraw(player_id) {
            self.apply_cancellation(&check, reason, now);
            return true;
        }

        match self.queue.leave(player_id) {
            Some(_) => {
                info!("Player {} left the queue on server {}", player_id, self.server_id);
                self.transitions.push(Transition::PlayerLeft { player_id });
                true
            }
            None => false,
        }
    }

    /// Answer the pending ready check
    pub fn respond(
        &mut self,
        player_id: PlayerId,
        response: ReadyResponse,
        now: DateTime<Utc>,
    ) -> EngineResult<ReadyCheckReply> {
        let outcome = self.ready_checks.respond(player_id, response)?;

        match outcome {
            RespondOutcome::Waiting { accepted, total } => {
                if let Some(check) = self.ready_checks.active() {
                    self.transitions.push(Transition::ReadyCheckAnswered {
                        check_id: check.id,
                        player_id,
                        response,
                    });
                }
                Ok(ReadyCheckReply::Waiting { accepted, total })
            }
            RespondOutcome::Confirmed(check) => {
                let created = self
                    .games
                    .create(&check.candidate, &mut self.queue, now)
                    .map(|game| game.id);
                self.ready_checks.finish();

                match created {
                    Ok(game_id) => {
                        self.transitions.push(Transition::GameCreated {
                            game_id,
                            check_id: check.id,
                        });
                        self.try_matchmaking(now);
                        Ok(ReadyCheckReply::GameCreated(game_id))
                    }
                    Err(e) => {
                        error!(
                            "Confirmed ready check {} on server {} could not create a game: {}",
                            check.id, self.server_id, e
                        );
                        self.transitions.push(Transition::ReadyCheckCancelled {
                            check_id: check.id,
                            reason: CancelReason::ForceCancelled,
                        });
                        self.try_matchmaking(now);
                        Err(e)
                    }
                }
            }
            RespondOutcome::Cancelled { check, reason } => {
                self.apply_cancellation(&check, reason.clone(), now);
                Ok(ReadyCheckReply::Cancelled(reason))
            }
        }
    }

    /// Deadline of a ready check passed
    pub fn expire(&mut self, check_id: ReadyCheckId, now: DateTime<Utc>) -> bool {
        match self.ready_checks.expire(check_id) {
            Some((check, reason)) => {
                self.apply_cancellation(&check, reason, now);
                true
            }
            None => false,
        }
    }

    /// Force-cancel the pending ready check without touching the queue
    pub fn cancel_ready_check(&mut self, now: DateTime<Utc>) -> Option<CancelReason> {
        let (check, reason) = self.ready_checks.cancel()?;
        self.apply_cancellation(&check, reason.clone(), now);
        Some(reason)
    }

    /// Clear the queue
    ///
    /// Players bound to the pending ready check keep their entries so the
    /// check can still be confirmed; everyone else is removed.
    pub fn reset_queue(&mut self) -> usize {
        let reserved = self
            .ready_checks
            .active()
            .map(|check| check.candidate.player_ids())
            .unwrap_or_default();
        let removed = self.queue.reset_except(&reserved);

        info!(
            "Queue of server {} reset, {} entries removed",
            self.server_id, removed
        );
        self.transitions.push(Transition::QueueReset { removed });

        removed
    }

    /// Record a game result and update ratings
    pub fn score_game(
        &mut self,
        game_id: GameId,
        outcome: GameOutcome,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<RatingChange>> {
        let game = self.games.score(game_id, outcome, now)?;
        self.transitions.push(Transition::GameScored {
            game_id,
            winner: outcome.winner,
        });

        if !game.is_two_sided() {
            debug!("Game {} is single-sided, ratings unchanged", game_id);
            return Ok(Vec::new());
        }

        match self.update_ratings(&game.team(Side::Blue), &game.team(Side::Red), outcome.winner) {
            Ok(changes) => Ok(changes),
            Err(e) => {
                // The result stands even if ratings could not be updated
                error!("Failed to update ratings for game {}: {}", game_id, e);
                Ok(Vec::new())
            }
        }
    }

    /// Void a game
    pub fn cancel_game(
        &mut self,
        game_id: GameId,
        reason: GameCancelReason,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.games.cancel(game_id, reason.clone(), now)?;
        self.transitions.push(Transition::GameCancelled { game_id, reason });
        Ok(())
    }

    /// Open games created at or before `cutoff`
    pub fn games_awaiting_result(&self, cutoff: DateTime<Utc>) -> Vec<GameId> {
        self.games.awaiting_result_since(cutoff)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> ServerSnapshot {
        ServerSnapshot {
            server_id: self.server_id,
            mode: self.settings.game_mode.name.clone(),
            queue: self.queue.entries().to_vec(),
            ready_check: self
                .ready_checks
                .active()
                .map(|check| ReadyCheckView::new(check, now)),
            games_awaiting_result: self.games.awaiting_result().into_iter().cloned().collect(),
            recent_games: self.games.recent(),
            taken_at: now,
        }
    }

    fn check_bar(&self, player_id: PlayerId) -> EngineResult<()> {
        if self.ready_checks.is_participant(player_id) {
            return Err(QueueError::PlayerBarred {
                player_id,
                reason: BarReason::InReadyCheck,
            });
        }
        if let Some(game_id) = self.games.player_game(player_id) {
            return Err(QueueError::PlayerBarred {
                player_id,
                reason: BarReason::InGame(game_id),
            });
        }
        Ok(())
    }

    /// Release the participants of a cancelled check
    ///
    /// Decliners, leavers and players who never answered lose their entry;
    /// everyone else stays queued.
    fn apply_cancellation(&mut self, check: &ReadyCheck, reason: CancelReason, now: DateTime<Utc>) {
        let dropped: Vec<PlayerId> = match &reason {
            CancelReason::Declined { player_id } | CancelReason::Left { player_id } => {
                vec![*player_id]
            }
            CancelReason::Timeout { non_responders } => non_responders.clone(),
            CancelReason::ForceCancelled => Vec::new(),
        };

        for player_id in &dropped {
            if self.queue.leave(*player_id).is_some() {
                debug!(
                    "Player {} removed from queue after ready check {}",
                    player_id, check.id
                );
            }
        }

        let rematch = reason != CancelReason::ForceCancelled;
        self.transitions.push(Transition::ReadyCheckCancelled {
            check_id: check.id,
            reason,
        });

        if rematch {
            self.try_matchmaking(now);
        }
    }

    /// Start a ready check if the queue can form a game
    fn try_matchmaking(&mut self, now: DateTime<Utc>) {
        if !self.ready_checks.is_idle() {
            return;
        }

        let ratings = self.current_ratings();
        let candidate = self.components.matchmaker.propose(
            self.server_id,
            self.queue.entries(),
            &self.settings.game_mode,
            &ratings,
        );
        let Some(candidate) = candidate else {
            return;
        };

        match self.ready_checks.start(candidate, now) {
            Ok(check) => {
                let transition = Transition::ReadyCheckStarted {
                    check_id: check.id,
                    players: check.candidate.player_ids(),
                };
                self.transitions.push(transition);
            }
            Err(e) => warn!("Could not start ready check on server {}: {}", self.server_id, e),
        }
    }

    fn current_ratings(&self) -> HashMap<PlayerId, PlayerRating> {
        let player_ids: Vec<PlayerId> = self.queue.entries().iter().map(|e| e.player_id).collect();

        match self
            .components
            .rating_storage
            .get_ratings(self.server_id, &player_ids)
        {
            Ok(entries) => entries
                .into_iter()
                .map(|(id, entry)| (id, entry.rating))
                .collect(),
            Err(e) => {
                warn!("Failed to load ratings for server {}: {}", self.server_id, e);
                HashMap::new()
            }
        }
    }

    fn update_ratings(
        &self,
        blue: &[PlayerId],
        red: &[PlayerId],
        winner: Side,
    ) -> EngineResult<Vec<RatingChange>> {
        let storage = &self.components.rating_storage;
        let calculator = &self.components.rating_calculator;

        let all: Vec<PlayerId> = blue.iter().chain(red).copied().collect();
        let mut entries = storage.get_ratings(self.server_id, &all)?;
        for player_id in &all {
            entries.entry(*player_id).or_insert_with(|| {
                RatingEntry::new(self.server_id, *player_id, calculator.get_initial_rating())
            });
        }

        let with_ratings = |team: &[PlayerId]| -> Vec<(PlayerId, PlayerRating)> {
            team.iter()
                .filter_map(|id| entries.get(id).map(|e| (*id, e.rating.clone())))
                .collect()
        };
        let result = calculator.calculate_team_game(&with_ratings(blue), &with_ratings(red), winner)?;

        let mut updated = Vec::with_capacity(result.rating_changes.len());
        for change in &result.rating_changes {
            if let Some(mut entry) = entries.remove(&change.player_id) {
                entry.record_game(change.new_rating.clone(), change.won);
                updated.push(entry);
            }
        }
        storage.store_ratings(updated)?;

        info!(
            "Ratings updated on server {} for {} players (winner expected score {:.3})",
            self.server_id,
            result.rating_changes.len(),
            result.winner_expected_score
        );

        Ok(result.rating_changes)
    }
}
