//! Error types for the queue engine
//!
//! Engine operations return [`EngineResult`] with a typed [`QueueError`] so
//! that front ends can map each failure kind to their own feedback. Service
//! edges (configuration, start-up, HTTP) use anyhow for consistent error
//! handling.

use crate::types::{GameId, GameStatus, PlayerId, Role, ServerId};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Result type returned by every engine operation
pub type EngineResult<T> = std::result::Result<T, QueueError>;

/// Why a player is currently not allowed to queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarReason {
    /// The player is part of the pending ready check
    InReadyCheck,
    /// The player has a game waiting for its result
    InGame(GameId),
}

impl std::fmt::Display for BarReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BarReason::InReadyCheck => write!(f, "in a pending ready check"),
            BarReason::InGame(game_id) => write!(f, "in unscored game {}", game_id),
        }
    }
}

/// Custom error types for specific queue scenarios
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueueError {
    #[error("Player {player_id} is already in queue")]
    AlreadyQueued { player_id: PlayerId },

    #[error("Duos must have different roles (both asked for {role})")]
    SameRolesForDuo { role: Role },

    #[error("Player {player_id} cannot queue: {reason}")]
    PlayerBarred {
        player_id: PlayerId,
        reason: BarReason,
    },

    #[error("A ready check is already pending on server {server_id}")]
    AlreadyPending { server_id: ServerId },

    #[error("Player {player_id} is not part of an active ready check")]
    NoActiveCheck { player_id: PlayerId },

    #[error("Game not found: {game_id}")]
    UnknownGame { game_id: GameId },

    #[error("Game {game_id} was already resolved ({status})")]
    AlreadyScored { game_id: GameId, status: GameStatus },

    #[error("Candidate references player {player_id} who is no longer queued")]
    StaleCandidate { player_id: PlayerId },

    #[error("Invalid queue request: {reason}")]
    InvalidQueueRequest { reason: String },

    #[error("Server {server_id} is not accepting commands")]
    ServerUnavailable { server_id: ServerId },

    #[error("Rating calculation failed: {reason}")]
    RatingCalculationFailed { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl QueueError {
    /// Expected failures caused by the caller's request rather than by the engine
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            QueueError::AlreadyQueued { .. }
                | QueueError::SameRolesForDuo { .. }
                | QueueError::PlayerBarred { .. }
                | QueueError::AlreadyPending { .. }
                | QueueError::NoActiveCheck { .. }
                | QueueError::UnknownGame { .. }
                | QueueError::AlreadyScored { .. }
                | QueueError::InvalidQueueRequest { .. }
        )
    }

    /// Short machine-readable name, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            QueueError::AlreadyQueued { .. } => "already_queued",
            QueueError::SameRolesForDuo { .. } => "same_roles_for_duo",
            QueueError::PlayerBarred { .. } => "player_barred",
            QueueError::AlreadyPending { .. } => "already_pending",
            QueueError::NoActiveCheck { .. } => "no_active_check",
            QueueError::UnknownGame { .. } => "unknown_game",
            QueueError::AlreadyScored { .. } => "already_scored",
            QueueError::StaleCandidate { .. } => "stale_candidate",
            QueueError::InvalidQueueRequest { .. } => "invalid_request",
            QueueError::ServerUnavailable { .. } => "server_unavailable",
            QueueError::RatingCalculationFailed { .. } => "rating_failed",
            QueueError::ConfigurationError { .. } => "configuration",
            QueueError::InternalError { .. } => "internal",
        }
    }
}
