//! Server snapshots and state-change notifications

use crate::game::lifecycle::{Game, GameTransition};
use crate::queue::matchmaker::CandidateSlot;
use crate::queue::store::QueueEntry;
use crate::ready_check::check::{CancelReason, ParticipantStatus, ReadyCheck, ReadyResponse};
use crate::types::{
    GameCancelReason, GameId, PlayerId, ReadyCheckId, Role, ServerId, Side,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pending ready check as shown to players
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyCheckView {
    pub id: ReadyCheckId,
    pub slots: Vec<CandidateSlot>,
    pub participants: Vec<ParticipantStatus>,
    pub deadline: DateTime<Utc>,
    pub remaining_seconds: u64,
    pub blue_expected_score: Option<f64>,
}

impl ReadyCheckView {
    pub fn new(check: &ReadyCheck, now: DateTime<Utc>) -> Self {
        Self {
            id: check.id,
            slots: check.candidate.slots.clone(),
            participants: check.participants.clone(),
            deadline: check.deadline,
            remaining_seconds: check.remaining_seconds(now),
            blue_expected_score: check.candidate.blue_expected_score,
        }
    }
}

/// Everything a renderer needs to draw one server's queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub server_id: ServerId,
    pub mode: String,
    /// Queue entries in join order
    pub queue: Vec<QueueEntry>,
    pub ready_check: Option<ReadyCheckView>,
    pub games_awaiting_result: Vec<Game>,
    pub recent_games: Vec<GameTransition>,
    pub taken_at: DateTime<Utc>,
}

impl ServerSnapshot {
    /// Queued players for one role, in join order
    pub fn queued_for(&self, role: Role) -> Vec<PlayerId> {
        self.queue
            .iter()
            .filter(|e| e.role == role)
            .map(|e| e.player_id)
            .collect()
    }
}

/// A committed change of a server's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transition {
    PlayerQueued {
        player_id: PlayerId,
        role: Role,
    },
    DuoQueued {
        players: [(PlayerId, Role); 2],
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    QueueReset {
        removed: usize,
    },
    ReadyCheckStarted {
        check_id: ReadyCheckId,
        players: Vec<PlayerId>,
    },
    ReadyCheckAnswered {
        check_id: ReadyCheckId,
        player_id: PlayerId,
        response: ReadyResponse,
    },
    ReadyCheckCancelled {
        check_id: ReadyCheckId,
        reason: CancelReason,
    },
    GameCreated {
        game_id: GameId,
        check_id: ReadyCheckId,
    },
    GameScored {
        game_id: GameId,
        winner: Side,
    },
    GameCancelled {
        game_id: GameId,
        reason: GameCancelReason,
    },
}

impl Transition {
    /// Short name used in logs and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            Transition::PlayerQueued { .. } => "player_queued",
            Transition::DuoQueued { .. } => "duo_queued",
            Transition::PlayerLeft { .. } => "player_left",
            Transition::QueueReset { .. } => "queue_reset",
            Transition::ReadyCheckStarted { .. } => "ready_check_started",
            Transition::ReadyCheckAnswered { .. } => "ready_check_answered",
            Transition::ReadyCheckCancelled { .. } => "ready_check_cancelled",
            Transition::GameCreated { .. } => "game_created",
            Transition::GameScored { .. } => "game_scored",
            Transition::GameCancelled { .. } => "game_cancelled",
        }
    }
}

/// Notification sent after every committed transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub server_id: ServerId,
    pub transition: Transition,
    /// State right after the transition batch it belongs to was applied
    pub snapshot: ServerSnapshot,
}
