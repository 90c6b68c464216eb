//! Ready check records
//!
//! A ready check wraps one candidate game and tracks whether each of its
//! participants has confirmed they are available.

use crate::queue::matchmaker::CandidateGame;
use crate::types::{PlayerId, ReadyCheckId, ServerId};
use crate::utils::{generate_ready_check_id, seconds_until};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Answer of one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyStatus {
    Pending,
    Accepted,
    Declined,
}

/// What a participant can reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyResponse {
    Accept,
    Decline,
}

/// Why a ready check ended without a game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    /// A participant declined
    Declined { player_id: PlayerId },
    /// A participant left the queue while the check was pending
    Left { player_id: PlayerId },
    /// The deadline passed before everyone accepted
    Timeout { non_responders: Vec<PlayerId> },
    /// Cancelled by the engine, e.g. on start-up
    ForceCancelled,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Declined { player_id } => write!(f, "declined by {}", player_id),
            CancelReason::Left { player_id } => write!(f, "{} left the queue", player_id),
            CancelReason::Timeout { non_responders } => {
                write!(f, "timed out ({} did not answer)", non_responders.len())
            }
            CancelReason::ForceCancelled => write!(f, "force cancelled"),
        }
    }
}

/// Participant and their current answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantStatus {
    pub player_id: PlayerId,
    pub status: ReadyStatus,
}

/// An active ready check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyCheck {
    pub id: ReadyCheckId,
    pub candidate: CandidateGame,
    /// One status per candidate slot, in slot order
    pub participants: Vec<ParticipantStatus>,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl ReadyCheck {
    pub fn new(candidate: CandidateGame, now: DateTime<Utc>, timeout: Duration) -> Self {
        let participants = candidate
            .slots
            .iter()
            .map(|slot| ParticipantStatus {
                player_id: slot.player_id,
                status: ReadyStatus::Pending,
            })
            .collect();

        Self {
            id: generate_ready_check_id(),
            candidate,
            participants,
            created_at: now,
            deadline: now + timeout,
        }
    }

    pub fn server_id(&self) -> ServerId {
        self.candidate.server_id
    }

    pub fn status(&self, player_id: PlayerId) -> Option<ReadyStatus> {
        self.participants
            .iter()
            .find(|p| p.player_id == player_id)
            .map(|p| p.status)
    }

    pub fn is_participant(&self, player_id: PlayerId) -> bool {
        self.status(player_id).is_some()
    }

    /// Record an answer, returning false for non-participants
    pub fn set_status(&mut self, player_id: PlayerId, status: ReadyStatus) -> bool {
        match self.participants.iter_mut().find(|p| p.player_id == player_id) {
            Some(participant) => {
                participant.status = status;
                true
            }
            None => false,
        }
    }

    pub fn all_accepted(&self) -> bool {
        self.participants
            .iter()
            .all(|p| p.status == ReadyStatus::Accepted)
    }

    /// Players with the given status, in slot order
    pub fn players_with(&self, status: ReadyStatus) -> Vec<PlayerId> {
        self.participants
            .iter()
            .filter(|p| p.status == status)
            .map(|p| p.player_id)
            .collect()
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        seconds_until(self.deadline, now)
    }
}
