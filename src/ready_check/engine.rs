//! Ready check state machine
//!
//! One engine per server. It moves `Idle -> Pending -> {Confirmed, Cancelled}`
//! and back to `Idle`. A confirmed check stays in `Confirmed` until the owner
//! has created the game and calls [`ReadyCheckEngine::finish`], so a game can
//! only be created once per check.

use crate::error::{EngineResult, QueueError};
use crate::queue::matchmaker::CandidateGame;
use crate::ready_check::check::{CancelReason, ReadyCheck, ReadyResponse, ReadyStatus};
use crate::types::{PlayerId, ReadyCheckId, ServerId};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

/// Current phase of a server's ready check
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyCheckState {
    Idle,
    Pending(ReadyCheck),
    Confirmed(ReadyCheck),
}

/// Result of a participant's answer
#[derive(Debug, Clone, PartialEq)]
pub enum RespondOutcome {
    /// Still waiting on other participants
    Waiting { accepted: usize, total: usize },
    /// Everyone accepted; the check waits for its game to be created
    Confirmed(ReadyCheck),
    /// The check ended without a game
    Cancelled {
        check: ReadyCheck,
        reason: CancelReason,
    },
}

/// Ready check engine of one server
#[derive(Debug)]
pub struct ReadyCheckEngine {
    server_id: ServerId,
    timeout: Duration,
    state: ReadyCheckState,
}

impl ReadyCheckEngine {
    pub fn new(server_id: ServerId, timeout: Duration) -> Self {
        Self {
            server_id,
            timeout,
            state: ReadyCheckState::Idle,
        }
    }

    pub fn state(&self) -> &ReadyCheckState {
        &self.state
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The pending check, if any
    pub fn active(&self) -> Option<&ReadyCheck> {
        match &self.state {
            ReadyCheckState::Pending(check) => Some(check),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ReadyCheckState::Idle)
    }

    /// Whether the player is part of the pending check
    pub fn is_participant(&self, player_id: PlayerId) -> bool {
        self.active()
            .map(|check| check.is_participant(player_id))
            .unwrap_or(false)
    }

    /// Start a check for a candidate game
    pub fn start(&mut self, candidate: CandidateGame, now: DateTime<Utc>) -> EngineResult<&ReadyCheck> {
        if !self.is_idle() {
            return Err(QueueError::AlreadyPending {
                server_id: self.server_id,
            });
        }

        let check = ReadyCheck::new(candidate, now, self.timeout);
        info!(
            "Ready check {} started on server {} for {} players",
            check.id,
            self.server_id,
            check.participants.len()
        );

        self.state = ReadyCheckState::Pending(check);
        match &self.state {
            ReadyCheckState::Pending(check) => Ok(check),
            _ => Err(QueueError::InternalError {
                message: "Ready check was not stored".to_string(),
            }),
        }
    }

    /// Record a participant's answer
    pub fn respond(
        &mut self,
        player_id: PlayerId,
        response: ReadyResponse,
    ) -> EngineResult<RespondOutcome> {
        let check = match &mut self.state {
            ReadyCheckState::Pending(check) if check.is_participant(player_id) => check,
            _ => return Err(QueueError::NoActiveCheck { player_id }),
        };

        match response {
            ReadyResponse::Decline => {
                check.set_status(player_id, ReadyStatus::Declined);
                let reason = CancelReason::Declined { player_id };
                let check = self
                    .take_pending()
                    .ok_or(QueueError::NoActiveCheck { player_id })?;
                self.log_cancel(&check, &reason);
                Ok(RespondOutcome::Cancelled { check, reason })
            }
            ReadyResponse::Accept => {
                check.set_status(player_id, ReadyStatus::Accepted);
                if !check.all_accepted() {
                    let accepted = check.players_with(ReadyStatus::Accepted).len();
                    let total = check.participants.len();
                    debug!(
                        "Player {} accepted ready check {} ({}/{})",
                        player_id, check.id, accepted, total
                    );
                    return Ok(RespondOutcome::Waiting { accepted, total });
                }

                let check = check.clone();
                info!(
                    "Ready check {} confirmed on server {}",
                    check.id, self.server_id
                );
                self.state = ReadyCheckState::Confirmed(check.clone());
                Ok(RespondOutcome::Confirmed(check))
            }
        }
    }

    /// Deadline of check `check_id` passed
    ///
    /// Returns nothing when that check is no longer pending.
    pub fn expire(&mut self, check_id: ReadyCheckId) -> Option<(ReadyCheck, CancelReason)> {
        match &self.state {
            ReadyCheckState::Pending(check) if check.id == check_id => {}
            _ => {
                debug!(
                    "Ignoring expiry of ready check {} on server {}",
                    check_id, self.server_id
                );
                return None;
            }
        }

        let check = self.take_pending()?;
        let reason = CancelReason::Timeout {
            non_responders: check.players_with(ReadyStatus::Pending),
        };
        self.log_cancel(&check, &reason);
        Some((check, reason))
    }

    /// A participant left the queue while the check was pending
    pub fn withdraw(&mut self, player_id: PlayerId) -> Option<(ReadyCheck, CancelReason)> {
        if !self.is_participant(player_id) {
            return None;
        }

        let mut check = self.take_pending()?;
        check.set_status(player_id, ReadyStatus::Declined);
        let reason = CancelReason::Left { player_id };
        self.log_cancel(&check, &reason);
        Some((check, reason))
    }

    /// Force-cancel the pending check
    pub fn cancel(&mut self) -> Option<(ReadyCheck, CancelReason)> {
        let check = self.take_pending()?;
        let reason = CancelReason::ForceCancelled;
        self.log_cancel(&check, &reason);
        Some((check, reason))
    }

    /// Leave the confirmed state once the game exists
    pub fn finish(&mut self) -> Option<ReadyCheck> {
        match std::mem::replace(&mut self.state, ReadyCheckState::Idle) {
            ReadyCheckState::Confirmed(check) => Some(check),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Move a pending check out, leaving the engine idle
    fn take_pending(&mut self) -> Option<ReadyCheck> {
        match std::mem::replace(&mut self.state, ReadyCheckState::Idle) {
            ReadyCheckState::Pending(check) => Some(check),
            other => {
                self.state = other;
                None
            }
        }
    }

    fn log_cancel(&self, check: &ReadyCheck, reason: &CancelReason) {
        info!(
            "Ready check {} cancelled on server {}: {}",
            check.id, self.server_id, reason
        );
    }
}
