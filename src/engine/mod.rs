//! Per-server engine: state, actors and the server registry
//!
//! Each server is owned by one actor task. Interactive commands, ready check
//! deadlines and scheduler actions all reach a server as messages on its
//! command channel, so a server's state is only ever mutated by its actor.

pub mod actor;
pub mod registry;
pub mod renderer;
pub mod server;
pub mod snapshot;

use crate::queue::matchmaker::{Matchmaker, RoleMatchmaker};
use crate::rating::calculator::RatingCalculator;
use crate::rating::storage::{InMemoryRatingStorage, RatingStorage};
use crate::rating::weng_lin::WengLinRatingCalculator;
use crate::ready_check::check::CancelReason;
use snapshot::Transition;
use std::sync::Arc;
use std::time::Duration;

pub use actor::{ServerCommand, ServerHandle};
pub use registry::ServerRegistry;
pub use renderer::{spawn_renderer, ChannelRenderer, TracingRenderer};
pub use server::{ReadyCheckReply, ServerState};
pub use snapshot::{ReadyCheckView, ServerSnapshot, StateChange};

/// Engine-wide tunables
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// How long participants have to answer a ready check
    pub ready_check_timeout: Duration,
    /// Game transitions kept per server for snapshots
    pub recent_games: usize,
    /// Closed games kept per server for duplicate detection
    pub closed_game_retention: usize,
    /// Capacity of each server's command channel
    pub command_buffer: usize,
    /// Capacity of the state-change broadcast channel
    pub event_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ready_check_timeout: Duration::from_secs(60),
            recent_games: 10,
            closed_game_retention: 200,
            command_buffer: 64,
            event_buffer: 256,
        }
    }
}

/// Shared collaborators handed to every server
#[derive(Clone)]
pub struct EngineComponents {
    pub matchmaker: Arc<dyn Matchmaker>,
    pub rating_storage: Arc<dyn RatingStorage>,
    pub rating_calculator: Arc<dyn RatingCalculator>,
}

impl EngineComponents {
    pub fn new(
        matchmaker: Arc<dyn Matchmaker>,
        rating_storage: Arc<dyn RatingStorage>,
        rating_calculator: Arc<dyn RatingCalculator>,
    ) -> Self {
        Self {
            matchmaker,
            rating_storage,
            rating_calculator,
        }
    }

    /// Components sharing one rating calculator
    pub fn with_calculator(rating_calculator: Arc<dyn RatingCalculator>) -> Self {
        Self {
            matchmaker: Arc::new(RoleMatchmaker::new(rating_calculator.clone())),
            rating_storage: Arc::new(InMemoryRatingStorage::new()),
            rating_calculator,
        }
    }
}

impl Default for EngineComponents {
    fn default() -> Self {
        Self::with_calculator(Arc::new(WengLinRatingCalculator::default()))
    }
}

/// Statistics about engine operations
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct EngineStats {
    /// Total number of players queued (a duo counts twice)
    pub players_queued: u64,
    pub ready_checks_started: u64,
    pub ready_checks_confirmed: u64,
    pub ready_checks_cancelled: u64,
    pub ready_checks_timed_out: u64,
    pub games_created: u64,
    pub games_scored: u64,
    pub games_cancelled: u64,
    pub queue_resets: u64,
    /// Current number of servers with a running actor
    pub servers_active: usize,
}

impl EngineStats {
    /// Count one committed transition
    pub fn record(&mut self, transition: &Transition) {
        match transition {
            Transition::PlayerQueued { .. } => self.players_queued += 1,
            Transition::DuoQueued { .. } => self.players_queued += 2,
            Transition::PlayerLeft { .. } | Transition::ReadyCheckAnswered { .. } => {}
            Transition::QueueReset { .. } => self.queue_resets += 1,
            Transition::ReadyCheckStarted { .. } => self.ready_checks_started += 1,
            Transition::ReadyCheckCancelled { reason, .. } => {
                self.ready_checks_cancelled += 1;
                if matches!(reason, CancelReason::Timeout { .. }) {
                    self.ready_checks_timed_out += 1;
                }
            }
            Transition::GameCreated { .. } => {
                self.ready_checks_confirmed += 1;
                self.games_created += 1;
            }
            Transition::GameScored { .. } => self.games_scored += 1,
            Transition::GameCancelled { .. } => self.games_cancelled += 1,
        }
    }
}
