//! Server actor and its handle
//!
//! The actor owns a [`ServerState`] and applies commands one at a time.
//! After every command it publishes the committed transitions and keeps the
//! deadline timer in step with the pending ready check.

use crate::engine::server::{ReadyCheckReply, ServerState};
use crate::engine::snapshot::{ServerSnapshot, StateChange};
use crate::engine::EngineStats;
use crate::error::{EngineResult, QueueError};
use crate::ready_check::check::{CancelReason, ReadyResponse};
use crate::types::{
    GameCancelReason, GameId, GameOutcome, PlayerId, RatingChange, ReadyCheckId, Role, ServerId,
};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Requests handled by a server actor
#[derive(Debug)]
pub enum ServerCommand {
    Join {
        player_id: PlayerId,
        role: Role,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    JoinDuo {
        first: (PlayerId, Role),
        second: (PlayerId, Role),
        reply: oneshot::Sender<EngineResult<()>>,
    },
    Leave {
        player_id: PlayerId,
        reply: oneshot::Sender<bool>,
    },
    Respond {
        player_id: PlayerId,
        response: ReadyResponse,
        reply: oneshot::Sender<EngineResult<ReadyCheckReply>>,
    },
    ResetQueue {
        reply: oneshot::Sender<usize>,
    },
    CancelReadyCheck {
        reply: oneshot::Sender<Option<CancelReason>>,
    },
    ScoreGame {
        game_id: GameId,
        outcome: GameOutcome,
        reply: oneshot::Sender<EngineResult<Vec<RatingChange>>>,
    },
    CancelGame {
        game_id: GameId,
        reason: GameCancelReason,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    GamesAwaitingResult {
        cutoff: DateTime<Utc>,
        reply: oneshot::Sender<Vec<GameId>>,
    },
    Snapshot {
        reply: oneshot::Sender<ServerSnapshot>,
    },
    /// Deadline of a ready check passed; sent by the actor's own timer
    Expire { check_id: ReadyCheckId },
}

impl ServerCommand {
    /// Command name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ServerCommand::Join { .. } => "join",
            ServerCommand::JoinDuo { .. } => "join_duo",
            ServerCommand::Leave { .. } => "leave",
            ServerCommand::Respond { .. } => "respond",
            ServerCommand::ResetQueue { .. } => "reset_queue",
            ServerCommand::CancelReadyCheck { .. } => "cancel_ready_check",
            ServerCommand::ScoreGame { .. } => "score_game",
            ServerCommand::CancelGame { .. } => "cancel_game",
            ServerCommand::GamesAwaitingResult { .. } => "games_awaiting_result",
            ServerCommand::Snapshot { .. } => "snapshot",
            ServerCommand::Expire { .. } => "expire",
        }
    }

    fn player_id(&self) -> Option<PlayerId> {
        match self {
            ServerCommand::Join { player_id, .. }
            | ServerCommand::Leave { player_id, .. }
            | ServerCommand::Respond { player_id, .. } => Some(*player_id),
            ServerCommand::JoinDuo { first, .. } => Some(first.0),
            _ => None,
        }
    }
}

struct DeadlineTimer {
    check_id: ReadyCheckId,
    handle: JoinHandle<()>,
}

/// Actor owning one server's state
pub struct ServerActor {
    state: ServerState,
    commands: mpsc::Receiver<ServerCommand>,
    /// Weak so that pending timers do not keep the actor alive
    timer_sender: mpsc::WeakSender<ServerCommand>,
    events: broadcast::Sender<StateChange>,
    stats: Arc<RwLock<EngineStats>>,
    timer: Option<DeadlineTimer>,
}

impl ServerActor {
    /// Spawn an actor for `state` and return its handle
    pub fn spawn(
        state: ServerState,
        buffer: usize,
        events: broadcast::Sender<StateChange>,
        stats: Arc<RwLock<EngineStats>>,
    ) -> ServerHandle {
        let server_id = state.server_id();
        let (sender, commands) = mpsc::channel(buffer.max(1));

        let actor = Self {
            state,
            commands,
            timer_sender: sender.downgrade(),
            events,
            stats,
            timer: None,
        };
        let task = tokio::spawn(actor.run());

        ServerHandle {
            server_id,
            sender,
            task: Arc::new(task),
        }
    }

    async fn run(mut self) {
        let server_id = self.state.server_id();
        info!("Server actor {} started", server_id);

        while let Some(command) = self.commands.recv().await {
            self.handle(command);
            self.publish();
            self.sync_timer();
        }

        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
        info!("Server actor {} stopped", server_id);
    }

    fn handle(&mut self, command: ServerCommand) {
        let now = current_timestamp();
        debug!(
            server_id = self.state.server_id(),
            player_id = ?command.player_id(),
            command = command.name(),
            "Handling command"
        );

        // A dropped reply receiver only means the caller stopped waiting
        match command {
            ServerCommand::Join {
                player_id,
                role,
                reply,
            } => {
                let _ = reply.send(self.state.join(player_id, role, now));
            }
            ServerCommand::JoinDuo {
                first,
                second,
                reply,
            } => {
                let _ = reply.send(self.state.join_duo(first, second, now));
            }
            ServerCommand::Leave { player_id, reply } => {
                let _ = reply.send(self.state.leave(player_id, now));
            }
            ServerCommand::Respond {
                player_id,
                response,
                reply,
            } => {
                let _ = reply.send(self.state.respond(player_id, response, now));
            }
            ServerCommand::ResetQueue { reply } => {
                let _ = reply.send(self.state.reset_queue());
            }
            ServerCommand::CancelReadyCheck { reply } => {
                let _ = reply.send(self.state.cancel_ready_check(now));
            }
            ServerCommand::ScoreGame {
                game_id,
                outcome,
                reply,
            } => {
                let _ = reply.send(self.state.score_game(game_id, outcome, now));
            }
            ServerCommand::CancelGame {
                game_id,
                reason,
                reply,
            } => {
                let _ = reply.send(self.state.cancel_game(game_id, reason, now));
            }
            ServerCommand::GamesAwaitingResult { cutoff, reply } => {
                let _ = reply.send(self.state.games_awaiting_result(cutoff));
            }
            ServerCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot(now));
            }
            ServerCommand::Expire { check_id } => {
                if !self.state.expire(check_id, now) {
                    debug!("Stale deadline for ready check {} ignored", check_id);
                }
            }
        }
    }

    fn publish(&mut self) {
        let transitions = self.state.take_transitions();
        if transitions.is_empty() {
            return;
        }

        match self.stats.write() {
            Ok(mut stats) => transitions.iter().for_each(|t| stats.record(t)),
            Err(_) => warn!("Failed to acquire engine stats lock"),
        }

        let snapshot = self.state.snapshot(current_timestamp());
        for transition in transitions {
            // No subscribers is fine
            let _ = self.events.send(StateChange {
                server_id: snapshot.server_id,
                transition,
                snapshot: snapshot.clone(),
            });
        }
    }

    /// Keep exactly one timer running for the pending ready check
    fn sync_timer(&mut self) {
        let active = self.state.active_check().map(|check| check.id);
        if active.is_some() && active == self.timer.as_ref().map(|t| t.check_id) {
            return;
        }

        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }

        if let Some(check_id) = active {
            let sender = self.timer_sender.clone();
            let timeout = self.state.ready_check_timeout();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(sender) = sender.upgrade() {
                    let _ = sender.send(ServerCommand::Expire { check_id }).await;
                }
            });
            self.timer = Some(DeadlineTimer { check_id, handle });
        }
    }
}

/// Cheap, cloneable handle to a server actor
#[derive(Debug, Clone)]
pub struct ServerHandle {
    server_id: ServerId,
    sender: mpsc::Sender<ServerCommand>,
    task: Arc<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Whether the actor is still accepting commands
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed() && !self.task.is_finished()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ServerCommand,
    ) -> EngineResult<T> {
        let unavailable = || QueueError::ServerUnavailable {
            server_id: self.server_id,
        };
        let (reply, response) = oneshot::channel();

        self.sender
            .send(command(reply))
            .await
            .map_err(|_| unavailable())?;
        response.await.map_err(|_| unavailable())
    }

    pub async fn join(&self, player_id: PlayerId, role: Role) -> EngineResult<()> {
        self.request(|reply| ServerCommand::Join {
            player_id,
            role,
            reply,
        })
        .await?
    }

    pub async fn join_duo(&self, first: (PlayerId, Role), second: (PlayerId, Role)) -> EngineResult<()> {
        self.request(|reply| ServerCommand::JoinDuo {
            first,
            second,
            reply,
        })
        .await?
    }

    /// Leave the queue; returns whether the player had anything to leave
    pub async fn leave(&self, player_id: PlayerId) -> EngineResult<bool> {
        self.request(|reply| ServerCommand::Leave { player_id, reply })
            .await
    }

    pub async fn respond(
        &self,
        player_id: PlayerId,
        response: ReadyResponse,
    ) -> EngineResult<ReadyCheckReply> {
        self.request(|reply| ServerCommand::Respond {
            player_id,
            response,
            reply,
        })
        .await?
    }

    pub async fn reset_queue(&self) -> EngineResult<usize> {
        self.request(|reply| ServerCommand::ResetQueue { reply })
            .await
    }

    pub async fn cancel_ready_check(&self) -> EngineResult<Option<CancelReason>> {
        self.request(|reply| ServerCommand::CancelReadyCheck { reply })
            .await
    }

    pub async fn score_game(
        &self,
        game_id: GameId,
        outcome: GameOutcome,
    ) -> EngineResult<Vec<RatingChange>> {
        self.request(|reply| ServerCommand::ScoreGame {
            game_id,
            outcome,
            reply,
        })
        .await?
    }

    pub async fn cancel_game(&self, game_id: GameId, reason: GameCancelReason) -> EngineResult<()> {
        self.request(|reply| ServerCommand::CancelGame {
            game_id,
            reason,
            reply,
        })
        .await?
    }

    /// Open games created at or before `cutoff`
    pub async fn games_awaiting_result(&self, cutoff: DateTime<Utc>) -> EngineResult<Vec<GameId>> {
        self.request(|reply| ServerCommand::GamesAwaitingResult { cutoff, reply })
            .await
    }

    pub async fn snapshot(&self) -> EngineResult<ServerSnapshot> {
        self.request(|reply| ServerCommand::Snapshot { reply })
            .await
    }
}
