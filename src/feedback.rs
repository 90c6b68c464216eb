//! User-facing text for engine errors
//!
//! The engine reports failures as [`QueueError`] kinds; chat front ends turn
//! them into messages here.

use crate::error::{BarReason, QueueError};
use serde::{Deserialize, Serialize};

/// Presentation settings of a chat front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackOptions {
    /// Command prefix shown in hints
    pub prefix: String,
    /// Whether games are scored automatically by the tournament integration
    pub tournaments_enabled: bool,
    /// Channel where players report problems
    pub support_channel: String,
}

impl Default for FeedbackOptions {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            tournaments_enabled: false,
            support_channel: "#inhouse".to_string(),
        }
    }
}

/// Message to show the player whose command failed
pub fn describe(error: &QueueError, options: &FeedbackOptions) -> String {
    let prefix = &options.prefix;

    match error {
        QueueError::SameRolesForDuo { .. } => "Duos must have different roles".to_string(),
        QueueError::PlayerBarred {
            reason: BarReason::InGame(_),
            ..
        } => {
            let scoring = if options.tournaments_enabled {
                "The game will automatically be scored shortly after it ends, ".to_string()
            } else {
                format!("One of the winners can score the game with `{}won`, ", prefix)
            };
            format!(
                "Your last game was not scored and you are not allowed to queue at the moment.\n{}or players can agree to cancel it with `{}cancel`",
                scoring, prefix
            )
        }
        QueueError::PlayerBarred {
            reason: BarReason::InReadyCheck,
            ..
        } => format!(
            "A game has already been found for you and you cannot queue until it is accepted or cancelled\n\
             If it is a bug, post in {} and ask them to use `{}admin reset` with your name",
            options.support_channel, prefix
        ),
        QueueError::AlreadyQueued { .. } => {
            format!("You are already in queue, use `{}leave` to leave it first", prefix)
        }
        QueueError::NoActiveCheck { .. } => "You are not part of a pending ready check".to_string(),
        QueueError::AlreadyPending { .. } => {
            "A ready check is already running, please wait for it to finish".to_string()
        }
        QueueError::UnknownGame { .. } => "This game could not be found".to_string(),
        QueueError::AlreadyScored { .. } => "This game was already scored or cancelled".to_string(),
        QueueError::InvalidQueueRequest { reason } => format!("Invalid request: {}", reason),
        QueueError::StaleCandidate { .. }
        | QueueError::ServerUnavailable { .. }
        | QueueError::RatingCalculationFailed { .. }
        | QueueError::ConfigurationError { .. }
        | QueueError::InternalError { .. } => format!(
            "There was an error processing the command\n\
             Use {}help for the commands list or post in {} for bugs",
            prefix, options.support_channel
        ),
    }
}
