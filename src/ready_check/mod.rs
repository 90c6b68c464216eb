//! Time-boxed confirmation of candidate games
//!
//! Deadline timers live with the server actor; the engine here only
//! tracks answers and decides the outcome.

pub mod check;
pub mod engine;

pub use check::{CancelReason, ParticipantStatus, ReadyCheck, ReadyResponse, ReadyStatus};
pub use engine::{ReadyCheckEngine, ReadyCheckState, RespondOutcome};
