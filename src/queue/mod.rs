//! Queue storage and matchmaking
//!
//! A server's queue holds solo and duo entries in join order. The matchmaker
//! reads the queue and proposes at most one candidate game at a time.

pub mod matchmaker;
pub mod store;

pub use matchmaker::{CandidateGame, CandidateSlot, Matchmaker, RoleMatchmaker};
pub use store::{QueueEntry, QueueStore};
