//! Committed games awaiting a result

pub mod lifecycle;

pub use lifecycle::{Game, GameLifecycle, GameTransition};
