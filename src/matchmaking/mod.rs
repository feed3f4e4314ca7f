//! Matchmaking: session-to-room assignment

pub mod queue;
pub mod service;

pub use service::{MatchmakingError, MatchmakingService, RegisterOutcome};
