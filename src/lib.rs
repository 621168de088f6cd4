//! Botmatch - Slot-aware matchmaking scheduler for an online chess bot
//!
//! This crate decides when a bot should challenge other bots, whom to
//! challenge, and which incoming challenges fit the concurrency budget:
//! one human slot, one short-clock and one long-clock bot lane, with a
//! background correspondence game riding alongside.

pub mod blocklist;
pub mod clock;
pub mod config;
pub mod error;
pub mod matchmaking;
pub mod service;
pub mod slots;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{Result, SchedulerError};
pub use types::*;

// Re-export key components
pub use matchmaking::{
    accept_challenges, AcceptanceMemory, LiveOpponentSelector, MatchmakingScheduler,
    OpponentSelector,
};
pub use slots::SlotTracker;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
