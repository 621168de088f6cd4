//! Matchmaking decision logic
//!
//! The scheduler decides when to challenge, opponent selection decides whom
//! and on what terms, and the acceptor applies the slot policy to incoming
//! challenges.

pub mod acceptance;
pub mod acceptor;
pub mod category;
pub mod scheduler;
pub mod selection;

pub use acceptance::AcceptanceMemory;
pub use acceptor::accept_challenges;
pub use category::{configured_time_controls, game_category};
pub use scheduler::MatchmakingScheduler;
pub use selection::{
    LiveOpponentSelector, OpponentSelector, SelectedMatch, SelectionRequest,
};
