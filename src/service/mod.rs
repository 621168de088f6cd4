//! External game-server boundary
//!
//! The scheduler never talks to the network itself; everything it needs from
//! the game server goes through the [`GameService`] trait defined here.

pub mod game;

// Re-export commonly used types
pub use game::{ChallengeRequest, ChallengeResponse, GameService, MockGameService, ScriptedOutcome};
