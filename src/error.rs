//! Error types for the matchmaking scheduler
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the crate.

use std::time::Duration;

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific scheduling scenarios
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The game server asked us to back off for a while.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("game service request failed: {message}")]
    ServiceUnavailable { message: String },

    #[error("challenge rejected: {reason}")]
    ChallengeRejected { reason: String },

    #[error("opponent not found: {username}")]
    OpponentNotFound { username: String },

    #[error("configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("internal scheduler error: {message}")]
    InternalError { message: String },
}

impl SchedulerError {
    /// Retry-after duration if this is a rate-limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SchedulerError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
