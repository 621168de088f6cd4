//! Configuration management for the matchmaking scheduler
//!
//! This module handles the typed matchmaking configuration, named partial
//! overrides, validation, and TOML loading.

pub mod matchmaking;

// Re-export commonly used types
pub use matchmaking::{
    validate_config, ChallengeFilter, CorrespondenceTarget, MatchmakingConfig,
    MatchmakingOverride, RatingPreference,
};
