//! Matchmaking configuration
//!
//! Typed configuration for the scheduler, with serde defaults for every field,
//! named partial overrides that overlay only the fields they set, and
//! validation of the base config and every merged override.

use anyhow::{anyhow, Context, Result};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// How strongly to prefer higher- or lower-rated opponents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingPreference {
    High,
    Low,
    #[default]
    None,
}

/// How much decline feedback to remember per opponent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeFilter {
    /// Ignore declines entirely
    #[default]
    None,
    /// Remember only that the opponent declined (full suppression)
    Coarse,
    /// Remember the specific aspect the opponent declined
    Fine,
}

/// Target count of concurrently outstanding background correspondence games
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrespondenceTarget {
    Limited(u32),
    Unbounded,
}

impl CorrespondenceTarget {
    /// Whether the current reservation count already satisfies the target
    pub fn is_met(&self, current: usize) -> bool {
        match self {
            CorrespondenceTarget::Limited(target) => current >= *target as usize,
            CorrespondenceTarget::Unbounded => false,
        }
    }
}

impl Default for CorrespondenceTarget {
    fn default() -> Self {
        CorrespondenceTarget::Limited(1)
    }
}

impl Serialize for CorrespondenceTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CorrespondenceTarget::Limited(n) => serializer.serialize_u32(*n),
            CorrespondenceTarget::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

impl<'de> Deserialize<'de> for CorrespondenceTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TargetVisitor;

        impl<'de> Visitor<'de> for TargetVisitor {
            type Value = CorrespondenceTarget;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a non-negative integer or the string \"unbounded\"")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                u32::try_from(value)
                    .map(CorrespondenceTarget::Limited)
                    .map_err(|_| E::custom("correspondence target too large"))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                if value < 0 {
                    // Negative values clamp to zero rather than erroring.
                    Ok(CorrespondenceTarget::Limited(0))
                } else {
                    self.visit_u64(value as u64)
                }
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                match value {
                    "unbounded" => Ok(CorrespondenceTarget::Unbounded),
                    other => Err(E::custom(format!(
                        "unknown correspondence target: {other}"
                    ))),
                }
            }
        }

        deserializer.deserialize_any(TargetVisitor)
    }
}

/// Matchmaking configuration consumed by the scheduler and opponent selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Whether outgoing matchmaking is enabled at all
    pub allow_matchmaking: bool,
    /// Whether to create challenges while games are already running
    pub allow_during_games: bool,
    /// Post-game cooldown before the next challenge, in minutes
    pub challenge_timeout: i64,
    /// Base clock choices in seconds, combined with every increment
    pub challenge_initial_time: Vec<u32>,
    /// Increment choices in seconds
    pub challenge_increment: Vec<u32>,
    /// Correspondence day-count choices
    pub challenge_days: Vec<u32>,
    /// Variant to challenge with, or "random"
    pub challenge_variant: String,
    /// "casual", "rated", or "random"
    pub challenge_mode: String,
    /// Variant pool used when challenge_variant is "random"
    pub variants: Vec<String>,
    pub opponent_min_rating: i64,
    pub opponent_max_rating: i64,
    /// When set, recentre the rating window around our own rating
    pub opponent_rating_difference: Option<i64>,
    pub rating_preference: RatingPreference,
    pub challenge_filter: ChallengeFilter,
    /// Usernames never to challenge
    pub block_list: Vec<String>,
    /// Sources for the dynamically refreshed blocklist
    pub online_block_list: Vec<String>,
    /// Named partial configurations, one picked at random per attempt
    pub overrides: BTreeMap<String, MatchmakingOverride>,
    pub max_background_correspondence_games: CorrespondenceTarget,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            allow_matchmaking: false,
            allow_during_games: false,
            challenge_timeout: 30,
            challenge_initial_time: vec![60],
            challenge_increment: vec![2],
            challenge_days: Vec::new(),
            challenge_variant: "random".to_string(),
            challenge_mode: "random".to_string(),
            variants: vec!["standard".to_string()],
            opponent_min_rating: 600,
            opponent_max_rating: 4000,
            opponent_rating_difference: None,
            rating_preference: RatingPreference::None,
            challenge_filter: ChallengeFilter::None,
            block_list: Vec::new(),
            online_block_list: Vec::new(),
            overrides: BTreeMap::new(),
            max_background_correspondence_games: CorrespondenceTarget::default(),
        }
    }
}

/// A named partial configuration; only the fields present overlay the base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingOverride {
    pub challenge_initial_time: Option<Vec<u32>>,
    pub challenge_increment: Option<Vec<u32>>,
    pub challenge_days: Option<Vec<u32>>,
    pub challenge_variant: Option<String>,
    pub challenge_mode: Option<String>,
    pub opponent_min_rating: Option<i64>,
    pub opponent_max_rating: Option<i64>,
    pub opponent_rating_difference: Option<i64>,
    pub rating_preference: Option<RatingPreference>,
}

impl MatchmakingConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Produce a new effective configuration with the override's fields
    /// overlaid on this one. The base is never mutated.
    pub fn apply_override(&self, overlay: &MatchmakingOverride) -> Self {
        let mut merged = self.clone();
        if let Some(value) = &overlay.challenge_initial_time {
            merged.challenge_initial_time = value.clone();
        }
        if let Some(value) = &overlay.challenge_increment {
            merged.challenge_increment = value.clone();
        }
        if let Some(value) = &overlay.challenge_days {
            merged.challenge_days = value.clone();
        }
        if let Some(value) = &overlay.challenge_variant {
            merged.challenge_variant = value.clone();
        }
        if let Some(value) = &overlay.challenge_mode {
            merged.challenge_mode = value.clone();
        }
        if let Some(value) = overlay.opponent_min_rating {
            merged.opponent_min_rating = value;
        }
        if let Some(value) = overlay.opponent_max_rating {
            merged.opponent_max_rating = value;
        }
        if let Some(value) = overlay.opponent_rating_difference {
            merged.opponent_rating_difference = Some(value);
        }
        if let Some(value) = overlay.rating_preference {
            merged.rating_preference = value;
        }
        merged
    }

    /// Post-game cooldown as a chrono duration
    pub fn challenge_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.challenge_timeout)
    }
}

/// Validate configuration values, including every merged override
pub fn validate_config(config: &MatchmakingConfig) -> Result<()> {
    validate_effective(config, "base")?;
    for (name, overlay) in &config.overrides {
        let merged = config.apply_override(overlay);
        validate_effective(&merged, name)?;
    }
    Ok(())
}

fn validate_effective(config: &MatchmakingConfig, name: &str) -> Result<()> {
    if config.challenge_timeout < 0 {
        return Err(anyhow!(
            "[{name}] challenge_timeout must be non-negative"
        ));
    }
    if config.opponent_min_rating > config.opponent_max_rating {
        return Err(anyhow!(
            "[{name}] opponent_min_rating must not exceed opponent_max_rating"
        ));
    }
    if let Some(difference) = config.opponent_rating_difference {
        if difference < 0 {
            return Err(anyhow!(
                "[{name}] opponent_rating_difference must be non-negative"
            ));
        }
    }
    if config.challenge_variant == "random" && config.variants.is_empty() {
        return Err(anyhow!(
            "[{name}] variants must not be empty when challenge_variant is \"random\""
        ));
    }
    match config.challenge_mode.as_str() {
        "casual" | "rated" | "random" => {}
        other => {
            return Err(anyhow!("[{name}] invalid challenge_mode: {other}"));
        }
    }
    Ok(())
}
