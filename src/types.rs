//! Common types used throughout the matchmaking scheduler

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Unique identifier for games (server-issued)
pub type GameId = String;

/// Unique identifier for challenges (server-issued)
pub type ChallengeId = String;

/// Game speed as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Speed {
    UltraBullet,
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Correspondence,
}

impl Speed {
    /// Classify a real-time clock into a speed. `days` games are correspondence
    /// and never go through this; the thresholds are lower-exclusive.
    pub fn classify(base_time: i64, increment: i64) -> Speed {
        let duration = base_time + increment * 40;
        if duration < 179 {
            Speed::Bullet
        } else if duration < 479 {
            Speed::Blitz
        } else if duration < 1499 {
            Speed::Rapid
        } else {
            Speed::Classical
        }
    }

    /// The bot lane this speed belongs to. Correspondence is treated as long
    /// for time-control filtering purposes.
    pub fn bot_lane(&self) -> BotLane {
        match self {
            Speed::UltraBullet | Speed::Bullet | Speed::Blitz => BotLane::Short,
            Speed::Rapid | Speed::Classical | Speed::Correspondence => BotLane::Long,
        }
    }

    pub fn is_correspondence(&self) -> bool {
        matches!(self, Speed::Correspondence)
    }

    /// Server-side key for this speed, also its rating-category name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Speed::UltraBullet => "ultraBullet",
            Speed::Bullet => "bullet",
            Speed::Blitz => "blitz",
            Speed::Rapid => "rapid",
            Speed::Classical => "classical",
            Speed::Correspondence => "correspondence",
        }
    }
}

impl std::fmt::Display for Speed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Speed {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ultraBullet" => Ok(Speed::UltraBullet),
            "bullet" => Ok(Speed::Bullet),
            "blitz" => Ok(Speed::Blitz),
            "rapid" => Ok(Speed::Rapid),
            "classical" => Ok(Speed::Classical),
            "correspondence" => Ok(Speed::Correspondence),
            other => Err(anyhow::anyhow!("unknown speed: {other}")),
        }
    }
}

/// Outgoing bot matchmaking is split into a short-clock and a long-clock lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotLane {
    Short,
    Long,
}

impl std::fmt::Display for BotLane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotLane::Short => write!(f, "short"),
            BotLane::Long => write!(f, "long"),
        }
    }
}

/// Category bucket a reservation occupies in the slot tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Human,
    BotShort,
    BotLong,
    Correspondence,
    /// Catch-all used when per-lane accounting is disabled.
    Any,
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lane::Human => write!(f, "human"),
            Lane::BotShort => write!(f, "bot-short"),
            Lane::BotLong => write!(f, "bot-long"),
            Lane::Correspondence => write!(f, "correspondence"),
            Lane::Any => write!(f, "any"),
        }
    }
}

/// Whether a game is rated or casual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Casual,
    Rated,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Casual => "casual",
            GameMode::Rated => "rated",
        }
    }

    pub fn is_rated(&self) -> bool {
        matches!(self, GameMode::Rated)
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "casual" => Ok(GameMode::Casual),
            "rated" => Ok(GameMode::Rated),
            other => Err(anyhow::anyhow!("unknown game mode: {other}")),
        }
    }
}

/// A concrete time control: a real-time clock or a correspondence day count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeControl {
    /// Base clock in seconds (zero for correspondence)
    pub base_time: u32,
    /// Increment per move in seconds (zero for correspondence)
    pub increment: u32,
    /// Days per move (zero for real-time)
    pub days: u32,
}

impl TimeControl {
    pub fn real_time(base_time: u32, increment: u32) -> Self {
        Self {
            base_time,
            increment,
            days: 0,
        }
    }

    pub fn correspondence(days: u32) -> Self {
        Self {
            base_time: 0,
            increment: 0,
            days,
        }
    }

    pub fn is_correspondence(&self) -> bool {
        self.days > 0
    }

    /// Speed of this control for standard chess. Days take precedence over the
    /// clock when both are set.
    pub fn speed(&self) -> Speed {
        if self.is_correspondence() {
            Speed::Correspondence
        } else {
            Speed::classify(self.base_time as i64, self.increment as i64)
        }
    }
}

impl std::fmt::Display for TimeControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_correspondence() {
            write!(f, "{}d", self.days)
        } else {
            write!(f, "{}+{}", self.base_time, self.increment)
        }
    }
}

/// Per-category performance numbers from a profile
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Perf {
    #[serde(default)]
    pub rating: i64,
    #[serde(default)]
    pub games: u32,
}

/// Our own account profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub perfs: HashMap<String, Perf>,
}

impl UserProfile {
    /// Our rating in a category, zero if we have no perf there yet.
    pub fn rating(&self, category: &str) -> i64 {
        self.perfs.get(category).map_or(0, |perf| perf.rating)
    }
}

/// Public profile of another bot account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotProfile {
    pub username: String,
    #[serde(default)]
    pub perfs: HashMap<String, Perf>,
    /// Whether this account blocks us
    #[serde(default)]
    pub blocking: bool,
}

impl BotProfile {
    pub fn rating(&self, category: &str) -> i64 {
        self.perfs.get(category).map_or(0, |perf| perf.rating)
    }

    pub fn games(&self, category: &str) -> u32 {
        self.perfs.get(category).map_or(0, |perf| perf.games)
    }
}

/// A challenge as seen in server events, incoming or outgoing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    /// The other party's username
    pub opponent: String,
    /// True when we created this challenge
    pub from_self: bool,
    /// Whether the challenging account is a bot
    pub challenger_is_bot: bool,
    pub speed: Speed,
    pub variant: String,
    pub rated: bool,
}

impl std::fmt::Display for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.rated { "rated" } else { "casual" };
        write!(
            f,
            "challenge {} ({} {} {})",
            self.id, mode, self.speed, self.variant
        )
    }
}

/// Event payload for a declined challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeDeclined {
    pub challenge: Challenge,
    /// Human-readable decline reason from the server
    pub reason: String,
    /// Machine-readable decline reason key
    pub reason_key: String,
}
