//! Game service interface and mock implementation
//!
//! This module defines the interface the host implements against the game
//! server: challenge creation and cancellation, online-bot discovery, and
//! profile lookups. Rate limiting is reported either as a
//! [`SchedulerError::RateLimited`] error or through flags on the challenge
//! response, matching how the server behaves.

use crate::error::{Result, SchedulerError};
use crate::types::{BotProfile, ChallengeId, GameMode, TimeControl, UserProfile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// Parameters for an outgoing challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRequest {
    pub rated: bool,
    pub variant: String,
    /// Base clock in seconds, absent for correspondence
    #[serde(rename = "clock.limit", skip_serializing_if = "Option::is_none")]
    pub clock_limit: Option<u32>,
    /// Increment in seconds, absent for correspondence
    #[serde(rename = "clock.increment", skip_serializing_if = "Option::is_none")]
    pub clock_increment: Option<u32>,
    /// Days per move, absent for real-time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
}

impl ChallengeRequest {
    /// Build a request from selected terms. Fails when the configuration gave
    /// us neither days nor a usable clock.
    pub fn from_terms(control: TimeControl, variant: &str, mode: GameMode) -> Result<Self> {
        let mut request = Self {
            rated: mode.is_rated(),
            variant: variant.to_string(),
            clock_limit: None,
            clock_increment: None,
            days: None,
        };
        if control.days > 0 {
            request.days = Some(control.days);
        } else if control.base_time > 0 || control.increment > 0 {
            request.clock_limit = Some(control.base_time);
            request.clock_increment = Some(control.increment);
        } else {
            return Err(SchedulerError::ConfigurationError {
                message: "at least one of challenge_days, challenge_initial_time, or \
                          challenge_increment must be greater than zero"
                    .to_string(),
            }
            .into());
        }
        Ok(request)
    }
}

/// Server response to a challenge creation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// Id of the created challenge, absent on failure
    #[serde(default)]
    pub id: Option<ChallengeId>,
    /// We are rate limited and should back off
    #[serde(default)]
    pub bot_is_rate_limited: bool,
    /// The opponent is rate limited and cannot receive challenges right now
    #[serde(default)]
    pub opponent_is_rate_limited: bool,
    /// How long the rate limit lasts, in seconds
    #[serde(default)]
    pub rate_limit_seconds: Option<u64>,
}

impl ChallengeResponse {
    pub fn created(id: impl Into<ChallengeId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn rate_limit_timeout(&self) -> Option<chrono::Duration> {
        self.rate_limit_seconds
            .map(|secs| chrono::Duration::seconds(secs as i64))
    }
}

/// Everything the scheduler needs from the game server
#[async_trait]
pub trait GameService: Send + Sync {
    /// Send a challenge to an opponent
    async fn create_challenge(
        &self,
        opponent: &str,
        request: &ChallengeRequest,
    ) -> Result<ChallengeResponse>;

    /// Cancel an outstanding outgoing challenge
    async fn cancel_challenge(&self, challenge_id: &str) -> Result<()>;

    /// Accept an incoming challenge
    async fn accept_challenge(&self, challenge_id: &str) -> Result<()>;

    /// Decline an incoming challenge
    async fn decline_challenge(&self, challenge_id: &str, reason: &str) -> Result<()>;

    /// List bot accounts currently online
    async fn online_bots(&self) -> Result<Vec<BotProfile>>;

    /// Fetch another account's public profile
    async fn public_profile(&self, username: &str) -> Result<BotProfile>;

    /// Fetch our own profile
    async fn own_profile(&self) -> Result<UserProfile>;
}

/// Scripted outcome for the next challenge creation on the mock service
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Response(ChallengeResponse),
    RateLimited(std::time::Duration),
    Unavailable,
}

/// Mock game service for tests and the simulator
#[derive(Debug, Default)]
pub struct MockGameService {
    bots: RwLock<HashMap<String, BotProfile>>,
    profile: RwLock<UserProfile>,
    created: RwLock<Vec<(String, ChallengeRequest)>>,
    cancelled: RwLock<Vec<ChallengeId>>,
    accepted: RwLock<Vec<ChallengeId>>,
    declined: RwLock<Vec<(ChallengeId, String)>>,
    scripted: RwLock<VecDeque<ScriptedOutcome>>,
    next_id: RwLock<u64>,
}

impl MockGameService {
    pub fn new(own_profile: UserProfile) -> Self {
        Self {
            profile: RwLock::new(own_profile),
            ..Default::default()
        }
    }

    /// A mock pre-populated with a spread of online bots
    pub fn with_test_bots(own_profile: UserProfile) -> Self {
        let service = Self::new(own_profile);
        let ratings = [
            ("weakbot", 900),
            ("steadybot", 1400),
            ("midbot", 1700),
            ("sharpbot", 2100),
            ("strongbot", 2600),
        ];
        for (name, rating) in ratings {
            service.add_online_bot(test_bot(name, rating));
        }
        service
    }

    pub fn add_online_bot(&self, bot: BotProfile) {
        if let Ok(mut bots) = self.bots.write() {
            bots.insert(bot.username.clone(), bot);
        }
    }

    pub fn remove_online_bot(&self, username: &str) {
        if let Ok(mut bots) = self.bots.write() {
            bots.remove(username);
        }
    }

    /// Queue an outcome for the next challenge creation
    pub fn script_outcome(&self, outcome: ScriptedOutcome) {
        if let Ok(mut scripted) = self.scripted.write() {
            scripted.push_back(outcome);
        }
    }

    /// Challenges created so far as (opponent, request) pairs
    pub fn created_challenges(&self) -> Vec<(String, ChallengeRequest)> {
        self.created
            .read()
            .map(|created| created.clone())
            .unwrap_or_default()
    }

    pub fn cancelled_challenges(&self) -> Vec<ChallengeId> {
        self.cancelled
            .read()
            .map(|cancelled| cancelled.clone())
            .unwrap_or_default()
    }

    pub fn accepted_challenges(&self) -> Vec<ChallengeId> {
        self.accepted
            .read()
            .map(|accepted| accepted.clone())
            .unwrap_or_default()
    }

    pub fn declined_challenges(&self) -> Vec<(ChallengeId, String)> {
        self.declined
            .read()
            .map(|declined| declined.clone())
            .unwrap_or_default()
    }

    fn lock_error(what: &str) -> anyhow::Error {
        SchedulerError::InternalError {
            message: format!("failed to acquire {what} lock"),
        }
        .into()
    }
}

/// Build a bot profile with the same rating in every common category
pub fn test_bot(username: &str, rating: i64) -> BotProfile {
    let mut perfs = HashMap::new();
    for category in [
        "bullet",
        "blitz",
        "rapid",
        "classical",
        "correspondence",
        "atomic",
    ] {
        perfs.insert(
            category.to_string(),
            crate::types::Perf { rating, games: 25 },
        );
    }
    BotProfile {
        username: username.to_string(),
        perfs,
        blocking: false,
    }
}

#[async_trait]
impl GameService for MockGameService {
    async fn create_challenge(
        &self,
        opponent: &str,
        request: &ChallengeRequest,
    ) -> Result<ChallengeResponse> {
        let scripted = self
            .scripted
            .write()
            .map_err(|_| Self::lock_error("scripted"))?
            .pop_front();

        let response = match scripted {
            Some(ScriptedOutcome::Response(response)) => response,
            Some(ScriptedOutcome::RateLimited(retry_after)) => {
                return Err(SchedulerError::RateLimited { retry_after }.into());
            }
            Some(ScriptedOutcome::Unavailable) => {
                return Err(SchedulerError::ServiceUnavailable {
                    message: "scripted outage".to_string(),
                }
                .into());
            }
            None => {
                let mut next_id = self.next_id.write().map_err(|_| Self::lock_error("id"))?;
                *next_id += 1;
                ChallengeResponse::created(format!("ch{:04}", *next_id))
            }
        };

        self.created
            .write()
            .map_err(|_| Self::lock_error("created"))?
            .push((opponent.to_string(), request.clone()));

        Ok(response)
    }

    async fn cancel_challenge(&self, challenge_id: &str) -> Result<()> {
        self.cancelled
            .write()
            .map_err(|_| Self::lock_error("cancelled"))?
            .push(challenge_id.to_string());
        Ok(())
    }

    async fn accept_challenge(&self, challenge_id: &str) -> Result<()> {
        self.accepted
            .write()
            .map_err(|_| Self::lock_error("accepted"))?
            .push(challenge_id.to_string());
        Ok(())
    }

    async fn decline_challenge(&self, challenge_id: &str, reason: &str) -> Result<()> {
        self.declined
            .write()
            .map_err(|_| Self::lock_error("declined"))?
            .push((challenge_id.to_string(), reason.to_string()));
        Ok(())
    }

    async fn online_bots(&self) -> Result<Vec<BotProfile>> {
        let bots = self.bots.read().map_err(|_| Self::lock_error("bots"))?;
        Ok(bots.values().cloned().collect())
    }

    async fn public_profile(&self, username: &str) -> Result<BotProfile> {
        let bots = self.bots.read().map_err(|_| Self::lock_error("bots"))?;
        bots.get(username).cloned().ok_or_else(|| {
            SchedulerError::OpponentNotFound {
                username: username.to_string(),
            }
            .into()
        })
    }

    async fn own_profile(&self) -> Result<UserProfile> {
        let profile = self
            .profile
            .read()
            .map_err(|_| Self::lock_error("profile"))?;
        Ok(profile.clone())
    }
}
