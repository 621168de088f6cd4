//! Challenge scheduling and lifecycle
//!
//! The scheduler decides when to send an outgoing challenge. Every cooldown
//! is a passive [`Timer`] checked inside [`MatchmakingScheduler::tick`];
//! nothing fires in the background. The host calls `tick` from its event
//! loop and forwards challenge lifecycle events (accepted, declined, game
//! finished) as they arrive.

use crate::clock::{minutes, seconds, years, Clock, Timer};
use crate::config::{ChallengeFilter, MatchmakingConfig};
use crate::error::SchedulerError;
use crate::matchmaking::acceptance::{default_suppression, AcceptanceMemory, ANY_ASPECT};
use crate::matchmaking::selection::{OpponentSelector, SelectedMatch, SelectionRequest};
use crate::service::{ChallengeRequest, ChallengeResponse, GameService};
use crate::slots::SlotTracker;
use crate::types::{BotLane, ChallengeDeclined, ChallengeId, GameId, UserProfile};
use crate::utils::lock_unpoisoned;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Challenges expire server-side after 20 seconds
fn challenge_expiry() -> Duration {
    seconds(25)
}

/// Minimum spacing between outgoing challenges, to stay clear of API limits
fn min_wait() -> Duration {
    seconds(60)
}

/// How often to re-fetch our own profile for rating-window recentering
fn profile_refresh_interval() -> Duration {
    minutes(5)
}

/// Decides when to create outgoing challenges and tracks their lifecycle
pub struct MatchmakingScheduler {
    service: Arc<dyn GameService>,
    selector: Arc<dyn OpponentSelector>,
    clock: Arc<dyn Clock>,
    config: MatchmakingConfig,
    slots: Arc<Mutex<SlotTracker>>,
    acceptance: Arc<Mutex<AcceptanceMemory>>,
    profile: UserProfile,

    /// Reset whenever a challenge is sent; expiry means the challenge went
    /// unanswered and should be cancelled
    challenge_created_timer: Timer,
    /// Post-game cooldown before the next challenge
    post_game_timer: Timer,
    profile_refresh_timer: Timer,
    /// Starts expired; rearmed from server rate-limit responses
    rate_limit_timer: Timer,
    /// Maximum spacing between challenges while games are active
    max_wait: Duration,

    /// At most one outgoing challenge is outstanding at a time
    outstanding_challenge: Option<ChallengeId>,
    /// One-shot request to replace a finished correspondence game right away
    force_immediate_challenge: bool,
}

impl MatchmakingScheduler {
    pub fn new(
        service: Arc<dyn GameService>,
        selector: Arc<dyn OpponentSelector>,
        clock: Arc<dyn Clock>,
        config: MatchmakingConfig,
        slots: Arc<Mutex<SlotTracker>>,
        acceptance: Arc<Mutex<AcceptanceMemory>>,
        profile: UserProfile,
    ) -> Self {
        {
            let mut memory = lock_unpoisoned(&acceptance);
            for username in &config.block_list {
                memory.block(username, clock.as_ref());
            }
        }
        let max_wait = if config.allow_during_games {
            minutes(10)
        } else {
            years(10)
        };
        Self {
            challenge_created_timer: Timer::new(challenge_expiry(), clock.as_ref()),
            post_game_timer: Timer::new(config.challenge_timeout(), clock.as_ref()),
            profile_refresh_timer: Timer::new(profile_refresh_interval(), clock.as_ref()),
            rate_limit_timer: Timer::expired(clock.as_ref()),
            max_wait,
            outstanding_challenge: None,
            force_immediate_challenge: false,
            service,
            selector,
            clock,
            config,
            slots,
            acceptance,
            profile,
        }
    }

    /// The challenge we sent and have not yet seen accepted or declined
    pub fn outstanding_challenge(&self) -> Option<&str> {
        self.outstanding_challenge.as_deref()
    }

    /// One scheduling pass. Incoming challenges waiting in the queue always
    /// win over outgoing matchmaking; background correspondence replenishment
    /// runs before the regular real-time path.
    pub async fn tick(&mut self, active_games: &HashSet<GameId>, incoming_queue_len: usize) {
        if incoming_queue_len > 0 {
            return;
        }

        if self.replenish_background_correspondence(active_games).await {
            return;
        }

        let (max_games, allowed_lanes, accounting) = {
            let slots = lock_unpoisoned(&self.slots);
            (
                slots.capacity(),
                slots.available_bot_lanes(active_games),
                slots.accounting_enabled(),
            )
        };

        let max_games_for_matchmaking = if self.config.allow_during_games {
            max_games
        } else {
            max_games.min(1)
        };
        let game_count = active_games.len();
        if game_count >= max_games_for_matchmaking {
            return;
        }

        if allowed_lanes.is_empty() {
            return;
        }

        // With per-lane accounting an empty bot lane is filled quickly;
        // otherwise active games hold matchmaking back for the long cooldown.
        let cooldown_while_games_active = if accounting { min_wait() } else { self.max_wait };
        if game_count > 0
            && self.challenge_created_timer.elapsed(self.clock.as_ref())
                < cooldown_while_games_active
        {
            return;
        }

        if !self.should_create_challenge(false, false).await {
            return;
        }

        self.create_matchmaking_challenge(active_games, Some(allowed_lanes), false)
            .await;
    }

    /// Keep the configured number of background correspondence games running.
    /// Returns true when a correspondence challenge was sent this pass.
    async fn replenish_background_correspondence(
        &mut self,
        active_games: &HashSet<GameId>,
    ) -> bool {
        let current = {
            let slots = lock_unpoisoned(&self.slots);
            if !slots.accounting_enabled() {
                return false;
            }
            slots.correspondence_reservation_count()
        };
        if self
            .config
            .max_background_correspondence_games
            .is_met(current)
        {
            return false;
        }

        let ignore_min_wait = std::mem::take(&mut self.force_immediate_challenge);
        if !self.should_create_challenge(true, ignore_min_wait).await {
            return false;
        }
        self.create_matchmaking_challenge(active_games, None, true)
            .await
    }

    /// Whether the timers allow creating a challenge now. An expired
    /// outstanding challenge is cancelled here and its lane freed, which
    /// itself opens the way for the next challenge.
    async fn should_create_challenge(
        &mut self,
        ignore_postgame_timeout: bool,
        ignore_min_wait: bool,
    ) -> bool {
        let clock = self.clock.as_ref();
        let matchmaking_enabled = self.config.allow_matchmaking;
        let postgame_ok = ignore_postgame_timeout || self.post_game_timer.is_expired(clock);
        let time_has_passed = postgame_ok && self.rate_limit_timer.is_expired(clock);
        let challenge_expired =
            self.challenge_created_timer.is_expired(clock) && self.outstanding_challenge.is_some();
        let min_wait_time_passed =
            ignore_min_wait || self.challenge_created_timer.elapsed(clock) > min_wait();

        if challenge_expired {
            if let Some(challenge_id) = self.outstanding_challenge.take() {
                match self.service.cancel_challenge(&challenge_id).await {
                    Ok(()) => info!("Challenge id {challenge_id} cancelled."),
                    Err(error) => {
                        warn!("Could not cancel challenge {challenge_id}: {error:#}");
                    }
                }
                lock_unpoisoned(&self.slots).release(&challenge_id);
                self.show_earliest_challenge_time();
            }
        }

        matchmaking_enabled && (time_has_passed || challenge_expired) && min_wait_time_passed
    }

    /// Pick an opponent and send one challenge. Returns true when a challenge
    /// was actually created.
    async fn create_matchmaking_challenge(
        &mut self,
        active_games: &HashSet<GameId>,
        allowed_lanes: Option<HashSet<BotLane>>,
        correspondence_only: bool,
    ) -> bool {
        info!("Challenging a random bot");
        self.refresh_profile().await;

        let request = SelectionRequest {
            allowed_lanes,
            correspondence_only,
            profile: self.profile.clone(),
        };
        let Some(selected) = self.selector.choose(&request).await else {
            return false;
        };

        // Lanes may have filled while selection was talking to the server
        let challenge_speed = selected.control.speed();
        if !lock_unpoisoned(&self.slots).can_accept_bot_speed(challenge_speed, active_games) {
            return false;
        }

        info!(
            "Will challenge {} for a {} game.",
            selected.opponent, selected.variant
        );
        let challenge_id = self.send_challenge(&selected).await;
        info!(
            "Challenge id is {}.",
            challenge_id.as_deref().unwrap_or("None")
        );
        if let Some(challenge_id) = &challenge_id {
            lock_unpoisoned(&self.slots).reserve_outgoing_challenge(challenge_id, challenge_speed);
        }
        self.outstanding_challenge = challenge_id.clone();
        challenge_id.is_some()
    }

    async fn send_challenge(&mut self, selected: &SelectedMatch) -> Option<ChallengeId> {
        let request =
            match ChallengeRequest::from_terms(selected.control, &selected.variant, selected.mode) {
                Ok(request) => request,
                Err(error) => {
                    error!("{error:#}");
                    return None;
                }
            };

        self.challenge_created_timer.reset(self.clock.as_ref());
        match self.service.create_challenge(&selected.opponent, &request).await {
            Ok(response) => match response.id.as_deref() {
                Some(id) if !id.is_empty() => Some(id.to_string()),
                _ => {
                    self.handle_challenge_error_response(&response, &selected.opponent);
                    None
                }
            },
            Err(error) => {
                match error
                    .downcast_ref::<SchedulerError>()
                    .and_then(SchedulerError::retry_after)
                {
                    Some(retry_after) => {
                        warn!("{error:#}");
                        let timeout = Duration::from_std(retry_after).unwrap_or_else(|_| years(10));
                        self.rate_limit_timer.rearm(timeout, self.clock.as_ref());
                    }
                    None => debug!("{error:#}"),
                }
                warn!("Could not create challenge");
                self.show_earliest_challenge_time();
                None
            }
        }
    }

    /// React to a challenge response that carried no challenge id
    fn handle_challenge_error_response(&mut self, response: &ChallengeResponse, opponent: &str) {
        error!("Challenge to {opponent} failed: {response:?}");
        let clock = self.clock.as_ref();
        if response.bot_is_rate_limited {
            let timeout = response.rate_limit_timeout().unwrap_or_else(|| minutes(1));
            self.rate_limit_timer.rearm(timeout, clock);
        } else if response.opponent_is_rate_limited {
            let timeout = response.rate_limit_timeout().unwrap_or_else(default_suppression);
            lock_unpoisoned(&self.acceptance).suppress_for(opponent, ANY_ASPECT, timeout, clock);
        } else {
            lock_unpoisoned(&self.acceptance).suppress(opponent, ANY_ASPECT, clock);
        }
        self.show_earliest_challenge_time();
    }

    /// Re-fetch our own profile at most once per refresh interval. A failed
    /// fetch keeps the previous profile.
    async fn refresh_profile(&mut self) {
        if !self.profile_refresh_timer.is_expired(self.clock.as_ref()) {
            return;
        }
        self.profile_refresh_timer.reset(self.clock.as_ref());
        match self.service.own_profile().await {
            Ok(profile) => self.profile = profile,
            Err(error) => debug!("Profile refresh failed: {error:#}"),
        }
    }

    fn discard_challenge(&mut self, challenge_id: &str) {
        if self.outstanding_challenge.as_deref() == Some(challenge_id) {
            self.outstanding_challenge = None;
        }
    }

    /// Our outgoing challenge was accepted; the id carries over to the game
    pub fn accepted_challenge(&mut self, game_id: &str) {
        self.discard_challenge(game_id);
        lock_unpoisoned(&self.slots).confirm_game_start(game_id);
    }

    /// The opponent declined our challenge. With a challenge filter active,
    /// remember what they objected to and avoid repeating it for a day.
    pub fn declined_challenge(&mut self, declined: &ChallengeDeclined) {
        let challenge = &declined.challenge;
        info!(
            "{} declined {}: {}",
            challenge.opponent, challenge, declined.reason
        );
        self.discard_challenge(&challenge.id);
        if challenge.from_self {
            lock_unpoisoned(&self.slots).release(&challenge.id);
        }
        if !challenge.from_self || self.config.challenge_filter == ChallengeFilter::None {
            return;
        }

        let mode = if challenge.rated { "rated" } else { "casual" };
        let reason_key = declined.reason_key.to_lowercase();
        let aspect = match reason_key.as_str() {
            "generic" | "later" | "nobot" => ANY_ASPECT,
            "toofast" | "tooslow" | "timecontrol" => challenge.speed.as_str(),
            "rated" | "casual" => mode,
            "standard" | "variant" => challenge.variant.as_str(),
            other => {
                warn!("Unknown decline reason received: {other}");
                ANY_ASPECT
            }
        };
        let aspect = if self.config.challenge_filter == ChallengeFilter::Fine {
            aspect
        } else {
            ANY_ASPECT
        };

        lock_unpoisoned(&self.acceptance).suppress(&challenge.opponent, aspect, self.clock.as_ref());
        let described = if aspect.is_empty() {
            String::new()
        } else {
            format!(" {aspect}")
        };
        info!(
            "Will not challenge {} to another{described} game today.",
            challenge.opponent
        );
        self.show_earliest_challenge_time();
    }

    /// A game finished; start the post-game cooldown
    pub fn game_done(&mut self) {
        self.post_game_timer.reset(self.clock.as_ref());
        self.show_earliest_challenge_time();
    }

    /// A background correspondence game finished; replace it on the next tick
    /// without waiting out the challenge spacing
    pub fn correspondence_game_done(&mut self) {
        self.force_immediate_challenge = true;
    }

    /// The earliest instant the next challenge could be created, considering
    /// every active cooldown. `None` while matchmaking is disabled.
    pub fn earliest_challenge_time(&self) -> Option<DateTime<Utc>> {
        if !self.config.allow_matchmaking {
            return None;
        }
        let clock = self.clock.as_ref();
        let postgame = self.post_game_timer.remaining(clock);
        let spacing =
            (min_wait() - self.challenge_created_timer.elapsed(clock)).max(Duration::zero());
        let rate_limit = self.rate_limit_timer.remaining(clock);
        Some(clock.now() + postgame.max(spacing).max(rate_limit))
    }

    fn show_earliest_challenge_time(&self) {
        if let Some(earliest) = self.earliest_challenge_time() {
            info!("Next challenge will be created after {earliest}");
        }
    }
}
