//! Opponent selection and rating-preference weighting
//!
//! Given the lanes matchmaking may fill, selection picks an override config,
//! resolves "random" variant/mode sentinels, enumerates and filters the
//! configured time controls, narrows the online bots to a suitable candidate
//! pool, and draws one opponent by rating-weighted sampling. The scheduler
//! only sees the [`OpponentSelector`] trait, so tests can script choices.

use crate::blocklist::{BlocklistProvider, OnlineBlocklist, StaticBlocklistProvider};
use crate::clock::Clock;
use crate::config::{ChallengeFilter, MatchmakingConfig, RatingPreference};
use crate::error::Result;
use crate::matchmaking::acceptance::AcceptanceMemory;
use crate::matchmaking::category::{configured_time_controls, game_category};
use crate::service::GameService;
use crate::types::{BotLane, BotProfile, GameMode, TimeControl, UserProfile};
use crate::utils::lock_unpoisoned;
use async_trait::async_trait;
use rand::prelude::IndexedRandom;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// What the scheduler asks selection for
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    /// Restrict real-time controls to these lanes; `None` means unrestricted
    pub allowed_lanes: Option<HashSet<BotLane>>,
    /// Pick only correspondence controls (otherwise only real-time)
    pub correspondence_only: bool,
    /// Our current profile, for rating-window recentering
    pub profile: UserProfile,
}

/// A chosen opponent and the terms to offer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedMatch {
    pub opponent: String,
    pub control: TimeControl,
    pub variant: String,
    pub mode: GameMode,
}

/// Seam between the scheduler and opponent discovery
#[async_trait]
pub trait OpponentSelector: Send + Sync {
    /// Pick an opponent and terms, or nothing when no candidate fits.
    /// Failures are swallowed and logged; selection never errors out.
    async fn choose(&self, request: &SelectionRequest) -> Option<SelectedMatch>;
}

/// Terms resolved before the candidate search
struct ResolvedTerms {
    effective: MatchmakingConfig,
    variant: String,
    mode: GameMode,
    control: TimeControl,
    category: String,
}

/// Production selector backed by the game service
pub struct LiveOpponentSelector {
    service: Arc<dyn GameService>,
    clock: Arc<dyn Clock>,
    config: MatchmakingConfig,
    /// Variant pool for the "random" sentinel, fromPosition excluded
    variants: Vec<String>,
    acceptance: Arc<Mutex<AcceptanceMemory>>,
    online_blocklist: OnlineBlocklist,
}

impl LiveOpponentSelector {
    pub fn new(
        service: Arc<dyn GameService>,
        clock: Arc<dyn Clock>,
        config: MatchmakingConfig,
        acceptance: Arc<Mutex<AcceptanceMemory>>,
    ) -> Self {
        let provider = StaticBlocklistProvider::new(config.online_block_list.clone());
        Self::with_blocklist_provider(service, clock, config, acceptance, Box::new(provider))
    }

    /// Use a custom source for the dynamically refreshed blocklist
    pub fn with_blocklist_provider(
        service: Arc<dyn GameService>,
        clock: Arc<dyn Clock>,
        config: MatchmakingConfig,
        acceptance: Arc<Mutex<AcceptanceMemory>>,
        provider: Box<dyn BlocklistProvider>,
    ) -> Self {
        let variants = config
            .variants
            .iter()
            .filter(|variant| variant.as_str() != "fromPosition")
            .cloned()
            .collect();
        Self {
            service,
            clock,
            config,
            variants,
            acceptance,
            online_blocklist: OnlineBlocklist::new(provider),
        }
    }

    /// Resolve override, variant, mode, and time control. Sync so the RNG
    /// never lives across an await point.
    fn resolve_terms(&self, request: &SelectionRequest) -> Option<ResolvedTerms> {
        let mut rng = rand::rng();

        let mut override_names: Vec<Option<&String>> = vec![None];
        override_names.extend(self.config.overrides.keys().map(Some));
        let override_choice = override_names.choose(&mut rng).copied().flatten();
        info!(
            "Using the {} matchmaking configuration.",
            override_choice.map_or("default", String::as_str)
        );
        let effective = match override_choice {
            Some(name) => self.config.apply_override(&self.config.overrides[name]),
            None => self.config.clone(),
        };

        let variant_pool: Vec<&str> = self.variants.iter().map(String::as_str).collect();
        let variant = resolve_random(&effective.challenge_variant, &variant_pool, &mut rng)?;
        let mode = resolve_random(&effective.challenge_mode, &["casual", "rated"], &mut rng)?
            .parse::<GameMode>()
            .ok()?;

        let mut controls = configured_time_controls(
            &effective,
            request.allowed_lanes.as_ref(),
            request.correspondence_only,
        );
        controls.retain(|control| control.is_correspondence() == request.correspondence_only);
        if controls.is_empty() {
            error!(
                "No valid time controls are available for matchmaking with the current settings."
            );
            return None;
        }
        let control = *controls.choose(&mut rng)?;

        let category = game_category(
            &variant,
            control.base_time as i64,
            control.increment as i64,
            control.days as i64,
        );

        Some(ResolvedTerms {
            effective,
            variant,
            mode,
            control,
            category,
        })
    }

    /// Rating window for this attempt, recentred around our own rating when a
    /// symmetric difference is configured and we have a rating in the category
    fn rating_window(&self, terms: &ResolvedTerms, profile: &UserProfile) -> (i64, i64) {
        let mut min_rating = terms.effective.opponent_min_rating;
        let mut max_rating = terms.effective.opponent_max_rating;
        if let Some(difference) = terms.effective.opponent_rating_difference {
            let own_rating = profile.rating(&terms.category);
            if own_rating > 0 {
                min_rating = own_rating - difference;
                max_rating = own_rating + difference;
            }
        }
        (min_rating, max_rating)
    }

    /// Narrow the online bots to suitable candidates, preferring those that
    /// have not recently declined this kind of challenge
    fn candidate_pool(
        &self,
        online_bots: Vec<BotProfile>,
        terms: &ResolvedTerms,
        own_username: &str,
        min_rating: i64,
        max_rating: i64,
    ) -> Vec<BotProfile> {
        let acceptance = lock_unpoisoned(&self.acceptance);
        let clock = self.clock.as_ref();

        let candidates: Vec<BotProfile> = online_bots
            .into_iter()
            .filter(|bot| {
                bot.username != own_username
                    && !acceptance.is_blocked(&bot.username, clock)
                    && !self.online_blocklist.contains(&bot.username)
                    && bot.games(&terms.category) > 0
                    && (min_rating..=max_rating).contains(&bot.rating(&terms.category))
            })
            .collect();

        if terms.effective.challenge_filter != ChallengeFilter::Fine {
            return candidates;
        }

        let aspects = [
            terms.variant.as_str(),
            terms.category.as_str(),
            terms.mode.as_str(),
        ];
        let preferred: Vec<BotProfile> = candidates
            .iter()
            .filter(|bot| {
                aspects
                    .iter()
                    .all(|aspect| acceptance.is_acceptable(&bot.username, aspect, clock))
            })
            .cloned()
            .collect();

        if preferred.is_empty() {
            candidates
        } else {
            preferred
        }
    }

    async fn try_choose(&self, request: &SelectionRequest) -> Result<Option<SelectedMatch>> {
        let Some(terms) = self.resolve_terms(request) else {
            return Ok(None);
        };
        let (min_rating, max_rating) = self.rating_window(&terms, &request.profile);
        info!(
            "Seeking {} game with opponent rating in [{min_rating}, {max_rating}] ...",
            terms.category
        );

        self.online_blocklist.refresh(self.clock.as_ref()).await;
        let online_bots = self.service.online_bots().await?;

        let pool = self.candidate_pool(
            online_bots,
            &terms,
            &request.profile.username,
            min_rating,
            max_rating,
        );
        if pool.is_empty() {
            error!("No suitable bots found to challenge.");
            return Ok(None);
        }

        let chosen = {
            let mut rng = rand::rng();
            let preference = terms.effective.rating_preference;
            let weighted = pool.choose_weighted(&mut rng, |bot| {
                rating_weight(bot, preference, min_rating, max_rating, &terms.category)
            });
            match weighted {
                Ok(bot) => bot.clone(),
                // Every clamped weight was zero: fall back to a uniform draw
                Err(_) => match pool.choose(&mut rng) {
                    Some(bot) => bot.clone(),
                    None => return Ok(None),
                },
            }
        };

        let profile = self.service.public_profile(&chosen.username).await?;
        if profile.blocking {
            warn!(
                "{} blocks us; adding them to the block list.",
                chosen.username
            );
            lock_unpoisoned(&self.acceptance).block(&chosen.username, self.clock.as_ref());
            return Ok(None);
        }

        debug!(
            "Selected {} for a {} {} {} game.",
            chosen.username, terms.mode, terms.control, terms.variant
        );
        Ok(Some(SelectedMatch {
            opponent: chosen.username,
            control: terms.control,
            variant: terms.variant,
            mode: terms.mode,
        }))
    }
}

#[async_trait]
impl OpponentSelector for LiveOpponentSelector {
    async fn choose(&self, request: &SelectionRequest) -> Option<SelectedMatch> {
        match self.try_choose(request).await {
            Ok(selected) => selected,
            Err(error) => {
                error!("Opponent selection failed: {error:#}");
                None
            }
        }
    }
}

/// Resolve a config value that may be the "random" sentinel
fn resolve_random(value: &str, choices: &[&str], rng: &mut impl rand::Rng) -> Option<String> {
    if value != "random" {
        return Some(value.to_string());
    }
    choices.choose(rng).map(|choice| choice.to_string())
}

/// Weight for one candidate. With preference "high" an opponent at the top of
/// the window is about twice as likely as one at the bottom; "low" mirrors
/// that. Weights are clamped to be non-negative.
pub fn rating_weight(
    bot: &BotProfile,
    preference: RatingPreference,
    min_rating: i64,
    max_rating: i64,
    category: &str,
) -> u64 {
    let rating = bot.rating(category);
    let weight = match preference {
        RatingPreference::High => {
            let reduce_by = (min_rating - (max_rating - min_rating)).min(min_rating - 1);
            rating - reduce_by
        }
        RatingPreference::Low => {
            let reduce_by = (max_rating - (min_rating - max_rating)).max(max_rating + 1);
            reduce_by - rating
        }
        RatingPreference::None => 1,
    };
    weight.max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::service::{game::test_bot, MockGameService};
    use crate::types::Perf;
    use proptest::prelude::*;

    fn own_profile() -> UserProfile {
        UserProfile {
            username: "us".to_string(),
            perfs: [(
                "blitz".to_string(),
                Perf {
                    rating: 1700,
                    games: 40,
                },
            )]
            .into(),
        }
    }

    fn selector_with(
        service: Arc<MockGameService>,
        config: MatchmakingConfig,
    ) -> (LiveOpponentSelector, Arc<Mutex<AcceptanceMemory>>) {
        let acceptance = Arc::new(Mutex::new(AcceptanceMemory::new()));
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let selector =
            LiveOpponentSelector::new(service, clock, config, acceptance.clone());
        (selector, acceptance)
    }

    fn blitz_config() -> MatchmakingConfig {
        MatchmakingConfig {
            allow_matchmaking: true,
            challenge_initial_time: vec![180],
            challenge_increment: vec![2],
            challenge_days: vec![],
            challenge_variant: "standard".to_string(),
            challenge_mode: "rated".to_string(),
            ..Default::default()
        }
    }

    fn request() -> SelectionRequest {
        SelectionRequest {
            allowed_lanes: None,
            correspondence_only: false,
            profile: own_profile(),
        }
    }

    #[test]
    fn test_rating_weight_high_doubles_top_of_window() {
        let low = test_bot("low", 1000);
        let high = test_bot("high", 2000);
        let weight_low = rating_weight(&low, RatingPreference::High, 1000, 2000, "blitz");
        let weight_high = rating_weight(&high, RatingPreference::High, 1000, 2000, "blitz");
        assert_eq!(weight_high, 2 * weight_low);
    }

    #[test]
    fn test_rating_weight_low_mirrors_high() {
        let low = test_bot("low", 1000);
        let high = test_bot("high", 2000);
        let weight_low = rating_weight(&low, RatingPreference::Low, 1000, 2000, "blitz");
        let weight_high = rating_weight(&high, RatingPreference::Low, 1000, 2000, "blitz");
        assert_eq!(weight_low, 2 * weight_high);
    }

    #[test]
    fn test_rating_weight_uniform_without_preference() {
        let bot = test_bot("any", 1500);
        assert_eq!(
            rating_weight(&bot, RatingPreference::None, 1000, 2000, "blitz"),
            1
        );
    }

    #[tokio::test]
    async fn test_choose_picks_candidate_in_window() {
        let service = Arc::new(MockGameService::new(own_profile()));
        service.add_online_bot(test_bot("inwindow", 1600));
        service.add_online_bot(test_bot("toostrong", 3500));
        let mut config = blitz_config();
        config.opponent_min_rating = 1000;
        config.opponent_max_rating = 2000;

        let (selector, _) = selector_with(service, config);
        let selected = selector.choose(&request()).await.unwrap();

        assert_eq!(selected.opponent, "inwindow");
        assert_eq!(selected.control, TimeControl::real_time(180, 2));
        assert_eq!(selected.variant, "standard");
        assert_eq!(selected.mode, GameMode::Rated);
    }

    #[tokio::test]
    async fn test_choose_recentres_window_on_rating_difference() {
        let service = Arc::new(MockGameService::new(own_profile()));
        // Our blitz rating is 1700; only the close bot fits a 200 window
        service.add_online_bot(test_bot("close", 1800));
        service.add_online_bot(test_bot("far", 1400));
        let mut config = blitz_config();
        config.opponent_rating_difference = Some(200);

        let (selector, _) = selector_with(service, config);
        let selected = selector.choose(&request()).await.unwrap();
        assert_eq!(selected.opponent, "close");
    }

    #[tokio::test]
    async fn test_choose_skips_blocked_and_self() {
        let service = Arc::new(MockGameService::new(own_profile()));
        service.add_online_bot(test_bot("us", 1700));
        service.add_online_bot(test_bot("blockedbot", 1700));
        service.add_online_bot(test_bot("cleanbot", 1700));

        let (selector, acceptance) = selector_with(service, blitz_config());
        {
            let clock = ManualClock::starting_now();
            lock_unpoisoned(&acceptance).block("blockedbot", &clock);
        }

        let selected = selector.choose(&request()).await.unwrap();
        assert_eq!(selected.opponent, "cleanbot");
    }

    #[tokio::test]
    async fn test_choose_returns_none_when_pool_empty() {
        let service = Arc::new(MockGameService::new(own_profile()));
        let (selector, _) = selector_with(service, blitz_config());
        assert!(selector.choose(&request()).await.is_none());
    }

    #[tokio::test]
    async fn test_choose_returns_none_without_time_controls() {
        let service = Arc::new(MockGameService::new(own_profile()));
        service.add_online_bot(test_bot("somebot", 1700));
        let mut config = blitz_config();
        config.challenge_initial_time = vec![];
        config.challenge_increment = vec![];
        config.challenge_days = vec![];

        let (selector, _) = selector_with(service, config);
        assert!(selector.choose(&request()).await.is_none());
    }

    #[tokio::test]
    async fn test_correspondence_only_restricts_to_day_controls() {
        let service = Arc::new(MockGameService::new(own_profile()));
        service.add_online_bot(test_bot("corrbot", 1500));
        let mut config = blitz_config();
        config.challenge_days = vec![2];

        let (selector, _) = selector_with(service, config);
        let selected = selector
            .choose(&SelectionRequest {
                allowed_lanes: None,
                correspondence_only: true,
                profile: own_profile(),
            })
            .await
            .unwrap();
        assert_eq!(selected.control, TimeControl::correspondence(2));
    }

    #[tokio::test]
    async fn test_blocking_opponent_is_blocklisted_and_skipped() {
        let service = Arc::new(MockGameService::new(own_profile()));
        let mut blocker = test_bot("blocker", 1700);
        blocker.blocking = true;
        service.add_online_bot(blocker);

        let (selector, acceptance) = selector_with(service, blitz_config());
        assert!(selector.choose(&request()).await.is_none());

        let clock = ManualClock::starting_now();
        assert!(lock_unpoisoned(&acceptance).is_blocked("blocker", &clock));
    }

    #[tokio::test]
    async fn test_lane_restriction_filters_controls() {
        let service = Arc::new(MockGameService::new(own_profile()));
        service.add_online_bot(test_bot("somebot", 1500));
        let mut config = blitz_config();
        config.challenge_initial_time = vec![60, 600];
        config.challenge_increment = vec![0];

        let (selector, _) = selector_with(service, config);
        let selected = selector
            .choose(&SelectionRequest {
                allowed_lanes: Some(HashSet::from([BotLane::Short])),
                correspondence_only: false,
                profile: own_profile(),
            })
            .await
            .unwrap();
        assert_eq!(selected.control, TimeControl::real_time(60, 0));
    }

    proptest! {
        #[test]
        fn prop_high_preference_weight_is_monotone_in_rating(
            lower in 0i64..4000,
            delta in 0i64..500,
            min in 0i64..2000,
            span in 1i64..2000,
        ) {
            let max = min + span;
            let weaker = test_bot("weaker", lower);
            let stronger = test_bot("stronger", lower + delta);
            let weight_weaker = rating_weight(&weaker, RatingPreference::High, min, max, "blitz");
            let weight_stronger =
                rating_weight(&stronger, RatingPreference::High, min, max, "blitz");
            prop_assert!(weight_stronger >= weight_weaker);
        }

        #[test]
        fn prop_low_preference_mirrors_high(
            rating in 0i64..4000,
            min in 0i64..2000,
            span in 1i64..2000,
        ) {
            let max = min + span;
            let bot = test_bot("b", rating);
            let mirrored = test_bot("m", min + max - rating);
            prop_assert_eq!(
                rating_weight(&bot, RatingPreference::Low, min, max, "blitz"),
                rating_weight(&mirrored, RatingPreference::High, min, max, "blitz"),
            );
        }
    }
}
