//! Slot-aware acceptance of incoming challenges
//!
//! Incoming challenges wait in a queue owned by the host event loop. Each
//! pass accepts every queued challenge the slot policy allows, humans before
//! bots, and leaves the rest queued for a later pass when a lane frees up.

use crate::service::GameService;
use crate::slots::SlotTracker;
use crate::types::{Challenge, ChallengeId, GameId};
use crate::utils::lock_unpoisoned;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tracing::{info, warn};

/// Accept every queued challenge that fits the slot policy. Human challenges
/// are considered first; within each group queue order is kept. Returns the
/// ids accepted this pass.
pub async fn accept_challenges(
    service: &dyn GameService,
    challenge_queue: &mut VecDeque<Challenge>,
    active_games: &HashSet<GameId>,
    slots: &Mutex<SlotTracker>,
) -> Vec<ChallengeId> {
    let (humans, bots): (Vec<Challenge>, Vec<Challenge>) = challenge_queue
        .drain(..)
        .partition(|challenge| !challenge.challenger_is_bot);

    let mut accepted = Vec::new();
    let mut remaining = VecDeque::new();
    for challenge in humans.into_iter().chain(bots) {
        let fits = lock_unpoisoned(slots).can_accept_challenge(&challenge, active_games);
        if !fits {
            remaining.push_back(challenge);
            continue;
        }
        match service.accept_challenge(&challenge.id).await {
            Ok(()) => {
                info!("Accepted {challenge}");
                lock_unpoisoned(slots).reserve_game(
                    &challenge.id,
                    challenge.challenger_is_bot,
                    challenge.speed,
                );
                accepted.push(challenge.id);
            }
            // The challenge is gone (withdrawn or expired); drop it
            Err(error) => warn!("Could not accept {challenge}: {error:#}"),
        }
    }

    *challenge_queue = remaining;
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MockGameService;
    use crate::types::{Speed, UserProfile};

    fn challenge(id: &str, is_bot: bool, speed: Speed) -> Challenge {
        Challenge {
            id: id.to_string(),
            opponent: "them".to_string(),
            from_self: false,
            challenger_is_bot: is_bot,
            speed,
            variant: "standard".to_string(),
            rated: true,
        }
    }

    #[tokio::test]
    async fn test_humans_accepted_before_bots() {
        let service = MockGameService::new(UserProfile::default());
        let mut queue = VecDeque::from([
            challenge("bot_long", true, Speed::Rapid),
            challenge("human", false, Speed::Blitz),
            challenge("bot_short", true, Speed::Blitz),
        ]);
        let slots = Mutex::new(SlotTracker::new(3));

        let accepted = accept_challenges(&service, &mut queue, &HashSet::new(), &slots).await;

        assert_eq!(accepted[0], "human");
        assert_eq!(service.accepted_challenges()[0], "human");
    }

    #[tokio::test]
    async fn test_one_short_and_one_long_bot_lane() {
        let service = MockGameService::new(UserProfile::default());
        let mut queue = VecDeque::from([
            challenge("bot_long_one", true, Speed::Rapid),
            challenge("bot_long_two", true, Speed::Classical),
            challenge("bot_short", true, Speed::Bullet),
        ]);
        let slots = Mutex::new(SlotTracker::new(3));

        let accepted = accept_challenges(&service, &mut queue, &HashSet::new(), &slots).await;

        assert_eq!(accepted, vec!["bot_long_one", "bot_short"]);
        let queued: Vec<&str> = queue.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(queued, vec!["bot_long_two"]);
    }

    #[tokio::test]
    async fn test_correspondence_rides_alongside_full_lanes() {
        let service = MockGameService::new(UserProfile::default());
        let mut queue = VecDeque::from([
            challenge("bot_short", true, Speed::Blitz),
            challenge("bot_long", true, Speed::Rapid),
            challenge("corr", true, Speed::Correspondence),
        ]);
        let slots = Mutex::new(SlotTracker::new(3));

        let accepted = accept_challenges(&service, &mut queue, &HashSet::new(), &slots).await;

        assert_eq!(accepted, vec!["bot_short", "bot_long", "corr"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_without_accounting_only_free_capacity_counts() {
        let service = MockGameService::new(UserProfile::default());
        let mut queue = VecDeque::from([
            challenge("first", true, Speed::Blitz),
            challenge("second", true, Speed::Blitz),
        ]);
        let slots = Mutex::new(SlotTracker::new(2));
        let active = HashSet::from(["running".to_string()]);

        let accepted = accept_challenges(&service, &mut queue, &active, &slots).await;

        // One slot was taken by the running game; one challenge fits
        assert_eq!(accepted, vec!["first"]);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_left_queued_challenge_accepted_after_release() {
        let service = MockGameService::new(UserProfile::default());
        let mut queue = VecDeque::from([
            challenge("one", true, Speed::Blitz),
            challenge("two", true, Speed::Bullet),
        ]);
        let slots = Mutex::new(SlotTracker::new(3));

        let accepted = accept_challenges(&service, &mut queue, &HashSet::new(), &slots).await;
        assert_eq!(accepted, vec!["one"]);

        lock_unpoisoned(&slots).release("one");
        let accepted = accept_challenges(&service, &mut queue, &HashSet::new(), &slots).await;
        assert_eq!(accepted, vec!["two"]);
        assert!(queue.is_empty());
    }
}
