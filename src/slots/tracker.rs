//! Lane reservation tracking for games and outgoing challenges
//!
//! The tracker owns the mapping from game/challenge ids to lanes and answers
//! every capacity question the scheduler and the acceptance path ask. Strict
//! per-lane accounting only applies at a capacity of exactly three: one slot
//! for a human opponent, one short-clock and one long-clock bot game, with a
//! correspondence game riding alongside. Any other capacity collapses to a
//! single undifferentiated pool gated by the active-game count.

use crate::types::{BotLane, Challenge, GameId, Lane, Speed};
use std::collections::{HashMap, HashSet};

/// The only capacity at which per-lane accounting is active
const ACCOUNTING_CAPACITY: usize = 3;

/// Tracks which games and outgoing challenges hold which lane
#[derive(Debug, Clone)]
pub struct SlotTracker {
    capacity: usize,
    enabled: bool,
    reservations: HashMap<GameId, Lane>,
    pending_outgoing: HashSet<GameId>,
    pending_outgoing_correspondence: HashSet<GameId>,
}

impl SlotTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            enabled: capacity == ACCOUNTING_CAPACITY,
            reservations: HashMap::new(),
            pending_outgoing: HashSet::new(),
            pending_outgoing_correspondence: HashSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether strict per-lane accounting is active
    pub fn accounting_enabled(&self) -> bool {
        self.enabled
    }

    fn lane_for(&self, is_bot_game: bool, speed: Speed) -> Lane {
        if speed.is_correspondence() {
            return Lane::Correspondence;
        }
        if !self.enabled {
            return Lane::Any;
        }
        if !is_bot_game {
            return Lane::Human;
        }
        match speed.bot_lane() {
            BotLane::Short => Lane::BotShort,
            BotLane::Long => Lane::BotLong,
        }
    }

    /// Reserve a lane for a game or accepted challenge
    pub fn reserve_game(&mut self, game_id: &str, is_bot_game: bool, speed: Speed) {
        if !self.enabled {
            return;
        }
        let lane = self.lane_for(is_bot_game, speed);
        self.reservations.insert(game_id.to_string(), lane);
        self.pending_outgoing.remove(game_id);
        self.pending_outgoing_correspondence.remove(game_id);
    }

    /// Reserve a lane for an outgoing challenge until it is accepted,
    /// declined, or cancelled
    pub fn reserve_outgoing_challenge(&mut self, challenge_id: &str, speed: Speed) {
        if !self.enabled {
            return;
        }
        let lane = self.lane_for(true, speed);
        self.reservations.insert(challenge_id.to_string(), lane);
        if speed.is_correspondence() {
            self.pending_outgoing_correspondence
                .insert(challenge_id.to_string());
        } else {
            self.pending_outgoing.insert(challenge_id.to_string());
        }
    }

    /// Convert a pending outgoing challenge reservation into an active game
    /// reservation; the lane stays the same
    pub fn confirm_game_start(&mut self, game_id: &str) {
        if !self.enabled {
            return;
        }
        self.pending_outgoing.remove(game_id);
        self.pending_outgoing_correspondence.remove(game_id);
    }

    /// Free a lane when a game ends or a challenge does not lead to a game.
    /// Releasing an unknown id is a no-op.
    pub fn release(&mut self, game_or_challenge_id: &str) {
        if !self.enabled {
            return;
        }
        self.pending_outgoing.remove(game_or_challenge_id);
        self.pending_outgoing_correspondence
            .remove(game_or_challenge_id);
        self.reservations.remove(game_or_challenge_id);
    }

    pub fn has_reservation(&self, game_id: &str) -> bool {
        self.enabled && self.reservations.contains_key(game_id)
    }

    /// Whether a tracked id belongs to the correspondence lane
    pub fn is_correspondence(&self, game_or_challenge_id: &str) -> bool {
        self.enabled
            && self.reservations.get(game_or_challenge_id) == Some(&Lane::Correspondence)
    }

    /// Count used slots, including outgoing real-time challenges that are
    /// still pending. A challenge whose id already appears among the active
    /// games is never counted twice.
    pub fn used_slots(&self, active_games: &HashSet<GameId>) -> usize {
        if !self.enabled {
            return active_games.len();
        }
        let pending = self
            .pending_outgoing
            .iter()
            .filter(|challenge_id| !active_games.contains(*challenge_id))
            .count();
        active_games.len() + pending
    }

    pub fn has_correspondence_reservation(&self) -> bool {
        self.enabled
            && self
                .reservations
                .values()
                .any(|lane| *lane == Lane::Correspondence)
    }

    /// Whether matchmaking should look for a correspondence game
    pub fn needs_correspondence_game(&self) -> bool {
        self.enabled && !self.has_correspondence_reservation()
    }

    pub fn correspondence_reservation_count(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        self.reservations
            .values()
            .filter(|lane| **lane == Lane::Correspondence)
            .count()
    }

    fn bot_lane_counts(&self) -> (usize, usize) {
        if !self.enabled {
            return (0, 0);
        }
        let short = self
            .reservations
            .values()
            .filter(|lane| **lane == Lane::BotShort)
            .count();
        let long = self
            .reservations
            .values()
            .filter(|lane| **lane == Lane::BotLong)
            .count();
        (short, long)
    }

    /// Whether a human challenge can be accepted now
    pub fn can_accept_human(&self, active_games: &HashSet<GameId>) -> bool {
        self.used_slots(active_games) < self.capacity
    }

    /// Whether a correspondence challenge can be accepted now. In accounting
    /// mode correspondence rides alongside the real-time slots; its own cap is
    /// the background target, enforced by the scheduler.
    pub fn can_accept_correspondence(&self, active_games: &HashSet<GameId>) -> bool {
        if !self.enabled {
            return self.used_slots(active_games) < self.capacity;
        }
        true
    }

    /// Whether a bot challenge with this speed can be accepted now
    pub fn can_accept_bot_speed(&self, speed: Speed, active_games: &HashSet<GameId>) -> bool {
        if speed.is_correspondence() {
            return self.can_accept_correspondence(active_games);
        }
        if self.used_slots(active_games) >= self.capacity {
            return false;
        }
        if !self.enabled {
            return true;
        }
        let (short, long) = self.bot_lane_counts();
        if short + long >= 2 {
            return false;
        }
        match speed.bot_lane() {
            BotLane::Short => short == 0,
            BotLane::Long => long == 0,
        }
    }

    /// Whether an incoming challenge fits the slot policy
    pub fn can_accept_challenge(
        &self,
        challenge: &Challenge,
        active_games: &HashSet<GameId>,
    ) -> bool {
        if challenge.speed.is_correspondence() {
            return self.can_accept_correspondence(active_games);
        }
        if challenge.challenger_is_bot {
            return self.can_accept_bot_speed(challenge.speed, active_games);
        }
        self.can_accept_human(active_games)
    }

    /// The bot lanes currently available for outgoing matchmaking
    pub fn available_bot_lanes(&self, active_games: &HashSet<GameId>) -> HashSet<BotLane> {
        if self.used_slots(active_games) >= self.capacity {
            return HashSet::new();
        }
        if !self.enabled {
            return HashSet::from([BotLane::Short, BotLane::Long]);
        }
        let (short, long) = self.bot_lane_counts();
        if short + long >= 2 {
            return HashSet::new();
        }
        let mut available = HashSet::new();
        if short == 0 {
            available.insert(BotLane::Short);
        }
        if long == 0 {
            available.insert(BotLane::Long);
        }
        available
    }

    /// Whether a correspondence move may use compute right now. In accounting
    /// mode correspondence borrows a free bot lane's turn so it never starves
    /// real-time processing.
    pub fn can_start_correspondence_move(&self, active_games: &HashSet<GameId>) -> bool {
        if self.used_slots(active_games) >= self.capacity {
            return false;
        }
        if !self.enabled {
            return true;
        }
        !self.available_bot_lanes(active_games).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> HashSet<GameId> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_accounting_only_at_capacity_three() {
        for capacity in [0, 1, 2, 4, 5, 8] {
            let tracker = SlotTracker::new(capacity);
            assert!(
                !tracker.accounting_enabled(),
                "capacity {capacity} must not enable accounting"
            );
        }
        assert!(SlotTracker::new(3).accounting_enabled());
    }

    #[test]
    fn test_disabled_tracker_counts_active_games_only() {
        let mut tracker = SlotTracker::new(2);
        tracker.reserve_outgoing_challenge("pending", Speed::Blitz);

        // No reservation is stored when accounting is disabled
        assert!(!tracker.has_reservation("pending"));
        assert_eq!(tracker.used_slots(&ids(&["g1"])), 1);
        assert!(tracker.can_accept_human(&ids(&["g1"])));
        assert!(!tracker.can_accept_human(&ids(&["g1", "g2"])));
        assert!(tracker.can_accept_bot_speed(Speed::Bullet, &ids(&["g1"])));
        assert_eq!(
            tracker.available_bot_lanes(&ids(&["g1"])),
            HashSet::from([BotLane::Short, BotLane::Long])
        );
        assert!(tracker.available_bot_lanes(&ids(&["g1", "g2"])).is_empty());
    }

    #[test]
    fn test_two_bot_lanes_enforced() {
        let mut tracker = SlotTracker::new(3);
        let no_games = HashSet::new();

        assert_eq!(
            tracker.available_bot_lanes(&no_games),
            HashSet::from([BotLane::Short, BotLane::Long])
        );

        tracker.reserve_outgoing_challenge("short_pending", Speed::Blitz);
        assert!(!tracker.can_accept_bot_speed(Speed::Blitz, &no_games));
        assert!(tracker.can_accept_bot_speed(Speed::Rapid, &no_games));
        assert_eq!(
            tracker.available_bot_lanes(&no_games),
            HashSet::from([BotLane::Long])
        );

        tracker.reserve_outgoing_challenge("long_pending", Speed::Rapid);
        assert!(!tracker.can_accept_bot_speed(Speed::Rapid, &no_games));
        assert!(tracker.available_bot_lanes(&no_games).is_empty());

        // Correspondence still rides alongside
        assert!(tracker.can_accept_bot_speed(Speed::Correspondence, &no_games));
        assert!(tracker.can_accept_human(&no_games));

        let one_human = ids(&["human_game"]);
        assert!(!tracker.can_accept_human(&one_human));
    }

    #[test]
    fn test_release_reopens_lane_and_is_idempotent() {
        let mut tracker = SlotTracker::new(3);
        let no_games = HashSet::new();

        tracker.reserve_outgoing_challenge("short_pending", Speed::Bullet);
        assert!(!tracker.can_accept_bot_speed(Speed::Bullet, &no_games));

        tracker.release("short_pending");
        assert!(tracker.can_accept_bot_speed(Speed::Bullet, &no_games));
        assert!(!tracker.has_reservation("short_pending"));

        // Releasing again, or releasing an unknown id, is a no-op
        tracker.release("short_pending");
        tracker.release("never_seen");
    }

    #[test]
    fn test_used_slots_never_double_counts() {
        let mut tracker = SlotTracker::new(3);
        tracker.reserve_outgoing_challenge("ch1", Speed::Blitz);

        // Pending and not yet active: counts once
        assert_eq!(tracker.used_slots(&ids(&["g1"])), 2);

        // Same id shows up as an active game before confirmation: still once
        assert_eq!(tracker.used_slots(&ids(&["g1", "ch1"])), 2);

        tracker.confirm_game_start("ch1");
        assert_eq!(tracker.used_slots(&ids(&["g1", "ch1"])), 2);
    }

    #[test]
    fn test_pending_correspondence_does_not_use_realtime_capacity() {
        let mut tracker = SlotTracker::new(3);
        tracker.reserve_outgoing_challenge("corr_pending", Speed::Correspondence);

        assert_eq!(tracker.used_slots(&HashSet::new()), 0);
        assert_eq!(tracker.correspondence_reservation_count(), 1);
        assert!(tracker.has_correspondence_reservation());
        assert!(!tracker.needs_correspondence_game());
        assert!(tracker.is_correspondence("corr_pending"));
    }

    #[test]
    fn test_confirm_keeps_reservation_clears_pending() {
        let mut tracker = SlotTracker::new(3);
        tracker.reserve_outgoing_challenge("ch1", Speed::Rapid);

        tracker.confirm_game_start("ch1");
        assert!(tracker.has_reservation("ch1"));
        // Confirmed into a game: no longer counted as a pending challenge
        assert_eq!(tracker.used_slots(&HashSet::new()), 0);
        assert!(!tracker.can_accept_bot_speed(Speed::Classical, &HashSet::new()));
    }

    #[test]
    fn test_reserve_game_clears_pending_flags() {
        let mut tracker = SlotTracker::new(3);
        tracker.reserve_outgoing_challenge("ch1", Speed::Blitz);
        assert_eq!(tracker.used_slots(&HashSet::new()), 1);

        tracker.reserve_game("ch1", true, Speed::Blitz);
        assert_eq!(tracker.used_slots(&HashSet::new()), 0);
        assert!(tracker.has_reservation("ch1"));
    }

    #[test]
    fn test_correspondence_move_needs_free_bot_lane() {
        let mut tracker = SlotTracker::new(3);
        let active = ids(&["bot_short_game", "bot_long_game"]);
        tracker.reserve_game("bot_short_game", true, Speed::Bullet);
        tracker.reserve_game("bot_long_game", true, Speed::Rapid);

        // Two of three slots used, but both bot lanes occupied
        assert!(!tracker.can_start_correspondence_move(&active));

        let mut active = active;
        active.remove("bot_long_game");
        tracker.release("bot_long_game");
        assert!(tracker.can_start_correspondence_move(&active));
    }

    #[test]
    fn test_incoming_challenge_dispatch() {
        let mut tracker = SlotTracker::new(3);
        let no_games = HashSet::new();

        let challenge = |id: &str, is_bot: bool, speed: Speed| Challenge {
            id: id.to_string(),
            opponent: "them".to_string(),
            from_self: false,
            challenger_is_bot: is_bot,
            speed,
            variant: "standard".to_string(),
            rated: true,
        };

        assert!(tracker.can_accept_challenge(&challenge("a", false, Speed::Blitz), &no_games));
        assert!(tracker.can_accept_challenge(&challenge("b", true, Speed::Blitz), &no_games));
        assert!(
            tracker.can_accept_challenge(&challenge("c", true, Speed::Correspondence), &no_games)
        );

        tracker.reserve_game("short", true, Speed::Blitz);
        assert!(!tracker.can_accept_challenge(&challenge("d", true, Speed::Bullet), &no_games));
        assert!(tracker.can_accept_challenge(&challenge("e", true, Speed::Classical), &no_games));
    }

    #[test]
    fn test_human_slot_survives_bot_lanes() {
        let mut tracker = SlotTracker::new(3);
        tracker.reserve_outgoing_challenge("short", Speed::Blitz);
        tracker.reserve_outgoing_challenge("long", Speed::Rapid);

        // Both bot lanes reserved as pending challenges: two slots used
        assert_eq!(tracker.used_slots(&HashSet::new()), 2);
        assert!(tracker.can_accept_human(&HashSet::new()));
    }
}
