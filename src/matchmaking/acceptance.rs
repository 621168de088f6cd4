//! Acceptance memory: which opponents recently declined what
//!
//! Maps (opponent, aspect) pairs to expiry timers. The aspect is the part of
//! a challenge the opponent objected to: a rating category, a variant,
//! "casual"/"rated", or the empty string for a blanket objection. An empty
//! aspect entry doubles as a block-list entry.
//!
//! A missing key reads as "already expired"; lookups never insert.

use crate::clock::{days, years, Clock, Timer};
use std::collections::HashMap;

/// Aspect value meaning "any game at all"
pub const ANY_ASPECT: &str = "";

/// Default suppression after a decline
pub fn default_suppression() -> chrono::Duration {
    days(1)
}

/// Suppression used for hard block-list entries
pub fn block_duration() -> chrono::Duration {
    years(10)
}

/// Suppression map recording recently declined (opponent, aspect) pairs
#[derive(Debug, Default)]
pub struct AcceptanceMemory {
    entries: HashMap<(String, String), Timer>,
}

impl AcceptanceMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop challenging an opponent on one aspect for a duration
    pub fn suppress_for(
        &mut self,
        username: &str,
        aspect: &str,
        duration: chrono::Duration,
        clock: &dyn Clock,
    ) {
        self.entries.insert(
            (username.to_string(), aspect.to_string()),
            Timer::new(duration, clock),
        );
    }

    /// Stop challenging an opponent on one aspect for the default day
    pub fn suppress(&mut self, username: &str, aspect: &str, clock: &dyn Clock) {
        self.suppress_for(username, aspect, default_suppression(), clock);
    }

    /// Add an opponent to the long-term block list
    pub fn block(&mut self, username: &str, clock: &dyn Clock) {
        self.suppress_for(username, ANY_ASPECT, block_duration(), clock);
    }

    /// Whether this opponent is likely to accept a challenge on this aspect.
    /// Unknown pairs are acceptable.
    pub fn is_acceptable(&self, username: &str, aspect: &str, clock: &dyn Clock) -> bool {
        self.entries
            .get(&(username.to_string(), aspect.to_string()))
            .is_none_or(|timer| timer.is_expired(clock))
    }

    /// Whether an opponent is fully blocked (empty-aspect suppression active)
    pub fn is_blocked(&self, username: &str, clock: &dyn Clock) -> bool {
        !self.is_acceptable(username, ANY_ASPECT, clock)
    }

    /// Drop expired entries so the map does not grow without bound
    pub fn prune(&mut self, clock: &dyn Clock) {
        self.entries.retain(|_, timer| !timer.is_expired(clock));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
