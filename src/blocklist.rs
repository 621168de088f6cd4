//! Dynamically refreshed opponent blocklist
//!
//! Besides the permanent `block_list` from the configuration, opponents can be
//! excluded through an externally maintained list that is re-fetched
//! periodically. Fetch failures keep the previous list.

use crate::clock::{minutes, Clock, Timer};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::utils::lock_unpoisoned;

/// Source of blocked usernames
#[async_trait]
pub trait BlocklistProvider: Send + Sync {
    async fn fetch(&self) -> Result<Vec<String>>;
}

/// Provider backed by a fixed list, used when the configuration inlines names
/// and by tests.
#[derive(Debug, Clone, Default)]
pub struct StaticBlocklistProvider {
    names: Vec<String>,
}

impl StaticBlocklistProvider {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

#[async_trait]
impl BlocklistProvider for StaticBlocklistProvider {
    async fn fetch(&self) -> Result<Vec<String>> {
        Ok(self.names.clone())
    }
}

/// Blocklist that refreshes itself from a provider at most once per interval
pub struct OnlineBlocklist {
    provider: Box<dyn BlocklistProvider>,
    names: RwLock<HashSet<String>>,
    refresh_timer: Mutex<Option<Timer>>,
    refresh_interval: chrono::Duration,
}

impl OnlineBlocklist {
    pub fn new(provider: Box<dyn BlocklistProvider>) -> Self {
        Self {
            provider,
            names: RwLock::new(HashSet::new()),
            refresh_timer: Mutex::new(None),
            refresh_interval: minutes(60),
        }
    }

    pub fn with_refresh_interval(mut self, interval: chrono::Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Re-fetch the list if the refresh interval has passed. The first call
    /// always fetches.
    pub async fn refresh(&self, clock: &dyn Clock) {
        {
            let timer = lock_unpoisoned(&self.refresh_timer);
            if let Some(timer) = timer.as_ref() {
                if !timer.is_expired(clock) {
                    return;
                }
            }
        }

        match self.provider.fetch().await {
            Ok(fetched) => {
                debug!("Refreshed online blocklist: {} entries", fetched.len());
                if let Ok(mut names) = self.names.write() {
                    *names = fetched.into_iter().collect();
                }
            }
            Err(error) => {
                warn!("Failed to refresh online blocklist, keeping previous: {error:#}");
            }
        }

        *lock_unpoisoned(&self.refresh_timer) = Some(Timer::new(self.refresh_interval, clock));
    }

    pub fn contains(&self, username: &str) -> bool {
        self.names
            .read()
            .map(|names| names.contains(username))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{seconds, ManualClock};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        fetches: std::sync::Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BlocklistProvider for CountingProvider {
        async fn fetch(&self) -> Result<Vec<String>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["badbot".to_string()])
        }
    }

    #[tokio::test]
    async fn test_refresh_populates_names() {
        let clock = ManualClock::starting_now();
        let blocklist = OnlineBlocklist::new(Box::new(StaticBlocklistProvider::new(vec![
            "badbot".to_string(),
        ])));

        assert!(!blocklist.contains("badbot"));
        blocklist.refresh(&clock).await;
        assert!(blocklist.contains("badbot"));
        assert!(!blocklist.contains("goodbot"));
    }

    #[tokio::test]
    async fn test_refresh_respects_interval() {
        let clock = ManualClock::starting_now();
        let fetches = std::sync::Arc::new(AtomicUsize::new(0));
        let provider = CountingProvider {
            fetches: fetches.clone(),
        };
        let blocklist =
            OnlineBlocklist::new(Box::new(provider)).with_refresh_interval(seconds(100));

        blocklist.refresh(&clock).await;
        blocklist.refresh(&clock).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        clock.advance(seconds(101));
        blocklist.refresh(&clock).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert!(blocklist.contains("badbot"));
    }
}
