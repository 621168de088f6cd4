//! Utility functions for the matchmaking scheduler

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the inner value if a previous holder panicked.
///
/// The shared structures guarded this way (slot tracker, acceptance memory)
/// stay valid after any completed mutation, so recovering is always safe.
pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
