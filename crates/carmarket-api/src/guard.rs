//! In-memory brute-force protection for the login endpoint.
//!
//! Failures are tracked per `(ip, username)` in a sliding window. Once a key
//! collects [`MAX_FAILURES`] inside [`WINDOW`], the whole IP is blocked for
//! [`BLOCK_DURATION`]. State lives in the process; a restart forgets it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const WINDOW: Duration = Duration::from_secs(5 * 60);
pub const MAX_FAILURES: u32 = 5;
pub const BLOCK_DURATION: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// Failures left for this key before the IP is blocked.
    pub attempts_left: u32,
    /// True when this attempt triggered a block.
    pub blocked: bool,
}

#[derive(Default)]
struct GuardState {
    failures: HashMap<(String, String), Vec<Instant>>,
    blocked: HashMap<String, Instant>,
}

#[derive(Default)]
pub struct LoginGuard {
    state: Mutex<GuardState>,
}

impl LoginGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        // A panic mid-update leaves at worst a stale counter
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_attempt(&self, ip: &str, username: &str, success: bool) -> AttemptOutcome {
        self.record_attempt_at(ip, username, success, Instant::now())
    }

    pub fn record_attempt_at(
        &self,
        ip: &str,
        username: &str,
        success: bool,
        now: Instant,
    ) -> AttemptOutcome {
        let mut state = self.lock();
        let key = (ip.to_string(), username.to_lowercase());

        if success {
            state.failures.remove(&key);
            return AttemptOutcome {
                attempts_left: MAX_FAILURES,
                blocked: false,
            };
        }

        let failures = state.failures.entry(key.clone()).or_default();
        failures.retain(|&at| now.duration_since(at) < WINDOW);
        failures.push(now);
        let count = failures.len() as u32;

        if count >= MAX_FAILURES {
            state.failures.remove(&key);
            state.blocked.insert(key.0, now + BLOCK_DURATION);
            return AttemptOutcome {
                attempts_left: 0,
                blocked: true,
            };
        }

        AttemptOutcome {
            attempts_left: MAX_FAILURES - count,
            blocked: false,
        }
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        self.is_blocked_at(ip, Instant::now())
    }

    pub fn is_blocked_at(&self, ip: &str, now: Instant) -> bool {
        self.block_remaining_at(ip, now).is_some()
    }

    pub fn block_remaining(&self, ip: &str) -> Option<Duration> {
        self.block_remaining_at(ip, Instant::now())
    }

    /// Time left on the IP's block. Expired blocks are dropped here.
    pub fn block_remaining_at(&self, ip: &str, now: Instant) -> Option<Duration> {
        let mut state = self.lock();
        let until = *state.blocked.get(ip)?;
        if until > now {
            Some(until - now)
        } else {
            state.blocked.remove(ip);
            None
        }
    }

    pub fn prune(&self) {
        self.prune_at(Instant::now());
    }

    /// Drops keys whose failures all left the window and expired blocks.
    pub fn prune_at(&self, now: Instant) {
        let mut state = self.lock();
        state.failures.retain(|_, failures| {
            failures.retain(|&at| now.duration_since(at) < WINDOW);
            !failures.is_empty()
        });
        state.blocked.retain(|_, until| *until > now);
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> (usize, usize) {
        let state = self.lock();
        (state.failures.len(), state.blocked.len())
    }
}
