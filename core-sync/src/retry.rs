//! Linear-backoff retry bookkeeping.
//!
//! The Nth retry of a key waits `base_delay * N`. With a 5s base and three
//! retries the schedule is 5s, 10s, 15s, after which the action is recorded
//! as a permanent failure.

use core_runtime::config::CoordinatorConfig;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp { retry_count: u32 },
}

/// Attempt counters per rendered key.
///
/// A key is absent until its first failure. Counters never exceed
/// `max_retries` and are removed on success, when the key gives up, or
/// when a retry is skipped.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    policy: RetryPolicy,
    attempts: HashMap<String, u32>,
}

impl RetryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: HashMap::new(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn on_failure(&mut self, key: &str) -> RetryDecision {
        let attempts = self.attempts(key);
        if attempts < self.policy.max_retries {
            let attempt = attempts + 1;
            self.attempts.insert(key.to_string(), attempt);
            RetryDecision::Retry {
                attempt,
                delay: self.policy.delay_for(attempt),
            }
        } else {
            self.attempts.remove(key);
            RetryDecision::GiveUp {
                retry_count: attempts,
            }
        }
    }

    /// Clears the counter and returns the retries it took.
    pub fn on_success(&mut self, key: &str) -> u32 {
        self.attempts.remove(key).unwrap_or(0)
    }

    /// Drops the counter without recording an outcome and returns the
    /// attempts it held.
    pub fn reset(&mut self, key: &str) -> u32 {
        self.attempts.remove(key).unwrap_or(0)
    }

    pub fn attempts(&self, key: &str) -> u32 {
        self.attempts.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn clear(&mut self) {
        self.attempts.clear();
    }
}
