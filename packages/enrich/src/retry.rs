//! Retry policy for upstream requests.
//!
//! The policy only answers two questions: may another attempt be made,
//! and how long to wait before it. The fetch client owns the loop and the
//! sleeping, so the schedule can be checked without any network.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Default number of attempts (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff unit; attempt `n` waits `n` units after failing.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Linear backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff unit, written as whole seconds (`backoff_secs`) in TOML.
    #[serde(
        rename = "backoff_secs",
        default = "default_backoff",
        deserialize_with = "deserialize_secs"
    )]
    backoff: Duration,
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_backoff() -> Duration {
    DEFAULT_BACKOFF
}

fn deserialize_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF)
    }
}

impl RetryPolicy {
    /// Creates a policy with `max_attempts` tries and a linear backoff of
    /// `backoff * attempt`.
    #[must_use]
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Number of attempts that will actually be made.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// The backoff unit.
    #[must_use]
    pub const fn backoff_unit(&self) -> Duration {
        self.backoff
    }

    /// How long to wait after attempt `attempt` (1-based) fails.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit().saturating_mul(attempt)
    }

    /// Full wait schedule for a request that fails every attempt.
    #[must_use]
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.attempts()).map(|n| self.backoff(n)).collect()
    }
}
