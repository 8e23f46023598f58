//! Job and retry-policy types.

use serde::{Deserialize, Serialize};

/// Retry policy attached to a job at enqueue time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempt budget, including the first attempt.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, after `attempts` attempts have run.
    /// Doubles per attempt: base, 2×base, 4×base, …
    #[must_use]
    pub fn backoff_after(&self, attempts: u32) -> u64 {
        let exp = attempts.saturating_sub(1).min(16);
        self.backoff_base_ms.saturating_mul(1 << exp)
    }
}

/// A claimed or pending delivery job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub payload: serde_json::Value,
    /// Attempts started so far (incremented on claim).
    pub attempts: u32,
    pub policy: RetryPolicy,
    pub enqueued_at_ms: i64,
    pub due_at_ms: i64,
}

impl Job {
    /// Whether the attempt budget is exhausted.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }
}
