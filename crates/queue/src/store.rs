//! Persistence trait for delivery jobs.

use async_trait::async_trait;

use crate::{
    Result,
    types::{Job, RetryPolicy},
};

/// Durable backend for the delivery queue.
///
/// Claiming must be atomic: two concurrent `claim_due` calls never return
/// the same job. A claimed job stays invisible to other workers until it is
/// completed, rescheduled, or discarded.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Append a job; it becomes due immediately.
    async fn enqueue(&self, name: &str, payload: serde_json::Value, policy: RetryPolicy)
    -> Result<Job>;

    /// Atomically claim the oldest due job, incrementing its attempt count.
    async fn claim_due(&self, now_ms: i64) -> Result<Option<Job>>;

    /// Acknowledge a claimed job; it leaves the queue permanently.
    async fn complete(&self, job_id: i64) -> Result<()>;

    /// Return a claimed job to the queue, due again at `due_at_ms`.
    async fn reschedule(&self, job_id: i64, due_at_ms: i64) -> Result<()>;

    /// Drop a claimed job without acknowledgment (budget exhausted or
    /// unknown name). Terminal; observable only via logs.
    async fn discard(&self, job_id: i64) -> Result<()>;

    /// Earliest due time among pending jobs, for worker sleep scheduling.
    async fn next_due_at(&self) -> Result<Option<i64>>;

    /// Number of jobs not yet completed or discarded.
    async fn pending_count(&self) -> Result<u64>;

    /// Release jobs claimed by a previous process. Call once at startup.
    async fn release_claimed(&self) -> Result<u64>;
}
