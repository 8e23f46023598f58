//! In-memory job store for tests and ephemeral setups.

use {async_trait::async_trait, std::sync::Mutex};

use crate::{
    Result,
    error::Error,
    store::JobStore,
    types::{Job, RetryPolicy},
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum JobState {
    Pending,
    Active,
}

struct Slot {
    job: Job,
    state: JobState,
}

/// Non-durable mirror of [`crate::SqliteJobStore`]. Loses jobs on restart;
/// use it only where durability does not matter.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    slots: Vec<Slot>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens if a holder panicked; the queue state
        // is still coherent, so keep going.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(
        &self,
        name: &str,
        payload: serde_json::Value,
        policy: RetryPolicy,
    ) -> Result<Job> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut inner = self.lock();
        inner.next_id += 1;
        let job = Job {
            id: inner.next_id,
            name: name.to_string(),
            payload,
            attempts: 0,
            policy,
            enqueued_at_ms: now,
            due_at_ms: now,
        };
        inner.slots.push(Slot {
            job: job.clone(),
            state: JobState::Pending,
        });
        Ok(job)
    }

    async fn claim_due(&self, now_ms: i64) -> Result<Option<Job>> {
        let mut inner = self.lock();
        let candidate = inner
            .slots
            .iter_mut()
            .filter(|s| s.state == JobState::Pending && s.job.due_at_ms <= now_ms)
            .min_by_key(|s| (s.job.due_at_ms, s.job.id));
        Ok(candidate.map(|slot| {
            slot.state = JobState::Active;
            slot.job.attempts += 1;
            slot.job.clone()
        }))
    }

    async fn complete(&self, job_id: i64) -> Result<()> {
        let mut inner = self.lock();
        let before = inner.slots.len();
        inner.slots.retain(|s| s.job.id != job_id);
        if inner.slots.len() == before {
            return Err(Error::job_not_found(job_id));
        }
        Ok(())
    }

    async fn reschedule(&self, job_id: i64, due_at_ms: i64) -> Result<()> {
        let mut inner = self.lock();
        let slot = inner
            .slots
            .iter_mut()
            .find(|s| s.job.id == job_id)
            .ok_or_else(|| Error::job_not_found(job_id))?;
        slot.state = JobState::Pending;
        slot.job.due_at_ms = due_at_ms;
        Ok(())
    }

    async fn discard(&self, job_id: i64) -> Result<()> {
        self.lock().slots.retain(|s| s.job.id != job_id);
        Ok(())
    }

    async fn next_due_at(&self) -> Result<Option<i64>> {
        Ok(self
            .lock()
            .slots
            .iter()
            .filter(|s| s.state == JobState::Pending)
            .map(|s| s.job.due_at_ms)
            .min())
    }

    async fn pending_count(&self) -> Result<u64> {
        Ok(self.lock().slots.len() as u64)
    }

    async fn release_claimed(&self) -> Result<u64> {
        let mut released = 0;
        for slot in &mut self.lock().slots {
            if slot.state == JobState::Active {
                slot.state = JobState::Pending;
                released += 1;
            }
        }
        Ok(released)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    #[tokio::test]
    async fn test_memory_claim_order_matches_sqlite() {
        let store = MemoryJobStore::new();
        store
            .enqueue("a", serde_json::json!({}), RetryPolicy::default())
            .await
            .unwrap();
        store
            .enqueue("b", serde_json::json!({}), RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(store.claim_due(now()).await.unwrap().unwrap().name, "a");
        assert_eq!(store.claim_due(now()).await.unwrap().unwrap().name, "b");
        assert!(store.claim_due(now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_reschedule_and_release() {
        let store = MemoryJobStore::new();
        let job = store
            .enqueue("j", serde_json::json!({}), RetryPolicy::default())
            .await
            .unwrap();

        let claimed = store.claim_due(now()).await.unwrap().unwrap();
        store.reschedule(claimed.id, now() + 10_000).await.unwrap();
        assert!(store.claim_due(now()).await.unwrap().is_none());

        store.claim_due(now() + 10_001).await.unwrap().unwrap();
        assert_eq!(store.release_claimed().await.unwrap(), 1);
        assert_eq!(store.claim_due(now()).await.unwrap().unwrap().id, job.id);
    }
}
