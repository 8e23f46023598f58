//! Bounded worker pool draining the delivery queue.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tokio::{sync::Notify, task::JoinHandle},
    tracing::{debug, error, info, warn},
};

use crate::{
    Result,
    store::JobStore,
    types::{Job, RetryPolicy},
};

/// Default worker concurrency, matching the ingestion side's burst shape.
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Idle poll interval when the queue is empty (backstop for missed wakeups).
const IDLE_POLL: Duration = Duration::from_secs(5);

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Handler for one job name.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, payload: serde_json::Value) -> anyhow::Result<()>;
}

/// Producer-side handle: enqueue wakes a sleeping worker.
pub struct DeliveryQueue {
    store: Arc<dyn JobStore>,
    wake: Notify,
}

impl DeliveryQueue {
    pub fn new(store: Arc<dyn JobStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            wake: Notify::new(),
        })
    }

    pub async fn enqueue(
        &self,
        name: &str,
        payload: serde_json::Value,
        policy: RetryPolicy,
    ) -> Result<Job> {
        let job = self.store.enqueue(name, payload, policy).await?;
        debug!(job_id = job.id, name, "job enqueued");
        self.wake.notify_one();
        Ok(job)
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub async fn pending_count(&self) -> Result<u64> {
        self.store.pending_count().await
    }
}

/// Pool of workers pulling jobs and dispatching by name.
pub struct WorkerPool {
    queue: Arc<DeliveryQueue>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    concurrency: usize,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(queue: Arc<DeliveryQueue>, concurrency: usize) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
            concurrency: concurrency.max(1),
            workers: Vec::new(),
        }
    }

    /// Register the handler for a job name. Last registration wins.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Release jobs stranded by a previous process, then spawn the workers.
    pub async fn start(&mut self) -> Result<()> {
        let released = self.queue.store().release_claimed().await?;
        if released > 0 {
            info!(released, "released jobs claimed by a previous process");
        }

        let handlers = Arc::new(self.handlers.clone());
        info!(concurrency = self.concurrency, "starting delivery workers");
        for worker_id in 0..self.concurrency {
            let queue = Arc::clone(&self.queue);
            let handlers = Arc::clone(&handlers);
            self.workers.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, handlers).await;
            }));
        }
        Ok(())
    }

    /// Abort the workers. Any claimed jobs are released on next start.
    pub fn stop(&mut self) {
        for handle in self.workers.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<DeliveryQueue>,
    handlers: Arc<HashMap<String, Arc<dyn JobHandler>>>,
) {
    loop {
        let claimed = queue.store().claim_due(now_ms()).await;
        match claimed {
            Ok(Some(job)) => {
                process_job(worker_id, queue.store(), &handlers, job).await;
            },
            Ok(None) => {
                // Sleep until the next due time or a producer wakeup.
                let sleep_for = match queue.store().next_due_at().await {
                    Ok(Some(due)) => {
                        Duration::from_millis((due - now_ms()).max(0) as u64).min(IDLE_POLL)
                    },
                    _ => IDLE_POLL,
                };
                tokio::select! {
                    () = queue.wake.notified() => {},
                    () = tokio::time::sleep(sleep_for) => {},
                }
            },
            Err(e) => {
                error!(worker_id, error = %e, "failed to claim job");
                tokio::time::sleep(Duration::from_secs(1)).await;
            },
        }
    }
}

async fn process_job(
    worker_id: usize,
    store: &Arc<dyn JobStore>,
    handlers: &HashMap<String, Arc<dyn JobHandler>>,
    job: Job,
) {
    let Some(handler) = handlers.get(&job.name) else {
        warn!(worker_id, job_id = job.id, name = %job.name, "unknown job name, discarding");
        if let Err(e) = store.discard(job.id).await {
            error!(job_id = job.id, error = %e, "failed to discard job");
        }
        return;
    };

    match handler.run(job.payload.clone()).await {
        Ok(()) => {
            debug!(worker_id, job_id = job.id, name = %job.name, "job completed");
            if let Err(e) = store.complete(job.id).await {
                error!(job_id = job.id, error = %e, "failed to acknowledge job");
            }
        },
        Err(e) if job.exhausted() => {
            // Terminal: no dead-letter store, the log line is the only record.
            error!(
                worker_id,
                job_id = job.id,
                name = %job.name,
                attempts = job.attempts,
                error = %e,
                "job failed, attempt budget exhausted, discarding"
            );
            if let Err(e) = store.discard(job.id).await {
                error!(job_id = job.id, error = %e, "failed to discard exhausted job");
            }
        },
        Err(e) => {
            let delay_ms = job.policy.backoff_after(job.attempts);
            warn!(
                worker_id,
                job_id = job.id,
                name = %job.name,
                attempt = job.attempts,
                max_attempts = job.policy.max_attempts,
                delay_ms,
                error = %e,
                "job failed, retrying after backoff"
            );
            if let Err(e) = store.reschedule(job.id, now_ms() + delay_ms as i64).await {
                error!(job_id = job.id, error = %e, "failed to reschedule job");
            }
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use {super::*, crate::store_memory::MemoryJobStore};

    struct CountingHandler {
        calls: Arc<AtomicU32>,
        fail_first: u32,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn run(&self, _payload: serde_json::Value) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                anyhow::bail!("simulated failure {call}");
            }
            Ok(())
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_base_ms: 10,
        }
    }

    async fn wait_for_drain(queue: &Arc<DeliveryQueue>) {
        for _ in 0..200 {
            if queue.pending_count().await.unwrap() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("queue did not drain within timeout");
    }

    #[tokio::test]
    async fn test_success_acknowledges() {
        let queue = DeliveryQueue::new(Arc::new(MemoryJobStore::new()));
        let calls = Arc::new(AtomicU32::new(0));

        let mut pool = WorkerPool::new(Arc::clone(&queue), 2);
        pool.register(
            "forward_single",
            Arc::new(CountingHandler {
                calls: Arc::clone(&calls),
                fail_first: 0,
            }),
        );
        pool.start().await.unwrap();

        queue
            .enqueue("forward_single", serde_json::json!({}), fast_policy(3))
            .await
            .unwrap();

        wait_for_drain(&queue).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        pool.stop();
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_succeeds() {
        let queue = DeliveryQueue::new(Arc::new(MemoryJobStore::new()));
        let calls = Arc::new(AtomicU32::new(0));

        let mut pool = WorkerPool::new(Arc::clone(&queue), 1);
        pool.register(
            "forward_single",
            Arc::new(CountingHandler {
                calls: Arc::clone(&calls),
                fail_first: 2,
            }),
        );
        pool.start().await.unwrap();

        queue
            .enqueue("forward_single", serde_json::json!({}), fast_policy(5))
            .await
            .unwrap();

        wait_for_drain(&queue).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        pool.stop();
    }

    #[tokio::test]
    async fn test_retry_ceiling_discards_after_budget() {
        let queue = DeliveryQueue::new(Arc::new(MemoryJobStore::new()));
        let calls = Arc::new(AtomicU32::new(0));

        let mut pool = WorkerPool::new(Arc::clone(&queue), 1);
        pool.register(
            "forward_single",
            Arc::new(CountingHandler {
                calls: Arc::clone(&calls),
                fail_first: u32::MAX,
            }),
        );
        pool.start().await.unwrap();

        queue
            .enqueue("forward_single", serde_json::json!({}), fast_policy(3))
            .await
            .unwrap();

        wait_for_drain(&queue).await;
        // Attempted exactly max_attempts times, then abandoned.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        pool.stop();
    }

    #[tokio::test]
    async fn test_unknown_job_name_discarded() {
        let queue = DeliveryQueue::new(Arc::new(MemoryJobStore::new()));
        let calls = Arc::new(AtomicU32::new(0));

        let mut pool = WorkerPool::new(Arc::clone(&queue), 1);
        pool.register(
            "forward_single",
            Arc::new(CountingHandler {
                calls: Arc::clone(&calls),
                fail_first: 0,
            }),
        );
        pool.start().await.unwrap();

        queue
            .enqueue("mystery", serde_json::json!({}), fast_policy(3))
            .await
            .unwrap();

        wait_for_drain(&queue).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        pool.stop();
    }
}
