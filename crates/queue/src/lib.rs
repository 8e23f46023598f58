//! Durable at-least-once FIFO delivery queue with a bounded worker pool.
//!
//! Producers enqueue named jobs with a retry policy; workers claim due jobs,
//! dispatch by name to a registered handler, and either acknowledge, retry
//! after exponential backoff, or discard once the attempt budget is spent.
//! No cross-job ordering is promised; FIFO is by (due time, insertion order).

pub mod error;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;
pub mod worker;

pub use {
    error::{Error, Result},
    store::JobStore,
    store_memory::MemoryJobStore,
    store_sqlite::SqliteJobStore,
    types::{Job, RetryPolicy},
    worker::{DEFAULT_CONCURRENCY, DeliveryQueue, JobHandler, WorkerPool},
};
