//! The ingestion → deduplication → batching → durable delivery pipeline.
//!
//! A raw inbound event is resolved to a conversation, persisted exactly once
//! (keyed by the provider's external id), and either forwarded immediately
//! or coalesced with other messages from the same conversation inside a
//! per-tenant debounce window. Delivery to the tenant's callback runs
//! through the durable queue with bounded retries.

pub mod batcher;
pub mod buffer;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod payload;

pub use {
    batcher::Batcher,
    buffer::BatchBuffer,
    error::{Error, Result},
    handlers::{ForwardBatchHandler, ForwardSingleHandler, register_handlers},
    ingest::{IngestOutcome, Pipeline, Routing},
    payload::{BatchMessage, BatchMeta, BatchPayload, FORWARD_BATCH, FORWARD_SINGLE, ForwardPayload},
};
