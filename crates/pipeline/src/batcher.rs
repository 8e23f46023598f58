//! Per-conversation debounce batching.
//!
//! Messages for a conversation accumulate in the durable buffer; each `add`
//! restarts the conversation's one-shot timer, so the flush fires only after
//! the configured delay of inactivity. There is no maximum-wait cap: a
//! continuously active conversation keeps deferring delivery.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    tokio::{sync::Mutex, task::JoinHandle},
    tracing::{error, info, warn},
};

use {
    courier_queue::{DeliveryQueue, RetryPolicy},
    courier_store::RecordStore,
};

use crate::{
    Result,
    buffer::BatchBuffer,
    payload::{BatchMessage, BatchMeta, BatchPayload, FORWARD_BATCH, ForwardPayload},
};

/// Floor for the buffer safety expiry.
const MIN_EXPIRY: Duration = Duration::from_secs(60);

/// How often the reconciler sweeps for buffers whose expiry has passed.
pub const RECONCILE_PERIOD: Duration = Duration::from_secs(30);

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn timer_key(bot_id: &str, participant_id: &str) -> String {
    format!("{bot_id}:{participant_id}")
}

/// Debounce batcher over the durable buffer.
///
/// The timer map is process-local, best-effort state; durability comes from
/// the buffer rows and their expiry, which the reconciler turns back into
/// flushes after a restart.
pub struct Batcher {
    buffer: BatchBuffer,
    store: RecordStore,
    queue: Arc<DeliveryQueue>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Batcher {
    pub fn new(buffer: BatchBuffer, store: RecordStore, queue: Arc<DeliveryQueue>) -> Arc<Self> {
        Arc::new(Self {
            buffer,
            store,
            queue,
            timers: Mutex::new(HashMap::new()),
        })
    }

    /// Append a message to the conversation's buffer and restart its
    /// debounce window.
    pub async fn add(self: &Arc<Self>, payload: &ForwardPayload, delay: Duration) -> Result<()> {
        let expiry = (delay * 3).max(MIN_EXPIRY);
        let meta = BatchMeta {
            bot_name: payload.bot_name.clone(),
            session_id: payload.session_id.clone(),
            api_key: payload.api_key.clone(),
            is_new_contact: payload.is_new_contact.unwrap_or(false),
        };
        self.buffer
            .append(
                &payload.bot_id,
                &payload.from,
                &BatchMessage::from(payload),
                &meta,
                now_ms() + expiry.as_millis() as i64,
            )
            .await?;

        self.restart_timer(&payload.bot_id, &payload.from, delay).await;
        info!(
            bot_id = %payload.bot_id,
            from = %payload.from,
            delay_secs = delay.as_secs(),
            "buffered message for batching"
        );
        Ok(())
    }

    /// Replace (never accumulate) the pending timer for a key.
    async fn restart_timer(self: &Arc<Self>, bot_id: &str, participant_id: &str, delay: Duration) {
        let key = timer_key(bot_id, participant_id);
        let this = Arc::clone(self);
        let (bot_id, participant_id) = (bot_id.to_string(), participant_id.to_string());
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The lock acquisition is the cancellation point: a replaced
            // timer parked here is aborted before it can touch the map.
            this.timers.lock().await.remove(&task_key);
            if let Err(e) = this.flush(&bot_id, &participant_id).await {
                error!(bot_id, participant_id, error = %e, "debounce flush failed");
            }
        });

        let mut timers = self.timers.lock().await;
        if let Some(previous) = timers.insert(key, handle) {
            previous.abort();
        }
    }

    /// Atomically drain the buffer and, if it held anything, emit exactly
    /// one consolidated delivery job and mark the drained messages
    /// forwarded. An empty drain is a no-op, not an error.
    pub async fn flush(&self, bot_id: &str, participant_id: &str) -> Result<()> {
        let (messages, meta) = self.buffer.drain(bot_id, participant_id).await?;
        if messages.is_empty() {
            warn!(bot_id, participant_id, "flush found no buffered messages");
            return Ok(());
        }

        let meta = meta.unwrap_or_else(|| BatchMeta {
            bot_name: "Unknown".into(),
            ..BatchMeta::default()
        });
        let message_ids: Vec<String> = messages.iter().map(|m| m.message_id.clone()).collect();
        let count = messages.len();

        let batch = BatchPayload::new(bot_id, participant_id, meta, messages);
        self.queue
            .enqueue(
                FORWARD_BATCH,
                serde_json::to_value(&batch)?,
                RetryPolicy::default(),
            )
            .await?;
        self.store.mark_forwarded(&message_ids).await?;

        info!(bot_id, participant_id, count, "flushed batch buffer");
        Ok(())
    }

    /// Number of pending debounce timers (monitoring only).
    pub async fn active_timers(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Spawn the periodic sweep that flushes buffers whose safety expiry
    /// has passed (lost timers, process restarts).
    pub fn spawn_reconciler(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let keys = match this.buffer.expired_keys(now_ms()).await {
                    Ok(keys) => keys,
                    Err(e) => {
                        error!(error = %e, "reconciler failed to scan buffer expiries");
                        continue;
                    },
                };
                for (bot_id, participant_id) in keys {
                    warn!(bot_id, participant_id, "buffer expiry passed, forcing flush");
                    if let Err(e) = this.flush(&bot_id, &participant_id).await {
                        error!(bot_id, participant_id, error = %e, "reconciler flush failed");
                    }
                }
            }
        })
    }
}
