//! Inbound event ingestion: persist, dedupe, route.
//!
//! Every event is persisted before any routing decision, so a contact that
//! is being handled by a human still leaves a full message history behind.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info};

use {
    courier_queue::{DeliveryQueue, RetryPolicy},
    courier_store::{Conversation, Message, NewMessage, RecordStore},
    courier_transport::InboundEvent,
};

use crate::{
    Result,
    batcher::Batcher,
    error::Error,
    payload::{FORWARD_SINGLE, ForwardPayload},
};

/// Where an ingested event ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Enqueued as an immediate single-message delivery.
    Queued,
    /// Buffered behind the conversation's debounce window.
    Batched,
    /// External id already seen; nothing was re-delivered, whether or not
    /// the earlier delivery has completed.
    Duplicate,
    /// Persisted, then stopped: the contact is being handled by a human.
    Attended,
}

/// Result of ingesting one inbound event.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub message: Message,
    pub conversation: Conversation,
    pub is_new_contact: bool,
    pub routing: Routing,
}

/// The ingestion pipeline, shared across transports and the HTTP intake.
#[derive(Clone)]
pub struct Pipeline {
    store: RecordStore,
    queue: Arc<DeliveryQueue>,
    batcher: Arc<Batcher>,
}

impl Pipeline {
    pub fn new(store: RecordStore, queue: Arc<DeliveryQueue>, batcher: Arc<Batcher>) -> Self {
        Self {
            store,
            queue,
            batcher,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Ingest one inbound event for `bot_id`.
    ///
    /// Persists the conversation, contact, and message, then routes: drop
    /// duplicates and already-forwarded messages, stop on human-attended
    /// contacts, otherwise enqueue immediately or buffer for batching
    /// according to the bot's response delay.
    pub async fn handle_event(&self, bot_id: &str, event: &InboundEvent) -> Result<IngestOutcome> {
        let bot = self
            .store
            .get_bot(bot_id)
            .await?
            .ok_or_else(|| Error::bot_not_found(bot_id))?;

        let name = display_name(&event.push_name, &event.participant_id);
        let (conversation, is_new_contact) = self
            .store
            .upsert_conversation(&bot.id, &event.participant_id, &name)
            .await?;

        let (message, was_new) = self
            .store
            .upsert_message(NewMessage {
                external_id: event.external_id.clone(),
                conversation_id: conversation.id.clone(),
                sender: event.participant_id.clone(),
                from_me: false,
                content: event.content.clone(),
                kind: event.kind,
                forwarded_at_ms: None,
                processed: false,
            })
            .await?;

        if !was_new {
            debug!(
                bot_id = %bot.id,
                external_id = %event.external_id,
                "duplicate event, dropping"
            );
            return Ok(IngestOutcome {
                message,
                conversation,
                is_new_contact,
                routing: Routing::Duplicate,
            });
        }

        if let Some(status) = self
            .store
            .client_status(&bot.id, &event.participant_id)
            .await?
        {
            if status.human_attended() {
                info!(
                    bot_id = %bot.id,
                    participant_id = %event.participant_id,
                    status = %status,
                    "contact is human-attended, persisted without forwarding"
                );
                return Ok(IngestOutcome {
                    message,
                    conversation,
                    is_new_contact,
                    routing: Routing::Attended,
                });
            }
        }

        let payload = ForwardPayload {
            bot_id: bot.id.clone(),
            bot_name: bot.name.clone(),
            api_key: bot.api_key.clone(),
            session_id: conversation.id.clone(),
            message_id: message.id.clone(),
            from: event.participant_id.clone(),
            push_name: name,
            content: event.content.clone(),
            kind: event.kind,
            timestamp: chrono::Utc::now().to_rfc3339(),
            external_id: event.external_id.clone(),
            media_base64: event.media_base64.clone(),
            media_mimetype: event.media_mimetype.clone(),
            is_new_contact: Some(is_new_contact),
        };

        let routing = if bot.response_delay_secs > 0 {
            self.batcher
                .add(&payload, Duration::from_secs(u64::from(bot.response_delay_secs)))
                .await?;
            Routing::Batched
        } else {
            self.queue
                .enqueue(
                    FORWARD_SINGLE,
                    serde_json::to_value(&payload)?,
                    RetryPolicy::default(),
                )
                .await?;
            info!(
                bot_id = %bot.id,
                message_id = %message.id,
                "queued message for immediate delivery"
            );
            Routing::Queued
        };

        Ok(IngestOutcome {
            message,
            conversation,
            is_new_contact,
            routing,
        })
    }
}

/// Contact display name: push name when the transport supplied one,
/// otherwise derived from the address local part.
fn display_name(push_name: &str, participant_id: &str) -> String {
    if push_name.trim().is_empty() {
        let local = participant_id.split('@').next().unwrap_or(participant_id);
        format!("User {local}")
    } else {
        push_name.trim().to_string()
    }
}
