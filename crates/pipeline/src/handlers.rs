//! Delivery job handlers.
//!
//! The callback URL is resolved at delivery time, not enqueue time, so a
//! tenant reconfigured mid-flight gets the new target for every pending job.
//! An `Err` from a handler asks the queue to retry; rejections and missing
//! URLs return `Ok` because retrying them cannot help.

use std::sync::Arc;

use {
    anyhow::Context,
    async_trait::async_trait,
    tracing::{error, info, warn},
};

use {
    courier_queue::{JobHandler, WorkerPool},
    courier_store::RecordStore,
    courier_webhook::{Delivery, Poster},
};

use crate::payload::{BatchPayload, FORWARD_BATCH, FORWARD_SINGLE, ForwardPayload};

/// Delivers a single-message forward to the bot's callback.
pub struct ForwardSingleHandler {
    store: RecordStore,
    poster: Poster,
}

impl ForwardSingleHandler {
    pub fn new(store: RecordStore, poster: Poster) -> Self {
        Self { store, poster }
    }
}

#[async_trait]
impl JobHandler for ForwardSingleHandler {
    async fn run(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let forward: ForwardPayload =
            serde_json::from_value(payload).context("malformed forward_single payload")?;

        let Some(url) = callback_url(&self.store, &forward.bot_id).await? else {
            warn!(
                bot_id = %forward.bot_id,
                message_id = %forward.message_id,
                "no callback URL configured, skipping delivery"
            );
            return Ok(());
        };

        match self
            .poster
            .post(&url, &serde_json::to_value(&forward)?)
            .await
        {
            Delivery::Delivered => {
                self.store
                    .mark_forwarded(std::slice::from_ref(&forward.message_id))
                    .await?;
                info!(
                    bot_id = %forward.bot_id,
                    message_id = %forward.message_id,
                    "message delivered"
                );
                Ok(())
            },
            Delivery::Rejected { status } => {
                error!(
                    bot_id = %forward.bot_id,
                    message_id = %forward.message_id,
                    status,
                    "callback rejected message, dropping"
                );
                Ok(())
            },
            Delivery::RetryableFailure { reason } => {
                anyhow::bail!("delivery failed for {}: {reason}", forward.message_id)
            },
        }
    }
}

/// Delivers a consolidated batch to the bot's callback.
pub struct ForwardBatchHandler {
    store: RecordStore,
    poster: Poster,
}

impl ForwardBatchHandler {
    pub fn new(store: RecordStore, poster: Poster) -> Self {
        Self { store, poster }
    }
}

#[async_trait]
impl JobHandler for ForwardBatchHandler {
    async fn run(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let batch: BatchPayload =
            serde_json::from_value(payload).context("malformed forward_batch payload")?;

        let Some(url) = callback_url(&self.store, &batch.bot_id).await? else {
            warn!(
                bot_id = %batch.bot_id,
                count = batch.message_count,
                "no callback URL configured, skipping batch delivery"
            );
            return Ok(());
        };

        match self.poster.post(&url, &serde_json::to_value(&batch)?).await {
            Delivery::Delivered => {
                // The flush already marked these rows; marking again is
                // idempotent.
                let ids: Vec<String> = batch
                    .messages
                    .iter()
                    .map(|m| m.message_id.clone())
                    .collect();
                self.store.mark_forwarded(&ids).await?;
                info!(
                    bot_id = %batch.bot_id,
                    count = batch.message_count,
                    "batch delivered"
                );
                Ok(())
            },
            Delivery::Rejected { status } => {
                error!(
                    bot_id = %batch.bot_id,
                    count = batch.message_count,
                    status,
                    "callback rejected batch, dropping"
                );
                Ok(())
            },
            Delivery::RetryableFailure { reason } => {
                anyhow::bail!(
                    "batch delivery failed for bot {}: {reason}",
                    batch.bot_id
                )
            },
        }
    }
}

async fn callback_url(store: &RecordStore, bot_id: &str) -> anyhow::Result<Option<String>> {
    let bot = store
        .get_bot(bot_id)
        .await
        .with_context(|| format!("failed to load bot {bot_id}"))?;
    Ok(bot.and_then(|b| b.callback_url))
}

/// Wire both forward handlers into a worker pool.
pub fn register_handlers(pool: &mut WorkerPool, store: RecordStore, poster: Poster) {
    pool.register(
        FORWARD_SINGLE,
        Arc::new(ForwardSingleHandler::new(store.clone(), poster.clone())),
    );
    pool.register(
        FORWARD_BATCH,
        Arc::new(ForwardBatchHandler::new(store, poster)),
    );
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use {
        super::*,
        courier_common::MessageKind,
        courier_store::{NewBot, NewMessage},
        courier_webhook::PosterConfig,
        mockito::Server,
    };

    struct Fixture {
        store: RecordStore,
        bot_id: String,
        message_id: String,
        external_id: String,
        session_id: String,
    }

    async fn fixture(callback_url: Option<String>) -> Fixture {
        let pool = courier_store::open_in_memory().await.unwrap();
        let store = RecordStore::new(pool);
        let bot = store
            .create_bot(NewBot {
                name: "alpha".into(),
                identifier: "bot@network".into(),
                callback_url,
                api_key: "key".into(),
                response_delay_secs: 0,
            })
            .await
            .unwrap();
        let (conv, _) = store
            .upsert_conversation(&bot.id, "p1", "Ana")
            .await
            .unwrap();
        let (message, _) = store
            .upsert_message(NewMessage {
                external_id: "m1".into(),
                conversation_id: conv.id.clone(),
                sender: "p1".into(),
                from_me: false,
                content: "hello".into(),
                kind: MessageKind::Text,
                forwarded_at_ms: None,
                processed: false,
            })
            .await
            .unwrap();
        Fixture {
            store,
            bot_id: bot.id,
            message_id: message.id,
            external_id: "m1".into(),
            session_id: conv.id,
        }
    }

    fn fast_poster() -> Poster {
        Poster::new(PosterConfig {
            timeout: Duration::from_secs(2),
            max_attempts: 2,
            backoff_base: Duration::from_millis(10),
        })
        .unwrap()
    }

    fn forward_payload(f: &Fixture) -> serde_json::Value {
        serde_json::to_value(ForwardPayload {
            bot_id: f.bot_id.clone(),
            bot_name: "alpha".into(),
            api_key: "key".into(),
            session_id: f.session_id.clone(),
            message_id: f.message_id.clone(),
            from: "p1".into(),
            push_name: "Ana".into(),
            content: "hello".into(),
            kind: MessageKind::Text,
            timestamp: chrono::Utc::now().to_rfc3339(),
            external_id: f.external_id.clone(),
            media_base64: None,
            media_mimetype: None,
            is_new_contact: Some(true),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_delivered_marks_forwarded() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("content-type", "application/json")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let f = fixture(Some(format!("{}/hook", server.url()))).await;
        let handler = ForwardSingleHandler::new(f.store.clone(), fast_poster());
        handler.run(forward_payload(&f)).await.unwrap();

        mock.assert_async().await;
        let message = f.store.get_message(&f.message_id).await.unwrap().unwrap();
        assert!(message.is_forwarded());
    }

    #[tokio::test]
    async fn test_rejection_is_terminal_and_leaves_message_unforwarded() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(422)
            .expect(1)
            .create_async()
            .await;

        let f = fixture(Some(format!("{}/hook", server.url()))).await;
        let handler = ForwardSingleHandler::new(f.store.clone(), fast_poster());
        // Ok: the queue must not retry a rejection.
        handler.run(forward_payload(&f)).await.unwrap();

        mock.assert_async().await;
        let message = f.store.get_message(&f.message_id).await.unwrap().unwrap();
        assert!(!message.is_forwarded());
    }

    #[tokio::test]
    async fn test_transient_failure_asks_for_retry() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let f = fixture(Some(format!("{}/hook", server.url()))).await;
        let handler = ForwardSingleHandler::new(f.store.clone(), fast_poster());
        assert!(handler.run(forward_payload(&f)).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_callback_url_skips_quietly() {
        let f = fixture(None).await;
        let handler = ForwardSingleHandler::new(f.store.clone(), fast_poster());
        handler.run(forward_payload(&f)).await.unwrap();

        let message = f.store.get_message(&f.message_id).await.unwrap().unwrap();
        assert!(!message.is_forwarded());
    }

    #[tokio::test]
    async fn test_batch_delivery_posts_consolidated_payload() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "type": "BATCH",
                "messageCount": 1,
            })))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let f = fixture(Some(format!("{}/hook", server.url()))).await;
        let batch = BatchPayload::new(
            f.bot_id.clone(),
            "p1",
            crate::payload::BatchMeta {
                bot_name: "alpha".into(),
                session_id: f.session_id.clone(),
                api_key: "key".into(),
                is_new_contact: false,
            },
            vec![crate::payload::BatchMessage {
                message_id: f.message_id.clone(),
                push_name: "Ana".into(),
                content: "hello".into(),
                kind: MessageKind::Text,
                timestamp: chrono::Utc::now().to_rfc3339(),
                external_id: f.external_id.clone(),
                media_base64: None,
                media_mimetype: None,
            }],
        );

        let handler = ForwardBatchHandler::new(f.store.clone(), fast_poster());
        handler
            .run(serde_json::to_value(&batch).unwrap())
            .await
            .unwrap();

        mock.assert_async().await;
        let message = f.store.get_message(&f.message_id).await.unwrap().unwrap();
        assert!(message.is_forwarded());
    }
}
