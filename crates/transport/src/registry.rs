//! Per-bot transport session registry.

use std::{collections::HashMap, sync::Arc};

use {async_trait::async_trait, tokio::sync::RwLock};

use crate::send::SendPayload;

/// A live transport session for one bot.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the session is currently connected to the network.
    fn is_connected(&self) -> bool;

    /// Send a payload to a participant. `to` is an already-normalized
    /// participant address.
    async fn send(&self, to: &str, payload: &SendPayload) -> anyhow::Result<()>;
}

/// Registry of live sessions keyed by bot id.
///
/// Owned by the transport collaborator; the pipeline only ever looks up by
/// key, it never iterates.
#[derive(Default)]
pub struct TransportRegistry {
    sessions: RwLock<HashMap<String, Arc<dyn Transport>>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, bot_id: impl Into<String>, transport: Arc<dyn Transport>) {
        self.sessions.write().await.insert(bot_id.into(), transport);
    }

    pub async fn remove(&self, bot_id: &str) {
        self.sessions.write().await.remove(bot_id);
    }

    pub async fn get(&self, bot_id: &str) -> Option<Arc<dyn Transport>> {
        self.sessions.read().await.get(bot_id).cloned()
    }

    /// Look up a session that is present and connected.
    pub async fn get_connected(&self, bot_id: &str) -> Option<Arc<dyn Transport>> {
        self.get(bot_id).await.filter(|t| t.is_connected())
    }
}
