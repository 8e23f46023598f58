//! Record types stored in SQLite.

use {
    courier_common::{ClientStatus, ConversationStatus, MessageKind},
    serde::{Deserialize, Serialize},
};

/// Tenant identity: one bot per connected messaging-network account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    pub id: String,
    pub name: String,
    /// The bot's own identifier on the messaging network (used as the
    /// sender on outbound message records).
    pub identifier: String,
    /// Callback endpoint for forwarded messages. `None` means deliveries
    /// are skipped with a warning.
    pub callback_url: Option<String>,
    pub api_key: String,
    /// Debounce window in seconds; 0 disables batching.
    pub response_delay_secs: u32,
    pub created_at_ms: i64,
}

/// Input for creating a bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBot {
    pub name: String,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub api_key: String,
    #[serde(default)]
    pub response_delay_secs: u32,
}

/// One thread between a bot and one external participant.
/// Unique key is (bot_id, participant_id), never a surrogate alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub bot_id: String,
    pub participant_id: String,
    pub name: String,
    pub status: ConversationStatus,
    pub created_at_ms: i64,
}

/// CRM hand-off record for a participant. The pipeline only reads the
/// status; everything else belongs to the administration surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub bot_id: String,
    pub participant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: ClientStatus,
}

/// One inbound or outbound event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    /// Provider-assigned, globally unique. The deduplication key.
    pub external_id: String,
    pub conversation_id: String,
    pub sender: String,
    pub from_me: bool,
    pub content: String,
    pub kind: MessageKind,
    /// Null until delivered to the callback.
    pub forwarded_at_ms: Option<i64>,
    pub processed: bool,
    pub created_at_ms: i64,
}

impl Message {
    #[must_use]
    pub fn is_forwarded(&self) -> bool {
        self.forwarded_at_ms.is_some()
    }
}

/// Input for persisting a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub external_id: String,
    pub conversation_id: String,
    pub sender: String,
    pub from_me: bool,
    pub content: String,
    pub kind: MessageKind,
    /// Pre-set for outbound records that are logged as already delivered.
    pub forwarded_at_ms: Option<i64>,
    pub processed: bool,
}
