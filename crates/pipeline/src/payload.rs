//! Delivery payload shapes posted to tenant callbacks.

use {
    courier_common::MessageKind,
    serde::{Deserialize, Serialize},
};

/// Job name for an immediate single-message forward.
pub const FORWARD_SINGLE: &str = "forward_single";
/// Job name for a consolidated batch forward.
pub const FORWARD_BATCH: &str = "forward_batch";

/// Payload for one forwarded message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForwardPayload {
    pub bot_id: String,
    pub bot_name: String,
    pub api_key: String,
    /// Conversation id.
    pub session_id: String,
    pub message_id: String,
    pub from: String,
    pub push_name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// ISO-8601.
    pub timestamp: String,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new_contact: Option<bool>,
}

/// One entry inside a batch payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchMessage {
    pub message_id: String,
    pub push_name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: String,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_mimetype: Option<String>,
}

impl From<&ForwardPayload> for BatchMessage {
    fn from(p: &ForwardPayload) -> Self {
        Self {
            message_id: p.message_id.clone(),
            push_name: p.push_name.clone(),
            content: p.content.clone(),
            kind: p.kind,
            timestamp: p.timestamp.clone(),
            external_id: p.external_id.clone(),
            media_base64: p.media_base64.clone(),
            media_mimetype: p.media_mimetype.clone(),
        }
    }
}

/// Buffer metadata, overwritten on every `add` (last writer wins; stable
/// within a burst).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchMeta {
    pub bot_name: String,
    pub session_id: String,
    pub api_key: String,
    #[serde(default)]
    pub is_new_contact: bool,
}

/// Consolidated payload for one flushed conversation buffer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchPayload {
    pub bot_id: String,
    pub bot_name: String,
    pub api_key: String,
    pub from: String,
    pub session_id: String,
    /// Always the literal `"BATCH"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub message_count: usize,
    pub messages: Vec<BatchMessage>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new_contact: Option<bool>,
}

impl BatchPayload {
    pub fn new(
        bot_id: impl Into<String>,
        participant_id: impl Into<String>,
        meta: BatchMeta,
        messages: Vec<BatchMessage>,
    ) -> Self {
        Self {
            bot_id: bot_id.into(),
            bot_name: meta.bot_name,
            api_key: meta.api_key,
            from: participant_id.into(),
            session_id: meta.session_id,
            kind: "BATCH".into(),
            message_count: messages.len(),
            messages,
            timestamp: chrono::Utc::now().to_rfc3339(),
            is_new_contact: Some(meta.is_new_contact),
        }
    }
}
