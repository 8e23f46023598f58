//! Raw inbound event as emitted by the transport layer.

use {
    courier_common::MessageKind,
    serde::{Deserialize, Serialize},
};

/// One inbound message event, already decoded by the transport.
///
/// `external_id` is the provider-assigned globally unique id; the transport
/// may redeliver the same event after a reconnect, so downstream
/// deduplication keys on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub participant_id: String,
    pub external_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    /// Participant's self-chosen display name.
    #[serde(default)]
    pub push_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_mimetype: Option<String>,
}

impl InboundEvent {
    pub fn text(
        participant_id: impl Into<String>,
        external_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            external_id: external_id.into(),
            kind: MessageKind::Text,
            content: content.into(),
            push_name: String::new(),
            media_base64: None,
            media_mimetype: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_deserializes_wire_shape() {
        let event: InboundEvent = serde_json::from_str(
            r#"{
                "participantId": "521234567890@s.whatsapp.net",
                "externalId": "abc123",
                "type": "PTT",
                "content": "",
                "pushName": "Ana",
                "mediaBase64": "b64",
                "mediaMimetype": "audio/ogg; codecs=opus"
            }"#,
        )
        .unwrap();
        assert_eq!(event.kind, MessageKind::Ptt);
        assert_eq!(event.push_name, "Ana");
        assert_eq!(event.media_mimetype.as_deref(), Some("audio/ogg; codecs=opus"));
    }

    #[test]
    fn test_push_name_defaults_empty() {
        let event: InboundEvent = serde_json::from_str(
            r#"{"participantId": "p", "externalId": "e", "type": "TEXT", "content": "hi"}"#,
        )
        .unwrap();
        assert_eq!(event.push_name, "");
    }
}
