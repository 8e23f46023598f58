//! Outbound send requests and their transport wire payloads.

use {
    courier_common::MessageKind,
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// Default address domain for bare participant identifiers.
const DEFAULT_ADDRESS_DOMAIN: &str = "s.whatsapp.net";

/// Normalize a recipient identifier: bare numbers get the default domain,
/// fully-qualified addresses pass through unchanged.
#[must_use]
pub fn normalize_address(to: &str) -> String {
    if to.contains('@') {
        to.to_string()
    } else {
        format!("{to}@{DEFAULT_ADDRESS_DOMAIN}")
    }
}

/// Send request as issued by the automation backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub bot_id: String,
    pub to: String,
    /// Message kind, case-insensitive. Unknown values are rejected.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("unsupported message type: {value}")]
    UnsupportedKind { value: String },

    #[error("mediaUrl is required for {kind} type")]
    MissingMedia { kind: MessageKind },
}

/// Reference to hosted media the transport fetches itself.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MediaRef {
    pub url: String,
}

/// Transport-specific send payload, one shape per message kind.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum SendPayload {
    Text {
        text: String,
    },
    Image {
        image: MediaRef,
        caption: String,
    },
    Audio {
        audio: MediaRef,
        ptt: bool,
    },
    Video {
        video: MediaRef,
        caption: String,
    },
    Document {
        document: MediaRef,
        #[serde(rename = "fileName")]
        file_name: String,
    },
}

impl SendPayload {
    /// Map a send request to its wire payload. Exhaustive over
    /// [`MessageKind`]; anything else is a rejected-input error.
    pub fn from_request(request: &SendRequest) -> Result<(MessageKind, Self), SendError> {
        let kind = MessageKind::parse(&request.kind).ok_or_else(|| SendError::UnsupportedKind {
            value: request.kind.clone(),
        })?;

        let media = |kind: MessageKind| {
            request
                .media_url
                .clone()
                .map(|url| MediaRef { url })
                .ok_or(SendError::MissingMedia { kind })
        };
        let caption_or_content = || {
            request
                .caption
                .clone()
                .or_else(|| request.content.clone())
                .unwrap_or_default()
        };

        let payload = match kind {
            MessageKind::Text => Self::Text {
                text: request.content.clone().unwrap_or_default(),
            },
            MessageKind::Image => Self::Image {
                image: media(kind)?,
                caption: caption_or_content(),
            },
            MessageKind::Audio => Self::Audio {
                audio: media(kind)?,
                ptt: false,
            },
            MessageKind::Ptt => Self::Audio {
                audio: media(kind)?,
                ptt: true,
            },
            MessageKind::Video => Self::Video {
                video: media(kind)?,
                caption: caption_or_content(),
            },
            MessageKind::Document => Self::Document {
                document: media(kind)?,
                file_name: request.caption.clone().unwrap_or_else(|| "document".into()),
            },
        };
        Ok((kind, payload))
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn request(kind: &str) -> SendRequest {
        SendRequest {
            bot_id: "b1".into(),
            to: "521234567890".into(),
            kind: kind.into(),
            content: Some("hola".into()),
            media_url: Some("https://files.example/x.ogg".into()),
            caption: None,
        }
    }

    #[rstest]
    #[case("52123", "52123@s.whatsapp.net")]
    #[case("52123@s.whatsapp.net", "52123@s.whatsapp.net")]
    #[case("52123@g.us", "52123@g.us")]
    fn test_normalize_address(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_address(input), expected);
    }

    #[test]
    fn test_text_payload() {
        let (kind, payload) = SendPayload::from_request(&request("text")).unwrap();
        assert_eq!(kind, MessageKind::Text);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({"text": "hola"})
        );
    }

    #[test]
    fn test_ptt_sets_voice_note_flag() {
        let (_, payload) = SendPayload::from_request(&request("PTT")).unwrap();
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({"audio": {"url": "https://files.example/x.ogg"}, "ptt": true})
        );
    }

    #[test]
    fn test_document_file_name_from_caption() {
        let mut req = request("document");
        req.caption = Some("invoice.pdf".into());
        let (_, payload) = SendPayload::from_request(&req).unwrap();
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({"document": {"url": "https://files.example/x.ogg"}, "fileName": "invoice.pdf"})
        );
    }

    #[test]
    fn test_caption_falls_back_to_content() {
        let (_, payload) = SendPayload::from_request(&request("image")).unwrap();
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({"image": {"url": "https://files.example/x.ogg"}, "caption": "hola"})
        );
    }

    #[test]
    fn test_media_required() {
        let mut req = request("video");
        req.media_url = None;
        assert_eq!(
            SendPayload::from_request(&req),
            Err(SendError::MissingMedia {
                kind: MessageKind::Video
            })
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let req = request("sticker");
        assert_eq!(
            SendPayload::from_request(&req),
            Err(SendError::UnsupportedKind {
                value: "sticker".into()
            })
        );
    }
}
