//! Core message vocabulary shared by the store, pipeline, and transport.

use serde::{Deserialize, Serialize};

/// Kind of an inbound or outbound message.
///
/// Closed set: a payload carrying anything else is a rejected-input error,
/// never a silent default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    /// Push-to-talk voice note.
    Ptt,
    Video,
    Document,
}

impl MessageKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::Audio => "AUDIO",
            Self::Ptt => "PTT",
            Self::Video => "VIDEO",
            Self::Document => "DOCUMENT",
        }
    }

    /// Parse a kind from user input, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TEXT" => Some(Self::Text),
            "IMAGE" => Some(Self::Image),
            "AUDIO" => Some(Self::Audio),
            "PTT" => Some(Self::Ptt),
            "VIDEO" => Some(Self::Video),
            "DOCUMENT" => Some(Self::Document),
            _ => None,
        }
    }

    /// Whether this kind carries a media reference.
    #[must_use]
    pub fn is_media(&self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connectivity status of a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversationStatus {
    #[default]
    Connected,
    Disconnected,
}

impl ConversationStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONNECTED" => Some(Self::Connected),
            "DISCONNECTED" => Some(Self::Disconnected),
            _ => None,
        }
    }
}

/// CRM hand-off status of a participant's client record.
///
/// `Ready` and `Attended` mean a human owns the conversation; the pipeline
/// persists inbound messages for such participants but never forwards them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClientStatus {
    #[default]
    Pending,
    Ready,
    Attended,
}

impl ClientStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Ready => "READY",
            Self::Attended => "ATTENDED",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "READY" => Some(Self::Ready),
            "ATTENDED" => Some(Self::Attended),
            _ => None,
        }
    }

    /// True when a human has taken over the conversation.
    #[must_use]
    pub fn human_attended(&self) -> bool {
        matches!(self, Self::Ready | Self::Attended)
    }
}

impl std::fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
