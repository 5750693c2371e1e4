use serde::{Deserialize, Serialize};

/// Coarse attachment classification. Unrecognized provider types map to `File`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
    Video,
    File,
}

impl AttachmentKind {
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "image" => AttachmentKind::Image,
            "audio" => AttachmentKind::Audio,
            "video" => AttachmentKind::Video,
            _ => AttachmentKind::File,
        }
    }
}

/// A media attachment that resolved to a concrete URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
}

/// Fields shared by every normalized inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBody {
    /// Conversation key: the remote peer for direct messages, the media or
    /// comment id for comment threads.
    pub conversation_id: String,
    pub sender_id: String,
    pub message_id: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// Unix milliseconds. Provider timestamps in seconds are upscaled.
    pub timestamp_ms: i64,
}

/// Canonical event produced by the webhook normalizer.
///
/// `Echo` is the provider's copy of a message our own business account sent;
/// everything else originates from a remote user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InboundEvent {
    Message(EventBody),
    Echo(EventBody),
    Comment(EventBody),
    Mention(EventBody),
}

impl InboundEvent {
    pub fn body(&self) -> &EventBody {
        match self {
            InboundEvent::Message(body)
            | InboundEvent::Echo(body)
            | InboundEvent::Comment(body)
            | InboundEvent::Mention(body) => body,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            InboundEvent::Message(_) => "message",
            InboundEvent::Echo(_) => "echo",
            InboundEvent::Comment(_) => "comment",
            InboundEvent::Mention(_) => "mention",
        }
    }

    pub fn is_echo(&self) -> bool {
        matches!(self, InboundEvent::Echo(_))
    }
}
