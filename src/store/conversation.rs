use crate::events::{Attachment, EventBody};
use crate::providers::Provider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One message in a conversation timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub timestamp_ms: i64,
    /// True when the business account (our side) authored the message.
    pub is_from_business: bool,
}

impl Message {
    /// Build a message from a normalized webhook event body.
    pub fn from_event(body: EventBody, is_from_business: bool) -> Self {
        Self {
            id: body.message_id,
            conversation_id: body.conversation_id,
            sender_id: body.sender_id,
            text: body.text,
            attachments: body.attachments,
            timestamp_ms: body.timestamp_ms,
            is_from_business,
        }
    }
}

/// Conversation summary derived from its timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub provider: Provider,
    pub participants: BTreeSet<String>,
    /// Text of the most recent message, if any.
    pub last_message: Option<String>,
    /// Timestamp of the most recent message.
    pub updated_at_ms: Option<i64>,
}

/// Result of merging one message into the store.
///
/// `Duplicate` is a normal outcome, not an error: the relay and sync paths
/// routinely race to deliver the same message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Duplicate,
}

impl MergeOutcome {
    pub fn is_inserted(self) -> bool {
        matches!(self, MergeOutcome::Inserted)
    }
}
