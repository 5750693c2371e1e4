use crate::events::inbound::{Attachment, AttachmentKind, EventBody, InboundEvent};
use crate::providers::Provider;
use serde_json::Value;
use tracing::{debug, warn};

/// Timestamps below this are seconds; at or above, already milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Normalize a raw webhook payload into canonical inbound events.
///
/// Total over arbitrary JSON: malformed envelopes and unparseable records are
/// logged and skipped, never propagated as errors. A payload can yield zero
/// events (all records unrecognized) or several (batched entries).
pub fn normalize(provider: Provider, payload: &Value) -> Vec<InboundEvent> {
    let Some(object) = payload.get("object").and_then(Value::as_str) else {
        warn!("{} webhook payload missing object tag, dropping", provider);
        return Vec::new();
    };
    if object != expected_object(provider) {
        warn!(
            "{} webhook payload has object tag '{}', expected '{}', dropping",
            provider,
            object,
            expected_object(provider)
        );
        return Vec::new();
    }
    let Some(entries) = payload.get("entry").and_then(Value::as_array) else {
        warn!("{} webhook payload missing entry array, dropping", provider);
        return Vec::new();
    };

    let mut events = Vec::new();
    for entry in entries {
        let entry_ts = entry.get("time").and_then(Value::as_i64).map(to_millis);
        if let Some(records) = entry.get("messaging").and_then(Value::as_array) {
            for record in records {
                match classify_messaging(record, entry_ts) {
                    Some(event) => events.push(event),
                    None => debug!("{} messaging record not classifiable, skipping", provider),
                }
            }
        }
        if let Some(changes) = entry.get("changes").and_then(Value::as_array) {
            for change in changes {
                if let Some(event) = classify_change(change, entry_ts) {
                    events.push(event);
                }
            }
        }
    }
    events
}

/// Envelope discriminator each provider stamps on its payloads. Facebook
/// pages report as "page", not "facebook".
fn expected_object(provider: Provider) -> &'static str {
    match provider {
        Provider::Instagram => "instagram",
        Provider::Facebook => "page",
    }
}

/// Upscale second-resolution timestamps to milliseconds. Saturates instead
/// of overflowing: webhook bodies are attacker-controlled and may carry any
/// i64.
pub(crate) fn to_millis(ts: i64) -> i64 {
    if ts < MILLIS_THRESHOLD {
        ts.saturating_mul(1000)
    } else {
        ts
    }
}

/// Classify one `messaging` record into a message or echo event.
///
/// Returns `None` for records without the critical fields (sender id,
/// message id) and for non-message records such as delivery receipts.
fn classify_messaging(record: &Value, entry_ts: Option<i64>) -> Option<InboundEvent> {
    let sender_id = record
        .get("sender")
        .and_then(|s| s.get("id"))
        .and_then(Value::as_str)?;
    let message = record.get("message")?;
    let message_id = message.get("mid").and_then(Value::as_str)?;

    let timestamp_ms = record
        .get("timestamp")
        .and_then(Value::as_i64)
        .map(to_millis)
        .or(entry_ts)
        .unwrap_or(0);
    let text = message
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let attachments = webhook_attachments(message.get("attachments"));
    let is_echo = message
        .get("is_echo")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if is_echo {
        // Echo of our own outbound: the conversation belongs to the recipient.
        let recipient_id = record
            .get("recipient")
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)?;
        Some(InboundEvent::Echo(EventBody {
            conversation_id: recipient_id.to_string(),
            sender_id: sender_id.to_string(),
            message_id: message_id.to_string(),
            text,
            attachments,
            timestamp_ms,
        }))
    } else {
        Some(InboundEvent::Message(EventBody {
            conversation_id: sender_id.to_string(),
            sender_id: sender_id.to_string(),
            message_id: message_id.to_string(),
            text,
            attachments,
            timestamp_ms,
        }))
    }
}

/// Classify one `changes` record (comments and mentions feeds).
///
/// The conversation key is the media id when present, so all activity on one
/// post lands in one thread; standalone comments fall back to the comment id.
fn classify_change(change: &Value, entry_ts: Option<i64>) -> Option<InboundEvent> {
    let field = change.get("field").and_then(Value::as_str)?;
    let value = change.get("value")?;
    let sender_id = value
        .get("from")
        .and_then(|f| f.get("id"))
        .and_then(Value::as_str)?;
    let message_id = value
        .get("comment_id")
        .and_then(Value::as_str)
        .or_else(|| value.get("id").and_then(Value::as_str))?;
    let conversation_id = value
        .get("media")
        .and_then(|m| m.get("id"))
        .and_then(Value::as_str)
        .unwrap_or(message_id);
    let timestamp_ms = value
        .get("created_time")
        .and_then(Value::as_i64)
        .map(to_millis)
        .or(entry_ts)
        .unwrap_or(0);
    let body = EventBody {
        conversation_id: conversation_id.to_string(),
        sender_id: sender_id.to_string(),
        message_id: message_id.to_string(),
        text: value
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        attachments: Vec::new(),
        timestamp_ms,
    };

    match field {
        "comments" => Some(InboundEvent::Comment(body)),
        "mentions" => Some(InboundEvent::Mention(body)),
        _ => {
            debug!("unhandled change field '{}', skipping", field);
            None
        }
    }
}

/// Extract webhook attachments, dropping entries without a non-empty URL.
fn webhook_attachments(raw: Option<&Value>) -> Vec<Attachment> {
    let Some(items) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let url = item
                .get("payload")
                .and_then(|p| p.get("url"))
                .and_then(Value::as_str)?;
            if url.is_empty() {
                return None;
            }
            let kind = item
                .get("type")
                .and_then(Value::as_str)
                .map(AttachmentKind::from_provider)
                .unwrap_or(AttachmentKind::File);
            Some(Attachment {
                kind,
                url: url.to_string(),
            })
        })
        .collect()
}
