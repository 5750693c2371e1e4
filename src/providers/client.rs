use crate::errors::{UniboxError, UniboxResult};
use crate::events::{Attachment, AttachmentKind};
use crate::providers::Provider;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

/// Business-account identity returned by a successful credential check.
#[derive(Debug, Clone)]
pub struct BusinessIdentity {
    pub id: String,
    pub name: Option<String>,
}

/// A user profile as returned by a provider's profile endpoint.
#[derive(Debug, Clone)]
pub struct ContactProfile {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// One message in a conversation page returned by the history endpoint.
#[derive(Debug, Clone)]
pub struct SyncedMessage {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp_ms: i64,
    pub attachments: Vec<Attachment>,
}

/// A conversation with its recent messages, as returned by the history endpoint.
///
/// `id` is the provider's opaque thread id (`t_...` on the Graph APIs), not
/// the peer user id the engine keys conversations by; `participants` carries
/// the user ids needed to recover the peer.
#[derive(Debug, Clone)]
pub struct SyncedConversation {
    pub id: String,
    pub participants: Vec<String>,
    pub messages: Vec<SyncedMessage>,
}

/// REST client for one messaging provider.
///
/// Implementations are stateless beyond credentials and an HTTP client, so a
/// single instance can be shared across the reconciliation loops and the
/// outbound send path.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Validate credentials against the provider and return the business
    /// account identity they belong to.
    async fn verify_credentials(&self) -> UniboxResult<BusinessIdentity>;

    /// Send a text message to a recipient. Returns the provider-assigned
    /// message id when the provider reports one.
    async fn send_message(&self, recipient_id: &str, text: &str)
    -> UniboxResult<Option<String>>;

    /// Fetch recent conversations with their nested messages (catch-up path).
    async fn fetch_recent_conversations(
        &self,
        page_size: usize,
    ) -> UniboxResult<Vec<SyncedConversation>>;

    /// Fetch a user's public profile.
    async fn fetch_profile(&self, user_id: &str) -> UniboxResult<ContactProfile>;
}

/// Map a Graph-style error envelope to a typed error.
///
/// Auth problems (401/403, OAuthException, expired-token code 190) are
/// surfaced as `Auth` so callers never retry them; 5xx and 429 are retryable.
pub(crate) fn graph_error(status: StatusCode, body: &Value) -> UniboxError {
    let err = body.get("error");
    let message = err
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("unknown provider error")
        .to_string();
    let err_type = err
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let code = err.and_then(|e| e.get("code")).and_then(Value::as_i64);

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || err_type == "OAuthException"
        || code == Some(190)
    {
        UniboxError::Auth(message)
    } else {
        UniboxError::Provider {
            message: format!("{} (HTTP {})", message, status.as_u16()),
            retryable: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// Parse a Graph-style timestamp (`2024-01-15T10:30:00+0000`) to unix millis.
///
/// Accepts strict RFC 3339 as well as the colon-less zone offset the Graph
/// APIs actually emit.
pub(crate) fn parse_graph_time(raw: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .or_else(|_| chrono::DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Extract attachments from a history-endpoint message.
///
/// Entries that do not resolve to a non-empty URL are dropped, mirroring the
/// webhook normalizer.
pub(crate) fn sync_attachments(raw: Option<&Value>) -> Vec<Attachment> {
    let Some(items) = raw.and_then(|a| a.get("data")).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let (kind, url) = if let Some(url) = item
                .get("image_data")
                .and_then(|d| d.get("url"))
                .and_then(Value::as_str)
            {
                (AttachmentKind::Image, url)
            } else if let Some(url) = item
                .get("video_data")
                .and_then(|d| d.get("url"))
                .and_then(Value::as_str)
            {
                (AttachmentKind::Video, url)
            } else if let Some(url) = item.get("file_url").and_then(Value::as_str) {
                (AttachmentKind::File, url)
            } else {
                return None;
            };
            if url.is_empty() {
                return None;
            }
            Some(Attachment {
                kind,
                url: url.to_string(),
            })
        })
        .collect()
}

/// Parse a `/me/conversations` response body into typed conversations.
///
/// Tolerant of partial records: conversations without an id and messages
/// without an id or sender are skipped rather than failing the whole page,
/// and a missing `participants` block yields an empty list.
pub(crate) fn parse_conversations_page(body: &Value) -> Vec<SyncedConversation> {
    let Some(data) = body.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for conv in data {
        let Some(conv_id) = conv.get("id").and_then(Value::as_str) else {
            continue;
        };
        let participants: Vec<String> = conv
            .get("participants")
            .and_then(|p| p.get("data"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let mut messages = Vec::new();
        if let Some(items) = conv
            .get("messages")
            .and_then(|m| m.get("data"))
            .and_then(Value::as_array)
        {
            for item in items {
                let Some(id) = item.get("id").and_then(Value::as_str) else {
                    continue;
                };
                let Some(sender_id) = item
                    .get("from")
                    .and_then(|f| f.get("id"))
                    .and_then(Value::as_str)
                else {
                    continue;
                };
                let text = item
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let timestamp_ms = item
                    .get("created_time")
                    .and_then(Value::as_str)
                    .and_then(parse_graph_time)
                    .unwrap_or(0);
                messages.push(SyncedMessage {
                    id: id.to_string(),
                    sender_id: sender_id.to_string(),
                    text,
                    timestamp_ms,
                    attachments: sync_attachments(item.get("attachments")),
                });
            }
        }
        out.push(SyncedConversation {
            id: conv_id.to_string(),
            participants,
            messages,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_graph_time_accepts_rfc3339() {
        let ms = parse_graph_time("2024-01-15T10:30:00+00:00").unwrap();
        assert_eq!(ms, 1_705_314_600_000);
    }

    #[test]
    fn parse_graph_time_accepts_colonless_offset() {
        let ms = parse_graph_time("2024-01-15T10:30:00+0000").unwrap();
        assert_eq!(ms, 1_705_314_600_000);
    }

    #[test]
    fn parse_graph_time_rejects_garbage() {
        assert!(parse_graph_time("not a date").is_none());
        assert!(parse_graph_time("").is_none());
    }

    #[test]
    fn graph_error_maps_oauth_exception_to_auth() {
        let body = json!({"error": {"message": "token expired", "type": "OAuthException", "code": 190}});
        let err = graph_error(StatusCode::BAD_REQUEST, &body);
        assert!(matches!(err, UniboxError::Auth(msg) if msg == "token expired"));
    }

    #[test]
    fn graph_error_maps_401_to_auth() {
        let body = json!({"error": {"message": "bad token"}});
        let err = graph_error(StatusCode::UNAUTHORIZED, &body);
        assert!(matches!(err, UniboxError::Auth(_)));
    }

    #[test]
    fn graph_error_marks_5xx_retryable() {
        let body = json!({"error": {"message": "oops"}});
        let err = graph_error(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert!(err.is_retryable());
    }

    #[test]
    fn graph_error_marks_4xx_permanent() {
        let body = json!({"error": {"message": "no such user", "code": 100}});
        let err = graph_error(StatusCode::BAD_REQUEST, &body);
        assert!(!err.is_retryable());
    }

    #[test]
    fn sync_attachments_classifies_and_filters() {
        let raw = json!({"data": [
            {"image_data": {"url": "https://cdn.example/a.jpg"}},
            {"video_data": {"url": "https://cdn.example/b.mp4"}},
            {"file_url": "https://cdn.example/c.pdf"},
            {"image_data": {"url": ""}},
            {"mime_type": "audio/mp4"}
        ]});
        let attachments = sync_attachments(Some(&raw));
        assert_eq!(attachments.len(), 3);
        assert_eq!(attachments[0].kind, AttachmentKind::Image);
        assert_eq!(attachments[1].kind, AttachmentKind::Video);
        assert_eq!(attachments[2].kind, AttachmentKind::File);
    }

    #[test]
    fn parse_conversations_page_skips_partial_records() {
        let body = json!({"data": [
            {"id": "t_1", "messages": {"data": [
                {"id": "m1", "from": {"id": "u1"}, "message": "hi", "created_time": "2024-01-15T10:30:00+0000"},
                {"id": "m2", "message": "no sender"},
                {"from": {"id": "u1"}, "message": "no id"}
            ]}},
            {"messages": {"data": []}}
        ]});
        let conversations = parse_conversations_page(&body);
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id, "t_1");
        assert_eq!(conversations[0].messages.len(), 1);
        assert_eq!(conversations[0].messages[0].id, "m1");
        assert_eq!(conversations[0].messages[0].timestamp_ms, 1_705_314_600_000);
        // No participants block in this fixture; the list is empty, not an error.
        assert!(conversations[0].participants.is_empty());
    }

    #[test]
    fn parse_conversations_page_collects_participant_ids() {
        let body = json!({"data": [
            {"id": "t_2", "participants": {"data": [
                {"name": "Jane Doe", "id": "u-44"},
                {"name": "Demo Page", "id": "page-1"},
                {"name": "no id here"}
            ]}, "messages": {"data": []}}
        ]});
        let conversations = parse_conversations_page(&body);
        assert_eq!(conversations[0].participants, vec!["u-44", "page-1"]);
    }
}
