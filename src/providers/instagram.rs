use crate::config::schema::ProviderSettings;
use crate::errors::{UniboxError, UniboxResult};
use crate::providers::Provider;
use crate::providers::client::{
    BusinessIdentity, ContactProfile, ProviderClient, SyncedConversation, graph_error,
    parse_conversations_page,
};
use crate::utils::http::default_http_client;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://graph.instagram.com/v21.0";

/// REST client for Instagram professional-account messaging.
///
/// Same wire conventions as the Facebook Graph API, with Instagram-specific
/// field names (usernames instead of first/last names) and a `platform`
/// discriminator on the conversations endpoint.
pub struct InstagramClient {
    client: Client,
    access_token: String,
    base_url: String,
}

impl InstagramClient {
    pub fn new(config: &ProviderSettings) -> Self {
        Self {
            client: default_http_client(),
            access_token: config.access_token.clone(),
            base_url: config
                .api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> UniboxResult<Value> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .query(&[("access_token", self.access_token.as_str())])
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            return Err(graph_error(status, &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl ProviderClient for InstagramClient {
    fn provider(&self) -> Provider {
        Provider::Instagram
    }

    async fn verify_credentials(&self) -> UniboxResult<BusinessIdentity> {
        let url = format!("{}/me", self.base_url);
        let body = self.get_json(&url, &[("fields", "id,username")]).await?;
        let id = body.get("id").and_then(Value::as_str).ok_or_else(|| {
            UniboxError::MalformedPayload("credential check response missing id".to_string())
        })?;
        Ok(BusinessIdentity {
            id: id.to_string(),
            name: body
                .get("username")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn send_message(
        &self,
        recipient_id: &str,
        text: &str,
    ) -> UniboxResult<Option<String>> {
        let url = format!("{}/me/messages", self.base_url);
        let payload = serde_json::json!({
            "recipient": {"id": recipient_id},
            "message": {"text": text},
        });
        let resp = self
            .client
            .post(&url)
            .query(&[("access_token", self.access_token.as_str())])
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            return Err(graph_error(status, &body));
        }
        let message_id = body
            .get("message_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        debug!(
            "instagram send to {} acknowledged (mid {:?})",
            recipient_id, message_id
        );
        Ok(message_id)
    }

    async fn fetch_recent_conversations(
        &self,
        page_size: usize,
    ) -> UniboxResult<Vec<SyncedConversation>> {
        let url = format!("{}/me/conversations", self.base_url);
        let fields = format!(
            "id,participants,messages.limit({}){{id,message,from,created_time,attachments}}",
            page_size
        );
        let limit = page_size.to_string();
        let body = self
            .get_json(
                &url,
                &[
                    ("platform", "instagram"),
                    ("fields", fields.as_str()),
                    ("limit", limit.as_str()),
                ],
            )
            .await?;
        Ok(parse_conversations_page(&body))
    }

    async fn fetch_profile(&self, user_id: &str) -> UniboxResult<ContactProfile> {
        let url = format!("{}/{}", self.base_url, user_id);
        let body = self
            .get_json(&url, &[("fields", "id,name,username,profile_pic")])
            .await?;
        let name = body
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| body.get("username").and_then(Value::as_str))
            .unwrap_or(user_id)
            .to_string();
        Ok(ContactProfile {
            id: body
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or(user_id)
                .to_string(),
            name,
            avatar_url: body
                .get("profile_pic")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}
