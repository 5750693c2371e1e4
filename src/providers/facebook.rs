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

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v21.0";

/// REST client for Facebook Page messaging (Graph API).
pub struct FacebookClient {
    client: Client,
    access_token: String,
    base_url: String,
}

impl FacebookClient {
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
impl ProviderClient for FacebookClient {
    fn provider(&self) -> Provider {
        Provider::Facebook
    }

    async fn verify_credentials(&self) -> UniboxResult<BusinessIdentity> {
        let url = format!("{}/me", self.base_url);
        let body = self.get_json(&url, &[("fields", "id,name")]).await?;
        let id = body.get("id").and_then(Value::as_str).ok_or_else(|| {
            UniboxError::MalformedPayload("credential check response missing id".to_string())
        })?;
        Ok(BusinessIdentity {
            id: id.to_string(),
            name: body.get("name").and_then(Value::as_str).map(str::to_string),
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
            "messaging_type": "RESPONSE",
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
            "facebook send to {} acknowledged (mid {:?})",
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
            .get_json(&url, &[("fields", fields.as_str()), ("limit", limit.as_str())])
            .await?;
        Ok(parse_conversations_page(&body))
    }

    async fn fetch_profile(&self, user_id: &str) -> UniboxResult<ContactProfile> {
        let url = format!("{}/{}", self.base_url, user_id);
        let body = self
            .get_json(&url, &[("fields", "id,name,first_name,last_name,profile_pic")])
            .await?;
        let name = body
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                let first = body.get("first_name").and_then(Value::as_str).unwrap_or("");
                let last = body.get("last_name").and_then(Value::as_str).unwrap_or("");
                let full = format!("{} {}", first, last).trim().to_string();
                (!full.is_empty()).then_some(full)
            })
            .unwrap_or_else(|| user_id.to_string());
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> FacebookClient {
        let settings = ProviderSettings {
            access_token: "test-token".to_string(),
            api_base_url: Some(server.uri()),
            ..Default::default()
        };
        FacebookClient::new(&settings)
    }

    #[tokio::test]
    async fn verify_credentials_parses_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(query_param("access_token", "test-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "page-1", "name": "Demo Page"})),
            )
            .mount(&server)
            .await;

        let identity = test_client(&server).verify_credentials().await.unwrap();
        assert_eq!(identity.id, "page-1");
        assert_eq!(identity.name.as_deref(), Some("Demo Page"));
    }

    #[tokio::test]
    async fn verify_credentials_surfaces_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                json!({"error": {"message": "Invalid OAuth access token", "type": "OAuthException", "code": 190}}),
            ))
            .mount(&server)
            .await;

        let err = test_client(&server).verify_credentials().await.unwrap_err();
        assert!(matches!(err, UniboxError::Auth(_)));
    }

    #[tokio::test]
    async fn send_message_returns_provider_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages"))
            .and(body_partial_json(
                json!({"recipient": {"id": "u-9"}, "message": {"text": "hello"}}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"recipient_id": "u-9", "message_id": "m_AbC123"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let id = test_client(&server)
            .send_message("u-9", "hello")
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("m_AbC123"));
    }

    #[tokio::test]
    async fn send_message_propagates_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({"error": {"message": "No matching user found", "code": 100}}),
            ))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .send_message("nobody", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, UniboxError::Provider { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn fetch_recent_conversations_parses_nested_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/conversations"))
            .and(query_param("limit", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [
                {"id": "t_100", "participants": {"data": [
                    {"name": "Ada", "id": "u-1"},
                    {"name": "Demo Page", "id": "page-1"}
                ]}, "messages": {"data": [
                    {"id": "m1", "message": "hey", "from": {"id": "u-1"}, "created_time": "2024-01-15T10:30:00+0000"},
                    {"id": "m2", "message": "hi back", "from": {"id": "page-1"}, "created_time": "2024-01-15T10:31:00+0000"}
                ]}}
            ]})))
            .mount(&server)
            .await;

        let conversations = test_client(&server)
            .fetch_recent_conversations(25)
            .await
            .unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id, "t_100");
        assert_eq!(conversations[0].participants, vec!["u-1", "page-1"]);
        assert_eq!(conversations[0].messages.len(), 2);
        assert_eq!(conversations[0].messages[0].sender_id, "u-1");
    }

    #[tokio::test]
    async fn fetch_profile_falls_back_to_name_parts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/u-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"id": "u-1", "first_name": "Ada", "last_name": "Lovelace", "profile_pic": "https://cdn.example/ada.jpg"}),
            ))
            .mount(&server)
            .await;

        let profile = test_client(&server).fetch_profile("u-1").await.unwrap();
        assert_eq!(profile.name, "Ada Lovelace");
        assert_eq!(profile.avatar_url.as_deref(), Some("https://cdn.example/ada.jpg"));
    }
}
