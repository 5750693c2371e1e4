// Shared test helpers — not all items used by every test binary.
#![allow(unused)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use unibox::config::Config;
use unibox::errors::{UniboxError, UniboxResult};
use unibox::providers::{
    BusinessIdentity, ContactProfile, Provider, ProviderClient, SyncedConversation, SyncedMessage,
};

/// What the next send call should do.
pub enum SendScript {
    /// Succeed and return this provider-assigned message id.
    Id(String),
    /// Succeed without a message id (forces a provisional local id).
    NoId,
    /// Fail with a non-retryable provider error.
    Fail,
}

/// What the next sync poll should return.
pub enum SyncStep {
    Batch(Vec<SyncedConversation>),
    Fail,
}

/// Scripted provider client.
///
/// Sync polls consume `sync_steps` in order and return empty pages once the
/// script runs out. Sends follow `send_script`. Every call is counted so
/// tests can assert on loop behavior.
pub struct MockProviderClient {
    provider: Provider,
    pub business_id: String,
    fail_verify: bool,
    verify_delay_ms: u64,
    send_delay_ms: u64,
    profile_delay_ms: u64,
    send_script: Mutex<SendScript>,
    sync_steps: Mutex<VecDeque<SyncStep>>,
    profiles: Mutex<HashMap<String, ContactProfile>>,
    pub send_calls: AtomicUsize,
    pub sync_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
}

impl MockProviderClient {
    pub fn new(provider: Provider, business_id: &str) -> Self {
        Self {
            provider,
            business_id: business_id.to_string(),
            fail_verify: false,
            verify_delay_ms: 0,
            send_delay_ms: 0,
            profile_delay_ms: 0,
            send_script: Mutex::new(SendScript::NoId),
            sync_steps: Mutex::new(VecDeque::new()),
            profiles: Mutex::new(HashMap::new()),
            send_calls: AtomicUsize::new(0),
            sync_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_verification(provider: Provider) -> Self {
        let mut mock = Self::new(provider, "unused");
        mock.fail_verify = true;
        mock
    }

    pub fn with_send(self, script: SendScript) -> Self {
        *self.send_script.lock().unwrap() = script;
        self
    }

    pub fn with_sync_steps(self, steps: Vec<SyncStep>) -> Self {
        *self.sync_steps.lock().unwrap() = VecDeque::from(steps);
        self
    }

    pub fn with_profile(self, user_id: &str, name: &str) -> Self {
        self.profiles.lock().unwrap().insert(
            user_id.to_string(),
            ContactProfile {
                id: user_id.to_string(),
                name: name.to_string(),
                avatar_url: None,
            },
        );
        self
    }

    pub fn with_verify_delay(mut self, ms: u64) -> Self {
        self.verify_delay_ms = ms;
        self
    }

    pub fn with_send_delay(mut self, ms: u64) -> Self {
        self.send_delay_ms = ms;
        self
    }

    pub fn with_profile_delay(mut self, ms: u64) -> Self {
        self.profile_delay_ms = ms;
        self
    }
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn verify_credentials(&self) -> UniboxResult<BusinessIdentity> {
        pause(self.verify_delay_ms).await;
        if self.fail_verify {
            return Err(UniboxError::Auth("invalid access token".to_string()));
        }
        Ok(BusinessIdentity {
            id: self.business_id.clone(),
            name: Some("Test Business".to_string()),
        })
    }

    async fn send_message(&self, _recipient_id: &str, _text: &str) -> UniboxResult<Option<String>> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        pause(self.send_delay_ms).await;
        match &*self.send_script.lock().unwrap() {
            SendScript::Id(id) => Ok(Some(id.clone())),
            SendScript::NoId => Ok(None),
            SendScript::Fail => Err(UniboxError::Provider {
                message: "send rejected".to_string(),
                retryable: false,
            }),
        }
    }

    async fn fetch_recent_conversations(
        &self,
        _page_size: usize,
    ) -> UniboxResult<Vec<SyncedConversation>> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        match self.sync_steps.lock().unwrap().pop_front() {
            Some(SyncStep::Batch(batch)) => Ok(batch),
            Some(SyncStep::Fail) => Err(UniboxError::Provider {
                message: "temporary outage".to_string(),
                retryable: true,
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_profile(&self, user_id: &str) -> UniboxResult<ContactProfile> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        pause(self.profile_delay_ms).await;
        self.profiles
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| UniboxError::Provider {
                message: format!("no profile for {}", user_id),
                retryable: false,
            })
    }
}

// --- Fixture builders ---

pub fn synced_message(id: &str, sender_id: &str, text: &str, timestamp_ms: i64) -> SyncedMessage {
    SyncedMessage {
        id: id.to_string(),
        sender_id: sender_id.to_string(),
        text: text.to_string(),
        timestamp_ms,
        attachments: vec![],
    }
}

/// A history-endpoint conversation: opaque thread id plus participant user
/// ids, the way the Graph APIs shape them.
pub fn synced_conversation(
    thread_id: &str,
    participants: &[&str],
    messages: Vec<SyncedMessage>,
) -> SyncedConversation {
    SyncedConversation {
        id: thread_id.to_string(),
        participants: participants.iter().map(|p| (*p).to_string()).collect(),
        messages,
    }
}

/// Config with both providers enabled and loop intervals short enough for
/// tests: 10ms relay drains, 1s sync polls.
pub fn test_config() -> Config {
    let mut config = Config::default();
    for settings in [
        &mut config.providers.instagram,
        &mut config.providers.facebook,
    ] {
        settings.enabled = true;
        settings.access_token = "test-token".to_string();
        settings.relay_drain_interval_ms = 10;
        settings.sync_poll_interval_secs = 1;
    }
    config
}

/// A Facebook messaging webhook payload with a single inbound message.
pub fn fb_message_payload(sender_id: &str, mid: &str, text: &str, ts_ms: i64) -> serde_json::Value {
    serde_json::json!({
        "object": "page",
        "entry": [{
            "id": "page-1",
            "time": ts_ms,
            "messaging": [{
                "sender": {"id": sender_id},
                "recipient": {"id": "page-1"},
                "timestamp": ts_ms,
                "message": {"mid": mid, "text": text}
            }]
        }]
    })
}

/// A Facebook echo payload for a message the business sent.
pub fn fb_echo_payload(
    business_id: &str,
    recipient_id: &str,
    mid: &str,
    text: &str,
    ts_ms: i64,
) -> serde_json::Value {
    serde_json::json!({
        "object": "page",
        "entry": [{
            "id": business_id,
            "time": ts_ms,
            "messaging": [{
                "sender": {"id": business_id},
                "recipient": {"id": recipient_id},
                "timestamp": ts_ms,
                "message": {"mid": mid, "text": text, "is_echo": true}
            }]
        }]
    })
}

/// Poll `check` every 10ms until it passes or the timeout lapses.
pub async fn wait_until(mut check: impl FnMut() -> bool, timeout_ms: u64) -> bool {
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }
    check()
}
