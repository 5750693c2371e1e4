pub(crate) mod pending;
pub(crate) mod reconcile;

use crate::config::Config;
use crate::errors::{UniboxError, UniboxResult};
use crate::identity::{Contact, IdentityCache};
use crate::providers::Provider;
use crate::providers::client::ProviderClient;
use crate::providers::facebook::FacebookClient;
use crate::providers::instagram::InstagramClient;
use crate::relay::RelayBuffer;
use crate::store::{Conversation, ConversationStore, Message};
use chrono::Utc;
use pending::PendingSends;
use reconcile::LoopContext;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};
use uuid::Uuid;

/// Per-provider connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Receipt returned by a successful send.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message_id: String,
    pub conversation_id: String,
    /// True when the id is locally generated and awaiting reconciliation.
    pub provisional: bool,
}

struct Connection {
    client: Arc<dyn ProviderClient>,
    business_id: String,
    /// Engine-wide counter value issued at connect. A path that snapshots
    /// state before an await compares epochs afterwards to detect that the
    /// connection it started under has been torn down.
    epoch: u64,
    running: Arc<tokio::sync::Mutex<bool>>,
    relay_handle: JoinHandle<()>,
    poll_handle: JoinHandle<()>,
    resolvers: Arc<tokio::sync::Mutex<JoinSet<()>>>,
}

/// Cross-provider synchronization engine.
///
/// Owns the conversation store, identity cache and relay buffer, and runs the
/// two reconciliation sub-loops per connected provider. All read paths
/// (`list_conversations`, `get_messages`) execute on the caller's task and
/// never wait on reconciliation.
pub struct SyncEngine {
    config: Config,
    store: Arc<ConversationStore>,
    identity: Arc<IdentityCache>,
    relay: Arc<RelayBuffer>,
    pending: Arc<PendingSends>,
    connections: tokio::sync::Mutex<HashMap<Provider, Connection>>,
    states: std::sync::Mutex<HashMap<Provider, ConnectionState>>,
    epoch: AtomicU64,
}

impl SyncEngine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: Arc::new(ConversationStore::new()),
            identity: Arc::new(IdentityCache::new()),
            relay: Arc::new(RelayBuffer::new()),
            pending: Arc::new(PendingSends::new()),
            connections: tokio::sync::Mutex::new(HashMap::new()),
            states: std::sync::Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
        }
    }

    /// The relay buffer the webhook gateway feeds.
    pub fn relay(&self) -> Arc<RelayBuffer> {
        self.relay.clone()
    }

    pub fn connection_state(&self, provider: Provider) -> ConnectionState {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&provider)
            .copied()
            .unwrap_or(ConnectionState::Disconnected)
    }

    fn set_state(&self, provider: Provider, state: ConnectionState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider, state);
    }

    /// Connect a provider using the configured credentials.
    pub async fn connect(&self, provider: Provider) -> UniboxResult<()> {
        let settings = self.config.providers.get(provider);
        settings.require_credentials(provider)?;
        let client: Arc<dyn ProviderClient> = match provider {
            Provider::Instagram => Arc::new(InstagramClient::new(settings)),
            Provider::Facebook => Arc::new(FacebookClient::new(settings)),
        };
        self.connect_with_client(client).await
    }

    /// Connect with a caller-supplied client; the target provider comes from
    /// the client itself. Verifies credentials, then starts the relay-drain
    /// and sync-poll tasks. Connecting an already connected provider is a
    /// no-op.
    pub async fn connect_with_client(&self, client: Arc<dyn ProviderClient>) -> UniboxResult<()> {
        let provider = client.provider();
        if self.connections.lock().await.contains_key(&provider) {
            debug!("{} already connected, ignoring connect", provider);
            return Ok(());
        }
        self.set_state(provider, ConnectionState::Connecting);

        // Verify outside the connections lock: the round trip would otherwise
        // stall sends and disconnects on every provider.
        let identity = match client.verify_credentials().await {
            Ok(identity) => identity,
            Err(e) => {
                self.set_state(provider, ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let mut connections = self.connections.lock().await;
        if connections.contains_key(&provider) {
            debug!("{} connected concurrently, ignoring connect", provider);
            self.set_state(provider, ConnectionState::Connected);
            return Ok(());
        }

        let settings = self.config.providers.get(provider);
        let running = Arc::new(tokio::sync::Mutex::new(true));
        let resolvers = Arc::new(tokio::sync::Mutex::new(JoinSet::new()));
        let ctx = LoopContext {
            provider,
            client: client.clone(),
            business_id: identity.id.clone(),
            store: self.store.clone(),
            identity: self.identity.clone(),
            relay: self.relay.clone(),
            pending: self.pending.clone(),
            echo_seen: Arc::new(std::sync::Mutex::new(HashSet::new())),
            resolvers: resolvers.clone(),
            running: running.clone(),
        };
        let relay_handle =
            reconcile::spawn_relay_drain(ctx.clone(), settings.relay_drain_interval_ms);
        let poll_handle = reconcile::spawn_sync_poll(
            ctx,
            settings.sync_poll_interval_secs,
            settings.sync_page_size,
        );

        connections.insert(
            provider,
            Connection {
                client,
                business_id: identity.id.clone(),
                epoch: self.epoch.fetch_add(1, Ordering::SeqCst),
                running,
                relay_handle,
                poll_handle,
                resolvers,
            },
        );
        self.set_state(provider, ConnectionState::Connected);
        info!(
            "{} connected as {} ({})",
            provider,
            identity.name.as_deref().unwrap_or("unnamed"),
            identity.id
        );
        Ok(())
    }

    /// Disconnect a provider: stop both sub-loops, then clear every piece of
    /// local state it owned. Disconnecting an unconnected provider is a no-op.
    pub async fn disconnect(&self, provider: Provider) {
        let Some(connection) = self.connections.lock().await.remove(&provider) else {
            debug!("{} not connected, ignoring disconnect", provider);
            return;
        };
        // Loops and resolver tasks must be fully stopped before state is
        // cleared so a late in-flight cycle cannot merge into (or resurrect)
        // cleared state.
        *connection.running.lock().await = false;
        connection.relay_handle.abort();
        connection.poll_handle.abort();
        let _ = connection.relay_handle.await;
        let _ = connection.poll_handle.await;
        connection.resolvers.lock().await.shutdown().await;

        self.relay.clear(provider);
        self.pending.clear(provider);
        self.store.clear(provider);
        self.identity.clear(provider).await;
        self.set_state(provider, ConnectionState::Disconnected);
        info!("{} disconnected, local state cleared", provider);
    }

    /// Send a text message and optimistically merge it into the store.
    ///
    /// The provider call comes first: a failed send returns the failure and
    /// leaves the store untouched. On success the sent message is visible via
    /// `get_messages` immediately, before any reconciliation cycle runs.
    pub async fn send(
        &self,
        provider: Provider,
        recipient_id: &str,
        text: &str,
    ) -> UniboxResult<SendReceipt> {
        let (client, business_id, epoch) = {
            let connections = self.connections.lock().await;
            let connection = connections
                .get(&provider)
                .ok_or_else(|| UniboxError::Config(format!("{} is not connected", provider)))?;
            (
                connection.client.clone(),
                connection.business_id.clone(),
                connection.epoch,
            )
        };

        let provider_id = client.send_message(recipient_id, text).await?;

        let now_ms = Utc::now().timestamp_millis();
        let (message_id, provisional) = match provider_id {
            Some(id) => (id, false),
            None => (format!("local-{}", Uuid::new_v4()), true),
        };
        let message = Message {
            id: message_id.clone(),
            conversation_id: recipient_id.to_string(),
            sender_id: business_id,
            text: text.to_string(),
            attachments: Vec::new(),
            timestamp_ms: now_ms,
            is_from_business: true,
        };
        // Merge under the connections lock, re-checking the epoch: a
        // disconnect that ran while the provider call was in flight has
        // already cleared local state, and the cleared store must stay empty.
        let connections = self.connections.lock().await;
        if connections.get(&provider).is_some_and(|c| c.epoch == epoch) {
            if provisional {
                self.pending
                    .record(provider, recipient_id, text, &message_id, now_ms);
            }
            self.store.merge(provider, recipient_id, message);
            info!("{} sent message {} to {}", provider, message_id, recipient_id);
        } else {
            debug!(
                "{} send of {} landed after disconnect, skipping local merge",
                provider, message_id
            );
        }
        Ok(SendReceipt {
            message_id,
            conversation_id: recipient_id.to_string(),
            provisional,
        })
    }

    /// Contact lookup: cached value if present, provider fetch when the
    /// connection is active, placeholder otherwise.
    pub async fn resolve_contact(&self, provider: Provider, user_id: &str) -> Contact {
        if let Some(contact) = self.identity.cached(provider, user_id).await {
            return contact;
        }
        let client = {
            let connections = self.connections.lock().await;
            connections.get(&provider).map(|c| c.client.clone())
        };
        match client {
            Some(client) => {
                self.identity
                    .resolve(provider, user_id, client.as_ref())
                    .await
            }
            None => Contact::placeholder(provider, user_id),
        }
    }

    pub fn list_conversations(&self, provider: Provider) -> Vec<Conversation> {
        self.store.list_conversations(provider)
    }

    pub fn get_messages(&self, provider: Provider, conversation_id: &str) -> Vec<Message> {
        self.store.get_messages(provider, conversation_id)
    }
}
