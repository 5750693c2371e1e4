//! The two reconciliation sub-loops that run per connected provider.
//!
//! The relay drain is cheap (local buffer) and runs on a sub-second to
//! low-single-digit-second tick; the sync poll is an external round trip and
//! runs coarser. They are independent tasks feeding the same merge path, so a
//! slow or failing poll never stalls webhook delivery.

use crate::engine::pending::PendingSends;
use crate::events::{InboundEvent, normalize};
use crate::identity::IdentityCache;
use crate::providers::Provider;
use crate::providers::client::{ProviderClient, SyncedConversation};
use crate::relay::RelayBuffer;
use crate::store::{ConversationStore, MergeOutcome, Message};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

/// Bound on remembered echo ids before the set is reset.
const MAX_SEEN_ECHOES: usize = 1000;

/// Shared handles each reconciliation task owns.
#[derive(Clone)]
pub(crate) struct LoopContext {
    pub provider: Provider,
    pub client: Arc<dyn ProviderClient>,
    pub business_id: String,
    pub store: Arc<ConversationStore>,
    pub identity: Arc<IdentityCache>,
    pub relay: Arc<RelayBuffer>,
    pub pending: Arc<PendingSends>,
    /// Ids of outbound echoes observed on the relay path. Purely an
    /// optimization for classifying sync-poll duplicates; the store's id
    /// dedup is the source of truth.
    pub echo_seen: Arc<Mutex<HashSet<String>>>,
    /// Detached profile-resolution tasks, aborted as a group on disconnect.
    pub resolvers: Arc<tokio::sync::Mutex<JoinSet<()>>>,
    pub running: Arc<tokio::sync::Mutex<bool>>,
}

pub(crate) fn spawn_relay_drain(ctx: LoopContext, interval_ms: u64) -> JoinHandle<()> {
    let interval = interval_ms.max(1);
    tokio::spawn(async move {
        loop {
            if !*ctx.running.lock().await {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(interval)).await;
            if !*ctx.running.lock().await {
                break;
            }
            drain_relay_once(&ctx).await;
        }
        debug!("{} relay drain loop stopped", ctx.provider);
    })
}

pub(crate) fn spawn_sync_poll(ctx: LoopContext, interval_secs: u64, page_size: usize) -> JoinHandle<()> {
    let interval = interval_secs.max(1);
    tokio::spawn(async move {
        // First poll runs immediately so a fresh connection backfills history.
        loop {
            if !*ctx.running.lock().await {
                break;
            }
            sync_poll_once(&ctx, page_size).await;
            tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
        }
        debug!("{} sync poll loop stopped", ctx.provider);
    })
}

/// One relay-drain cycle: take everything buffered, normalize, merge.
///
/// Echo events are never merged here — the optimistic send path already
/// stored our own messages. They feed temp-id reconciliation and the
/// echo-seen set instead.
pub(crate) async fn drain_relay_once(ctx: &LoopContext) {
    let payloads = ctx.relay.drain(ctx.provider);
    if payloads.is_empty() {
        return;
    }
    let mut new_senders: HashSet<String> = HashSet::new();
    let mut inserted = 0usize;
    for payload in &payloads {
        for event in normalize(ctx.provider, payload) {
            match event {
                InboundEvent::Echo(body) => {
                    if let Some(temp_id) = ctx.pending.take_match(
                        ctx.provider,
                        &body.conversation_id,
                        &body.text,
                        body.timestamp_ms,
                    ) && ctx.store.replace_message_id(
                        ctx.provider,
                        &body.conversation_id,
                        &temp_id,
                        &body.message_id,
                    ) {
                        debug!(
                            "{} reconciled provisional id {} -> {}",
                            ctx.provider, temp_id, body.message_id
                        );
                    }
                    remember_echo(ctx, &body.message_id);
                }
                InboundEvent::Message(body)
                | InboundEvent::Comment(body)
                | InboundEvent::Mention(body) => {
                    let sender_id = body.sender_id.clone();
                    let conversation_id = body.conversation_id.clone();
                    let outcome = ctx.store.merge(
                        ctx.provider,
                        &conversation_id,
                        Message::from_event(body, false),
                    );
                    if outcome.is_inserted() {
                        inserted += 1;
                        new_senders.insert(sender_id);
                    }
                }
            }
        }
    }
    if inserted > 0 {
        debug!(
            "{} relay drain merged {} new of {} payloads",
            ctx.provider,
            inserted,
            payloads.len()
        );
    }
    schedule_profile_resolution(ctx, new_senders).await;
}

/// One sync-poll cycle. A failed call is logged and retried on the next
/// tick; a poll that lands after disconnect applies nothing.
pub(crate) async fn sync_poll_once(ctx: &LoopContext, page_size: usize) {
    match ctx.client.fetch_recent_conversations(page_size).await {
        Ok(conversations) => {
            if !*ctx.running.lock().await {
                debug!("{} sync poll landed after disconnect, discarding", ctx.provider);
                return;
            }
            let new_senders = apply_sync_page(ctx, conversations);
            schedule_profile_resolution(ctx, new_senders).await;
        }
        Err(e) => {
            warn!("{} sync poll failed, retrying next tick: {}", ctx.provider, e);
        }
    }
}

/// Merge a page of synced conversations. Everything is merged, including
/// messages already seen as echoes — the store's duplicate detection decides.
/// Returns the senders of newly inserted remote messages.
///
/// The history endpoint keys conversations by an opaque thread id while the
/// webhook path keys them by the peer user id. Merging under the non-business
/// participant keeps both paths in one timeline, so a message delivered on
/// both channels dedups instead of landing twice under different keys.
pub(crate) fn apply_sync_page(
    ctx: &LoopContext,
    conversations: Vec<SyncedConversation>,
) -> HashSet<String> {
    let mut new_senders = HashSet::new();
    let mut inserted = 0usize;
    let mut duplicates = 0usize;
    let mut echo_confirmed = 0usize;
    for conversation in conversations {
        let conversation_key = conversation
            .participants
            .iter()
            .find(|id| id.as_str() != ctx.business_id)
            .cloned()
            .unwrap_or_else(|| conversation.id.clone());
        for message in conversation.messages {
            let from_business = message.sender_id == ctx.business_id;
            // Our own message coming back through the poll may be the real
            // copy of an optimistic send whose echo never arrived.
            if from_business
                && let Some(temp_id) = ctx.pending.take_match(
                    ctx.provider,
                    &conversation_key,
                    &message.text,
                    message.timestamp_ms,
                )
                && ctx.store.replace_message_id(
                    ctx.provider,
                    &conversation_key,
                    &temp_id,
                    &message.id,
                )
            {
                debug!(
                    "{} reconciled provisional id {} -> {} via sync",
                    ctx.provider, temp_id, message.id
                );
            }
            let sender_id = message.sender_id.clone();
            let record = Message {
                id: message.id,
                conversation_id: conversation_key.clone(),
                sender_id: message.sender_id,
                text: message.text,
                attachments: message.attachments,
                timestamp_ms: message.timestamp_ms,
                is_from_business: from_business,
            };
            let id_for_log = record.id.clone();
            match ctx.store.merge(ctx.provider, &conversation_key, record) {
                MergeOutcome::Inserted => {
                    inserted += 1;
                    if !from_business {
                        new_senders.insert(sender_id);
                    }
                }
                MergeOutcome::Duplicate => {
                    duplicates += 1;
                    if was_echo_seen(ctx, &id_for_log) {
                        echo_confirmed += 1;
                    }
                }
            }
        }
    }
    if inserted > 0 || duplicates > 0 {
        debug!(
            "{} sync poll merged {} new, {} duplicate ({} previously echoed)",
            ctx.provider, inserted, duplicates, echo_confirmed
        );
    }
    new_senders
}

/// Kick off background profile resolution for senders this cycle introduced.
/// Merge latency never waits on lookups; the tasks land in the connection's
/// resolver set so disconnect can abort any still in flight.
async fn schedule_profile_resolution(ctx: &LoopContext, senders: HashSet<String>) {
    for sender_id in senders {
        if sender_id == ctx.business_id {
            continue;
        }
        if ctx.identity.cached(ctx.provider, &sender_id).await.is_some() {
            continue;
        }
        let identity = ctx.identity.clone();
        let client = ctx.client.clone();
        let provider = ctx.provider;
        let mut resolvers = ctx.resolvers.lock().await;
        // Reap finished tasks so the set stays bounded by in-flight lookups.
        while resolvers.try_join_next().is_some() {}
        resolvers.spawn(async move {
            identity.resolve(provider, &sender_id, client.as_ref()).await;
        });
    }
}

fn remember_echo(ctx: &LoopContext, message_id: &str) {
    let mut seen = ctx
        .echo_seen
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if seen.len() >= MAX_SEEN_ECHOES {
        seen.clear();
    }
    seen.insert(message_id.to_string());
}

fn was_echo_seen(ctx: &LoopContext, message_id: &str) -> bool {
    ctx.echo_seen
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(message_id)
}
