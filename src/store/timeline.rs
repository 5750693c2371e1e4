//! In-memory conversation store.
//!
//! Locking discipline: a coarse `RwLock` guards only the map of conversation
//! cells; each timeline has its own mutex. Merges on different conversations
//! never contend, and no lock is ever held across an await point.

use crate::providers::Provider;
use crate::store::conversation::{Conversation, MergeOutcome, Message};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

#[derive(Debug, Default)]
struct Timeline {
    participants: BTreeSet<String>,
    ids: HashSet<String>,
    messages: Vec<Message>,
}

/// Deduplicating, timestamp-ordered store for all synchronized conversations.
#[derive(Debug, Default)]
pub struct ConversationStore {
    partitions: RwLock<HashMap<Provider, HashMap<String, Arc<Mutex<Timeline>>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locate or create the cell for a conversation. Read-lock fast path,
    /// write lock only on first sight of the conversation.
    fn cell(&self, provider: Provider, conversation_id: &str) -> Arc<Mutex<Timeline>> {
        {
            let partitions = self
                .partitions
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(cell) = partitions
                .get(&provider)
                .and_then(|m| m.get(conversation_id))
            {
                return cell.clone();
            }
        }
        let mut partitions = self
            .partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        partitions
            .entry(provider)
            .or_default()
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    fn find_cell(&self, provider: Provider, conversation_id: &str) -> Option<Arc<Mutex<Timeline>>> {
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        partitions
            .get(&provider)
            .and_then(|m| m.get(conversation_id))
            .cloned()
    }

    /// Merge one message into its conversation timeline.
    ///
    /// Idempotent by message id: a second merge of an id is reported as
    /// `Duplicate` and changes nothing, even if the payload content differs.
    /// The timeline is re-sorted by timestamp after every insert; the sort is
    /// stable, so equal timestamps keep arrival order.
    pub fn merge(
        &self,
        provider: Provider,
        conversation_id: &str,
        message: Message,
    ) -> MergeOutcome {
        let cell = self.cell(provider, conversation_id);
        let mut timeline = cell.lock().unwrap_or_else(PoisonError::into_inner);
        if timeline.ids.contains(&message.id) {
            return MergeOutcome::Duplicate;
        }
        timeline.ids.insert(message.id.clone());
        timeline.participants.insert(message.sender_id.clone());
        if message.is_from_business && message.sender_id != conversation_id {
            // Business-originated merge: the conversation key is the remote
            // peer, record them as a participant too.
            timeline.participants.insert(conversation_id.to_string());
        }
        timeline.messages.push(message);
        timeline.messages.sort_by_key(|m| m.timestamp_ms);
        MergeOutcome::Inserted
    }

    /// All conversations for a provider, most recently updated first.
    /// Conversations with the same update time order by id ascending.
    pub fn list_conversations(&self, provider: Provider) -> Vec<Conversation> {
        let cells: Vec<(String, Arc<Mutex<Timeline>>)> = {
            let partitions = self
                .partitions
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match partitions.get(&provider) {
                Some(map) => map
                    .iter()
                    .map(|(id, cell)| (id.clone(), cell.clone()))
                    .collect(),
                None => return Vec::new(),
            }
        };
        let mut out: Vec<Conversation> = cells
            .into_iter()
            .map(|(id, cell)| {
                let timeline = cell.lock().unwrap_or_else(PoisonError::into_inner);
                let last = timeline.messages.last();
                Conversation {
                    id,
                    provider,
                    participants: timeline.participants.clone(),
                    last_message: last.map(|m| m.text.clone()),
                    updated_at_ms: last.map(|m| m.timestamp_ms),
                }
            })
            .collect();
        out.sort_by(|a, b| {
            b.updated_at_ms
                .cmp(&a.updated_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    /// Timeline of one conversation in timestamp order. Unknown conversations
    /// yield an empty list, not an error.
    pub fn get_messages(&self, provider: Provider, conversation_id: &str) -> Vec<Message> {
        match self.find_cell(provider, conversation_id) {
            Some(cell) => cell
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .messages
                .clone(),
            None => Vec::new(),
        }
    }

    /// Rename a provisional message id once the provider-assigned id is known.
    ///
    /// If the final id already arrived through another path, the provisional
    /// copy is removed instead of renamed. Returns whether anything changed.
    pub fn replace_message_id(
        &self,
        provider: Provider,
        conversation_id: &str,
        old_id: &str,
        new_id: &str,
    ) -> bool {
        if old_id == new_id {
            return false;
        }
        let Some(cell) = self.find_cell(provider, conversation_id) else {
            return false;
        };
        let mut timeline = cell.lock().unwrap_or_else(PoisonError::into_inner);
        if !timeline.ids.contains(old_id) {
            return false;
        }
        timeline.ids.remove(old_id);
        if timeline.ids.contains(new_id) {
            timeline.messages.retain(|m| m.id != old_id);
            return true;
        }
        timeline.ids.insert(new_id.to_string());
        for message in &mut timeline.messages {
            if message.id == old_id {
                message.id = new_id.to_string();
            }
        }
        true
    }

    /// Drop every conversation belonging to a provider.
    pub fn clear(&self, provider: Provider) {
        let mut partitions = self
            .partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(map) = partitions.remove(&provider) {
            debug!("cleared {} conversations for {}", map.len(), provider);
        }
    }

    /// Number of conversations currently held for a provider.
    pub fn conversation_count(&self, provider: Provider) -> usize {
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        partitions.get(&provider).map_or(0, HashMap::len)
    }
}
