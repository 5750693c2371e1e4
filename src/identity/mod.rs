use crate::providers::Provider;
use crate::providers::client::{ContactProfile, ProviderClient};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::warn;

const MAX_CACHED_CONTACTS: usize = 4096;

/// A resolved (or placeholder) contact identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub provider: Provider,
    /// False for placeholder contacts that never reached the provider.
    pub resolved: bool,
}

impl Contact {
    /// Minimal stand-in used when the profile cannot be fetched. Placeholders
    /// are returned to callers but never cached, so a later lookup retries.
    pub fn placeholder(provider: Provider, user_id: &str) -> Self {
        Self {
            id: user_id.to_string(),
            name: user_id.to_string(),
            avatar_url: None,
            provider,
            resolved: false,
        }
    }

    fn from_profile(provider: Provider, profile: ContactProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            avatar_url: profile.avatar_url,
            provider,
            resolved: true,
        }
    }
}

type ContactKey = (Provider, String);

/// LRU cache of contact identities with single-flight profile fetches.
///
/// Concurrent lookups for the same user share one in-flight request via a
/// per-key `OnceCell`; the winner's result is published to the cache and every
/// waiter gets the same contact.
pub struct IdentityCache {
    contacts: Mutex<LruCache<ContactKey, Contact>>,
    in_flight: Mutex<HashMap<ContactKey, Arc<OnceCell<Contact>>>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::with_capacity(MAX_CACHED_CONTACTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            contacts: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity must be > 0"),
            )),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Cached contact, if any. Promotes the entry to most recently used.
    pub async fn cached(&self, provider: Provider, user_id: &str) -> Option<Contact> {
        self.contacts
            .lock()
            .await
            .get(&(provider, user_id.to_string()))
            .cloned()
    }

    /// Cache-or-fetch lookup.
    ///
    /// On fetch failure the caller receives a placeholder and nothing is
    /// cached, so the next lookup tries the provider again.
    pub async fn resolve(
        &self,
        provider: Provider,
        user_id: &str,
        client: &dyn ProviderClient,
    ) -> Contact {
        let key = (provider, user_id.to_string());
        if let Some(contact) = self.contacts.lock().await.get(&key) {
            return contact.clone();
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let fetched = cell
            .get_or_try_init(|| async {
                client
                    .fetch_profile(user_id)
                    .await
                    .map(|profile| Contact::from_profile(provider, profile))
            })
            .await
            .cloned();
        self.in_flight.lock().await.remove(&key);

        match fetched {
            Ok(contact) => {
                self.contacts.lock().await.put(key, contact.clone());
                contact
            }
            Err(e) => {
                warn!("profile lookup for {}:{} failed: {}", provider, user_id, e);
                Contact::placeholder(provider, user_id)
            }
        }
    }

    /// Drop all cached contacts for a provider.
    pub async fn clear(&self, provider: Provider) {
        {
            let mut contacts = self.contacts.lock().await;
            let stale: Vec<ContactKey> = contacts
                .iter()
                .filter(|((p, _), _)| *p == provider)
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                contacts.pop(&key);
            }
        }
        self.in_flight
            .lock()
            .await
            .retain(|(p, _), _| *p != provider);
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new()
    }
}
