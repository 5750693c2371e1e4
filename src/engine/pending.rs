use crate::providers::Provider;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// How long a provisional send may wait for its echo before the entry lapses.
pub(crate) const RECONCILE_WINDOW_MS: i64 = 60_000;

#[derive(Debug, Clone)]
struct PendingSend {
    temp_id: String,
    sent_at_ms: i64,
}

/// Outstanding optimistic sends awaiting a provider-assigned id.
///
/// Keyed by (provider, conversation, text). When the echo of a sent message
/// arrives, a matching entry within the time window yields the provisional id
/// to rename. Matching is best effort: a missed match leaves the provisional
/// copy in place and the store's id dedup governs from there.
#[derive(Debug, Default)]
pub(crate) struct PendingSends {
    entries: Mutex<HashMap<(Provider, String, String), PendingSend>>,
}

impl PendingSends {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(
        &self,
        provider: Provider,
        conversation_id: &str,
        text: &str,
        temp_id: &str,
        now_ms: i64,
    ) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, pending| now_ms - pending.sent_at_ms <= RECONCILE_WINDOW_MS);
        entries.insert(
            (provider, conversation_id.to_string(), text.to_string()),
            PendingSend {
                temp_id: temp_id.to_string(),
                sent_at_ms: now_ms,
            },
        );
    }

    /// Claim the provisional id for an echoed message, if one is pending and
    /// the echo falls inside the reconciliation window.
    pub(crate) fn take_match(
        &self,
        provider: Provider,
        conversation_id: &str,
        text: &str,
        echo_ts_ms: i64,
    ) -> Option<String> {
        let key = (provider, conversation_id.to_string(), text.to_string());
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let pending = entries.remove(&key)?;
        if (echo_ts_ms - pending.sent_at_ms).abs() > RECONCILE_WINDOW_MS {
            return None;
        }
        Some(pending.temp_id)
    }

    pub(crate) fn clear(&self, provider: Provider) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|(p, _, _), _| *p != provider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_match_returns_recorded_temp_id() {
        let pending = PendingSends::new();
        pending.record(Provider::Instagram, "c-1", "hello", "local-1", 1_000);

        let hit = pending.take_match(Provider::Instagram, "c-1", "hello", 2_500);
        assert_eq!(hit.as_deref(), Some("local-1"));

        // Entry is consumed.
        assert!(pending.take_match(Provider::Instagram, "c-1", "hello", 2_500).is_none());
    }

    #[test]
    fn take_match_requires_same_conversation_and_text() {
        let pending = PendingSends::new();
        pending.record(Provider::Instagram, "c-1", "hello", "local-1", 1_000);

        assert!(pending.take_match(Provider::Instagram, "c-2", "hello", 1_500).is_none());
        assert!(pending.take_match(Provider::Instagram, "c-1", "other", 1_500).is_none());
        assert!(pending.take_match(Provider::Facebook, "c-1", "hello", 1_500).is_none());
    }

    #[test]
    fn take_match_rejects_echoes_outside_window() {
        let pending = PendingSends::new();
        pending.record(Provider::Instagram, "c-1", "hello", "local-1", 1_000);

        let miss = pending.take_match(
            Provider::Instagram,
            "c-1",
            "hello",
            1_000 + RECONCILE_WINDOW_MS + 1,
        );
        assert!(miss.is_none());
    }

    #[test]
    fn record_prunes_lapsed_entries() {
        let pending = PendingSends::new();
        pending.record(Provider::Instagram, "c-1", "old", "local-1", 1_000);
        pending.record(
            Provider::Instagram,
            "c-2",
            "new",
            "local-2",
            1_000 + RECONCILE_WINDOW_MS + 1_000,
        );

        let miss = pending.take_match(Provider::Instagram, "c-1", "old", 2_000);
        assert!(miss.is_none());
    }

    #[test]
    fn clear_is_scoped_to_one_provider() {
        let pending = PendingSends::new();
        pending.record(Provider::Instagram, "c-1", "hi", "local-1", 1_000);
        pending.record(Provider::Facebook, "c-1", "hi", "local-2", 1_000);

        pending.clear(Provider::Instagram);

        assert!(pending.take_match(Provider::Instagram, "c-1", "hi", 1_100).is_none());
        assert_eq!(
            pending.take_match(Provider::Facebook, "c-1", "hi", 1_100).as_deref(),
            Some("local-2")
        );
    }
}
