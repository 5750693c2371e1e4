use crate::providers::Provider;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Cap on each provider's queue. Oldest payloads are dropped once the webhook
/// producer outruns the drain loop by this much.
const MAX_QUEUED_PER_PROVIDER: usize = 4096;

/// Buffered raw webhook payloads, one FIFO queue per provider.
///
/// The gateway pushes payloads as they arrive; the relay-drain loop takes the
/// whole batch on each tick. Operations never suspend, so producers are never
/// blocked behind a slow consumer.
#[derive(Debug, Default)]
pub struct RelayBuffer {
    queues: Mutex<HashMap<Provider, Vec<Value>>>,
}

impl RelayBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw payload to a provider's queue.
    pub fn push(&self, provider: Provider, payload: Value) {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = queues.entry(provider).or_default();
        queue.push(payload);
        if queue.len() > MAX_QUEUED_PER_PROVIDER {
            let overflow = queue.len() - MAX_QUEUED_PER_PROVIDER;
            queue.drain(..overflow);
            warn!(
                "{} relay queue full, dropped {} oldest payload(s)",
                provider, overflow
            );
        }
    }

    /// Take every buffered payload for a provider, preserving arrival order.
    pub fn drain(&self, provider: Provider) -> Vec<Value> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.remove(&provider).unwrap_or_default()
    }

    /// Discard anything buffered for a provider.
    pub fn clear(&self, provider: Provider) {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.remove(&provider);
    }

    pub fn len(&self, provider: Provider) -> usize {
        let queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.get(&provider).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, provider: Provider) -> bool {
        self.len(provider) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drain_returns_payloads_in_arrival_order() {
        let buffer = RelayBuffer::new();
        buffer.push(Provider::Instagram, json!({"n": 1}));
        buffer.push(Provider::Instagram, json!({"n": 2}));
        buffer.push(Provider::Instagram, json!({"n": 3}));

        let drained = buffer.drain(Provider::Instagram);
        let ns: Vec<i64> = drained.iter().map(|v| v["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![1, 2, 3]);
        assert!(buffer.is_empty(Provider::Instagram));
    }

    #[test]
    fn drain_empties_the_queue() {
        let buffer = RelayBuffer::new();
        buffer.push(Provider::Facebook, json!({}));
        assert_eq!(buffer.drain(Provider::Facebook).len(), 1);
        assert!(buffer.drain(Provider::Facebook).is_empty());
    }

    #[test]
    fn queues_are_isolated_per_provider() {
        let buffer = RelayBuffer::new();
        buffer.push(Provider::Instagram, json!({"p": "ig"}));
        buffer.push(Provider::Facebook, json!({"p": "fb"}));

        assert_eq!(buffer.len(Provider::Instagram), 1);
        assert_eq!(buffer.len(Provider::Facebook), 1);

        let fb = buffer.drain(Provider::Facebook);
        assert_eq!(fb[0]["p"], "fb");
        assert_eq!(buffer.len(Provider::Instagram), 1);
    }

    #[test]
    fn clear_discards_buffered_payloads() {
        let buffer = RelayBuffer::new();
        buffer.push(Provider::Instagram, json!({}));
        buffer.clear(Provider::Instagram);
        assert!(buffer.is_empty(Provider::Instagram));
    }

    #[test]
    fn push_beyond_cap_drops_oldest() {
        let buffer = RelayBuffer::new();
        for n in 0..=MAX_QUEUED_PER_PROVIDER {
            buffer.push(Provider::Facebook, json!({"n": n}));
        }
        let drained = buffer.drain(Provider::Facebook);
        assert_eq!(drained.len(), MAX_QUEUED_PER_PROVIDER);
        // Entry 0 was dropped; the queue starts at 1.
        assert_eq!(drained[0]["n"], 1);
    }
}
