#![no_main]

use libfuzzer_sys::fuzz_target;
use unibox::events::normalize;
use unibox::providers::Provider;

// The normalizer must never panic, whatever the webhook body looks like.
fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = normalize(Provider::Facebook, &payload);
        let _ = normalize(Provider::Instagram, &payload);
    }
});
