#![no_main]

use libfuzzer_sys::fuzz_target;
use pinlock_core::{config::parse_layer, CallOverrides, EffectivePolicy};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let _ = parse_layer(text);

    // Any layer stack resolves to a usable policy
    let mid = (0..=text.len() / 2)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    let (system, personal) = text.split_at(mid);
    let policy = EffectivePolicy::from_layers([system, personal]);
    assert!(policy.min_length >= 1);
    assert!(policy.min_length <= policy.max_length);
    assert!(policy.max_attempts >= 1);
    assert!(policy.local_retries >= 1);

    // Module arguments are whitespace-separated tokens
    let overrides = CallOverrides::from_module_args(text.split_whitespace());
    let policy = policy.with_overrides(&overrides);
    assert!(policy.local_retries >= 1);
});
