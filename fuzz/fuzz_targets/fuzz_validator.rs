#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pinlock_core::{validator, EffectivePolicy};

#[derive(Arbitrary, Debug)]
struct Input {
    candidate: String,
    min_length: u8,
    extra: u8,
    digits_only: bool,
}

fuzz_target!(|input: Input| {
    let min_length = usize::from(input.min_length).max(1);
    let policy = EffectivePolicy {
        min_length,
        max_length: min_length + usize::from(input.extra),
        digits_only: input.digits_only,
        ..EffectivePolicy::default()
    };

    let valid = validator::validate(&input.candidate, &policy);
    assert_eq!(valid, validator::check(&input.candidate, &policy).is_ok());

    if valid {
        let len = input.candidate.chars().count();
        assert!(len >= policy.min_length && len <= policy.max_length);
    }
});
