#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pinlock_core::{EffectivePolicy, LedgerVerdict, Outcome, RateLimitRecord};

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    line: &'a str,
    now: u64,
    max_attempts: u32,
    window: u64,
    lockout_enabled: bool,
    lockout_duration: u64,
    outcomes: Vec<u8>,
}

fuzz_target!(|input: Input<'_>| {
    let mut record = RateLimitRecord::parse(input.line);

    // Whatever parsed must survive its own encoding
    assert_eq!(RateLimitRecord::parse(&record.encode()), record);

    let policy = EffectivePolicy {
        max_attempts: input.max_attempts.max(1),
        rate_limit_window: input.window,
        lockout_enabled: input.lockout_enabled,
        lockout_duration: input.lockout_duration,
        ..EffectivePolicy::default()
    };

    for (i, byte) in input.outcomes.iter().enumerate() {
        let now = input.now.saturating_add(i as u64);
        let outcome = match byte % 3 {
            0 => Outcome::Probe,
            1 => Outcome::Success,
            _ => Outcome::Failure,
        };

        let before = record;
        let verdict = record.apply(outcome, now, &policy);

        match outcome {
            Outcome::Probe => assert_eq!(record, before),
            Outcome::Success => {
                assert_eq!(verdict, LedgerVerdict::Proceed);
                assert_eq!(record.attempt_count, 0);
            }
            Outcome::Failure => {}
        }
    }
});
