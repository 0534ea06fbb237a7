//! Wall-clock source for the rate-limit ledger

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of Unix time in whole seconds
pub trait Clock {
    fn now(&self) -> u64;
}

/// The system clock; a clock before the epoch reads as 0
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> u64 {
        (**self).now()
    }
}
