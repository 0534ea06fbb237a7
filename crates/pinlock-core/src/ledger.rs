//! Rate-limit ledger
//!
//! Per-user failure counters that survive across login attempts. The record
//! is one line of four integers:
//!
//! ```text
//! window_start attempt_count lockout_until lockout_count
//! ```
//!
//! A missing or malformed record reads as all zeros.
//!
//! # States
//!
//! - `Active`: budget remains
//! - `Throttled`: budget spent inside a live window, no timed lockout
//! - `LockedOut`: lockout enabled and `now < lockout_until`
//!
//! A window has expired when `now - window_start > rate_limit_window`; a
//! difference exactly equal to the window is still inside it.
//!
//! Concurrent logins read and overwrite the whole record without a lock. The
//! worst interleaving loses one increment, which allows at most one extra
//! guess.

use std::fs;
use std::io::ErrorKind;

use serde::Serialize;
use tracing::{debug, warn};

use crate::account::UserAccount;
use crate::clock::Clock;
use crate::config::EffectivePolicy;
use crate::error::{PinlockError, Result};
use crate::storage;

/// What happened, as far as the ledger is concerned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Read-only gate before prompting
    Probe,
    /// The PIN matched
    Success,
    /// The PIN was malformed or did not match
    Failure,
}

/// Ledger decision
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerVerdict {
    Proceed,
    Deny,
}

/// Throttling state derived from a record at a point in time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerState {
    Active { remaining: u32 },
    Throttled,
    LockedOut { until: u64 },
}

/// Durable per-user counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitRecord {
    /// Start of the current counting window (Unix seconds)
    pub window_start: u64,
    /// Failures counted in the current window
    pub attempt_count: u32,
    /// Locked until this Unix time; 0 when not locked
    pub lockout_until: u64,
    /// Lockouts ever entered (diagnostic)
    pub lockout_count: u32,
}

impl RateLimitRecord {
    /// Parse the on-disk line; anything but four integers yields the zero record
    pub fn parse(text: &str) -> Self {
        let fields: Vec<&str> = text.split_whitespace().collect();
        let [window_start, attempt_count, lockout_until, lockout_count] = fields[..] else {
            return Self::default();
        };

        let parsed = (|| {
            Some(Self {
                window_start: window_start.parse().ok()?,
                attempt_count: attempt_count.parse().ok()?,
                lockout_until: lockout_until.parse().ok()?,
                lockout_count: lockout_count.parse().ok()?,
            })
        })();

        parsed.unwrap_or_default()
    }

    /// Encode as the on-disk line
    pub fn encode(&self) -> String {
        format!(
            "{} {} {} {}\n",
            self.window_start, self.attempt_count, self.lockout_until, self.lockout_count
        )
    }

    /// Whether the counting window has elapsed (strictly longer than the window)
    pub fn window_expired(&self, now: u64, policy: &EffectivePolicy) -> bool {
        now.saturating_sub(self.window_start) > policy.rate_limit_window
    }

    /// Whether a timed lockout is in force
    pub fn is_locked(&self, now: u64, policy: &EffectivePolicy) -> bool {
        policy.lockout_enabled && now < self.lockout_until
    }

    /// Failures still counted at `now`
    pub fn live_attempts(&self, now: u64, policy: &EffectivePolicy) -> u32 {
        if self.window_expired(now, policy) {
            0
        } else {
            self.attempt_count
        }
    }

    /// Current state
    pub fn state(&self, now: u64, policy: &EffectivePolicy) -> LedgerState {
        if self.is_locked(now, policy) {
            return LedgerState::LockedOut {
                until: self.lockout_until,
            };
        }

        let attempts = self.live_attempts(now, policy);
        if attempts >= policy.max_attempts {
            LedgerState::Throttled
        } else {
            LedgerState::Active {
                remaining: policy.max_attempts - attempts,
            }
        }
    }

    /// Apply an outcome in memory
    pub fn apply(&mut self, outcome: Outcome, now: u64, policy: &EffectivePolicy) -> LedgerVerdict {
        match outcome {
            Outcome::Probe => match self.state(now, policy) {
                LedgerState::Active { .. } => LedgerVerdict::Proceed,
                LedgerState::Throttled | LedgerState::LockedOut { .. } => LedgerVerdict::Deny,
            },

            Outcome::Success => {
                self.window_start = 0;
                self.attempt_count = 0;
                self.lockout_until = 0;
                LedgerVerdict::Proceed
            }

            Outcome::Failure => {
                if self.window_expired(now, policy) {
                    self.attempt_count = 0;
                    self.window_start = now;
                }
                self.attempt_count = self.attempt_count.saturating_add(1);

                if self.attempt_count < policy.max_attempts {
                    return LedgerVerdict::Proceed;
                }

                if policy.lockout_enabled {
                    self.lockout_until = now.saturating_add(policy.lockout_duration);
                    self.lockout_count = self.lockout_count.saturating_add(1);
                    self.attempt_count = 0;
                }
                LedgerVerdict::Deny
            }
        }
    }
}

/// File-backed ledger for one user
pub struct RateLimitLedger<'a, C: Clock> {
    user: &'a UserAccount,
    clock: C,
}

impl<'a, C: Clock> RateLimitLedger<'a, C> {
    pub fn new(user: &'a UserAccount, clock: C) -> Self {
        Self { user, clock }
    }

    /// Current time according to the ledger's clock
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Read the record; a missing file is the zero record
    pub fn load(&self) -> Result<RateLimitRecord> {
        match fs::read_to_string(self.user.ledger_path()) {
            Ok(text) => Ok(RateLimitRecord::parse(&text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RateLimitRecord::default()),
            Err(e) if e.kind() == ErrorKind::InvalidData => Ok(RateLimitRecord::default()),
            Err(e) => Err(PinlockError::StorageUnavailable(e.to_string())),
        }
    }

    /// Overwrite the record
    pub fn save(&self, record: &RateLimitRecord) -> Result<()> {
        storage::write_private(self.user, &self.user.ledger_path(), record.encode().as_bytes())
            .map_err(|e| PinlockError::StorageUnavailable(e.to_string()))
    }

    /// Gate or record an attempt
    ///
    /// `Probe` never writes. `Success` and `Failure` persist the updated record
    /// whenever it changed.
    pub fn check_and_record(
        &self,
        outcome: Outcome,
        policy: &EffectivePolicy,
    ) -> Result<LedgerVerdict> {
        let now = self.clock.now();
        let before = self.load()?;
        let mut record = before;
        let verdict = record.apply(outcome, now, policy);

        if outcome != Outcome::Probe && record != before {
            self.save(&record)?;
        }

        debug!(
            user = %self.user.name(),
            ?outcome,
            ?verdict,
            attempts = record.attempt_count,
            lockout_until = record.lockout_until,
            "rate limit ledger"
        );

        if outcome == Outcome::Failure && record.lockout_count > before.lockout_count {
            warn!(
                user = %self.user.name(),
                until = record.lockout_until,
                "PIN authentication locked out"
            );
        }

        Ok(verdict)
    }

    /// State at the current time
    pub fn state(&self, policy: &EffectivePolicy) -> Result<LedgerState> {
        Ok(self.load()?.state(self.clock.now(), policy))
    }

    /// Delete the record; returns whether one existed
    pub fn reset(&self) -> Result<bool> {
        storage::remove_if_present(self.user, &self.user.ledger_path())
    }
}
