//! Authentication orchestration
//!
//! Drives one login attempt: checks enrollment, gates every prompt on the
//! rate-limit ledger, validates and verifies each candidate, and records the
//! outcome. Only the final [`Verdict`] leaves this module.

use std::fmt;

use tracing::warn;
use zeroize::Zeroizing;

use crate::account::UserAccount;
use crate::clock::{Clock, SystemClock};
use crate::config::EffectivePolicy;
use crate::credential::CredentialStore;
use crate::error::PinlockError;
use crate::events::{AuthEvent, AuthObserver, EventOutcome, TracingObserver};
use crate::hasher::PinHasher;
use crate::ledger::{LedgerVerdict, Outcome, RateLimitLedger};
use crate::validator;

/// Result of an authentication call, as seen by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The PIN matched
    Accept,
    /// PIN authentication applies to this user and said no
    Reject,
    /// PIN authentication does not apply right now; try the next method
    Defer,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accept => write!(f, "accept"),
            Verdict::Reject => write!(f, "reject"),
            Verdict::Defer => write!(f, "defer"),
        }
    }
}

/// Supplies candidate PINs, typically by prompting the user
pub trait SecretSource {
    /// Next candidate, or `None` if the user gave up or input failed
    fn next_secret(&mut self, prompt: &str) -> Option<Zeroizing<String>>;
}

/// The authentication entry point
pub struct Authenticator<H, C = SystemClock, O = TracingObserver> {
    hasher: H,
    clock: C,
    observer: O,
}

impl<H: PinHasher> Authenticator<H> {
    /// Authenticator on the system clock, reporting through `tracing`
    pub fn new(hasher: H) -> Self {
        Self {
            hasher,
            clock: SystemClock,
            observer: TracingObserver,
        }
    }
}

impl<H, C, O> Authenticator<H, C, O> {
    /// Replace the clock
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Authenticator<H, C2, O> {
        Authenticator {
            hasher: self.hasher,
            clock,
            observer: self.observer,
        }
    }

    /// Replace the event observer
    pub fn with_observer<O2: AuthObserver>(self, observer: O2) -> Authenticator<H, C, O2> {
        Authenticator {
            hasher: self.hasher,
            clock: self.clock,
            observer,
        }
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }
}

impl<H: PinHasher, C: Clock, O: AuthObserver> Authenticator<H, C, O> {
    /// Authenticate `user` with candidates from `source`
    ///
    /// - not enrolled, ledger unreadable, or rate limited before a prompt: `Defer`
    /// - corrupt credential, no input, spent budget, or last retry failed: `Reject`
    /// - matching PIN: `Accept`, and the ledger is cleared
    pub fn authenticate<S>(
        &self,
        user: &UserAccount,
        policy: &EffectivePolicy,
        source: &mut S,
    ) -> Verdict
    where
        S: SecretSource + ?Sized,
    {
        let report = |outcome: EventOutcome, attempt: u32, reason: Option<&dyn fmt::Display>| {
            let mut event = AuthEvent::new(user.name(), outcome, attempt, policy);
            if let Some(reason) = reason {
                event = event.with_reason(reason);
            }
            self.observer.record(&event);
        };

        let encoded = match CredentialStore::new(user).load() {
            Ok(encoded) => encoded,
            Err(e) => {
                let verdict = e.verdict();
                let outcome = match verdict {
                    Verdict::Defer => EventOutcome::Deferred,
                    _ => EventOutcome::Rejected,
                };
                report(outcome, 0, Some(&e));
                return verdict;
            }
        };

        let ledger = RateLimitLedger::new(user, &self.clock);
        let retries = policy.local_retries.max(1);

        for attempt in 1..=retries {
            let last = attempt == retries;

            match ledger.check_and_record(Outcome::Probe, policy) {
                Ok(LedgerVerdict::Proceed) => {}
                Ok(LedgerVerdict::Deny) => {
                    report(EventOutcome::Deferred, attempt, Some(&"rate limited"));
                    return Verdict::Defer;
                }
                Err(e) => {
                    report(EventOutcome::Deferred, attempt, Some(&e));
                    return Verdict::Defer;
                }
            }

            let Some(candidate) = source.next_secret(&policy.prompt) else {
                report(
                    EventOutcome::Rejected,
                    attempt,
                    Some(&PinlockError::InputUnavailable),
                );
                return Verdict::Reject;
            };
            report(EventOutcome::Attempted, attempt, None);

            let checked = self.check_candidate(&candidate, &encoded, policy);
            drop(candidate);

            let failure = match checked {
                Ok(()) => {
                    if let Err(e) = ledger.check_and_record(Outcome::Success, policy) {
                        warn!(user = %user.name(), error = %e, "could not clear rate limit ledger");
                    }
                    report(EventOutcome::Accepted, attempt, None);
                    return Verdict::Accept;
                }
                Err(e) => e,
            };
            report(EventOutcome::Failed, attempt, Some(&failure));

            if !failure.counts_as_failure() {
                report(EventOutcome::Rejected, attempt, Some(&failure));
                return Verdict::Reject;
            }

            match ledger.check_and_record(Outcome::Failure, policy) {
                Ok(LedgerVerdict::Proceed) if !last => continue,
                Ok(LedgerVerdict::Proceed) => {
                    report(EventOutcome::Rejected, attempt, Some(&failure));
                }
                Ok(LedgerVerdict::Deny) => {
                    report(EventOutcome::Rejected, attempt, Some(&"attempt budget exhausted"));
                }
                Err(e) => {
                    report(EventOutcome::Rejected, attempt, Some(&e));
                }
            }
            return Verdict::Reject;
        }

        report(EventOutcome::Rejected, retries, None);
        Verdict::Reject
    }

    /// Format check, then the expensive verification
    fn check_candidate(
        &self,
        candidate: &str,
        encoded: &str,
        policy: &EffectivePolicy,
    ) -> Result<(), PinlockError> {
        validator::check(candidate, policy)?;

        if self.hasher.verify(encoded, candidate.as_bytes()) {
            Ok(())
        } else {
            Err(PinlockError::VerifyMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Argon2idHasher;
    use crate::ledger::RateLimitRecord;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use tempfile::tempdir;

    const T0: u64 = 1_700_000_000;

    struct TestClock(Cell<u64>);

    impl Clock for TestClock {
        fn now(&self) -> u64 {
            self.0.get()
        }
    }

    /// Counts verify calls and delegates to a cheap Argon2id
    struct CountingHasher {
        inner: Argon2idHasher,
        verifies: Cell<u32>,
    }

    impl CountingHasher {
        fn new() -> Self {
            Self {
                inner: Argon2idHasher::with_params(1024, 1, 1).unwrap(),
                verifies: Cell::new(0),
            }
        }
    }

    impl PinHasher for CountingHasher {
        fn hash(&self, secret: &[u8]) -> crate::Result<String> {
            self.inner.hash(secret)
        }

        fn verify(&self, encoded: &str, secret: &[u8]) -> bool {
            self.verifies.set(self.verifies.get() + 1);
            self.inner.verify(encoded, secret)
        }
    }

    #[derive(Default)]
    struct RecordingObserver(RefCell<Vec<AuthEvent>>);

    impl AuthObserver for RecordingObserver {
        fn record(&self, event: &AuthEvent) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    impl RecordingObserver {
        fn outcomes(&self) -> Vec<EventOutcome> {
            self.0.borrow().iter().map(|e| e.outcome).collect()
        }
    }

    struct Scripted {
        pins: VecDeque<&'static str>,
        prompts: Vec<String>,
    }

    impl Scripted {
        fn new(pins: &[&'static str]) -> Self {
            Self {
                pins: pins.iter().copied().collect(),
                prompts: Vec::new(),
            }
        }
    }

    impl SecretSource for Scripted {
        fn next_secret(&mut self, prompt: &str) -> Option<Zeroizing<String>> {
            self.prompts.push(prompt.to_string());
            self.pins.pop_front().map(|pin| Zeroizing::new(pin.to_string()))
        }
    }

    fn policy() -> EffectivePolicy {
        EffectivePolicy {
            min_length: 4,
            max_length: 8,
            ..EffectivePolicy::default()
        }
    }

    fn enrolled(home: &std::path::Path, pin: &str) -> UserAccount {
        let user = UserAccount::new("alice", home);
        CredentialStore::new(&user)
            .enroll(pin, &policy(), &CountingHasher::new())
            .unwrap();
        user
    }

    #[test]
    fn test_accept_clears_ledger() {
        let temp_dir = tempdir().unwrap();
        let user = enrolled(temp_dir.path(), "4242");
        let clock = TestClock(Cell::new(T0));
        let observer = RecordingObserver::default();
        let auth = Authenticator::new(CountingHasher::new())
            .with_clock(&clock)
            .with_observer(&observer);

        let mut source = Scripted::new(&["0000", "4242"]);
        assert_eq!(auth.authenticate(&user, &policy(), &mut source), Verdict::Accept);

        let ledger = RateLimitLedger::new(&user, &clock);
        assert_eq!(ledger.load().unwrap(), RateLimitRecord::default());
        assert_eq!(
            observer.outcomes(),
            vec![
                EventOutcome::Attempted,
                EventOutcome::Failed,
                EventOutcome::Attempted,
                EventOutcome::Accepted,
            ]
        );
        assert_eq!(source.prompts, vec![policy().prompt; 2]);
    }

    #[test]
    fn test_not_enrolled_defers_without_prompt() {
        let temp_dir = tempdir().unwrap();
        let user = UserAccount::new("alice", temp_dir.path());
        let auth = Authenticator::new(CountingHasher::new());

        let mut source = Scripted::new(&["4242"]);
        assert_eq!(auth.authenticate(&user, &policy(), &mut source), Verdict::Defer);
        assert!(source.prompts.is_empty());
        assert_eq!(auth.hasher().verifies.get(), 0);
        assert!(!user.ledger_path().exists());
    }

    #[test]
    fn test_corrupt_credential_rejects_without_prompt() {
        let temp_dir = tempdir().unwrap();
        let user = UserAccount::new("alice", temp_dir.path());
        std::fs::create_dir_all(user.pinlock_dir()).unwrap();
        std::fs::write(user.credential_path(), "\n").unwrap();

        let observer = RecordingObserver::default();
        let auth = Authenticator::new(CountingHasher::new()).with_observer(&observer);
        let mut source = Scripted::new(&["4242"]);

        assert_eq!(auth.authenticate(&user, &policy(), &mut source), Verdict::Reject);
        assert!(source.prompts.is_empty());
        assert!(!user.ledger_path().exists());
        assert_eq!(observer.outcomes(), vec![EventOutcome::Rejected]);
    }

    #[test]
    fn test_input_unavailable_rejects_immediately() {
        let temp_dir = tempdir().unwrap();
        let user = enrolled(temp_dir.path(), "4242");
        let auth = Authenticator::new(CountingHasher::new());

        let mut source = Scripted::new(&[]);
        assert_eq!(auth.authenticate(&user, &policy(), &mut source), Verdict::Reject);
        assert_eq!(source.prompts.len(), 1);
        assert!(!user.ledger_path().exists());
    }

    #[test]
    fn test_format_invalid_skips_hashing() {
        let temp_dir = tempdir().unwrap();
        let user = enrolled(temp_dir.path(), "4242");
        let clock = TestClock(Cell::new(T0));
        let auth = Authenticator::new(CountingHasher::new()).with_clock(&clock);

        let mut source = Scripted::new(&["12", "abcd", "123456789"]);
        assert_eq!(auth.authenticate(&user, &policy(), &mut source), Verdict::Reject);
        assert_eq!(auth.hasher().verifies.get(), 0);

        let record = RateLimitLedger::new(&user, &clock).load().unwrap();
        assert_eq!(record.attempt_count, 3);
    }

    #[test]
    fn test_last_retry_mismatch_rejects() {
        let temp_dir = tempdir().unwrap();
        let user = enrolled(temp_dir.path(), "4242");
        let mut policy = policy();
        policy.local_retries = 2;
        let auth = Authenticator::new(CountingHasher::new());

        let mut source = Scripted::new(&["1111", "2222", "4242"]);
        assert_eq!(auth.authenticate(&user, &policy, &mut source), Verdict::Reject);
        assert_eq!(auth.hasher().verifies.get(), 2);
        assert_eq!(source.pins.len(), 1);
    }

    #[test]
    fn test_budget_exhausted_mid_call_rejects() {
        let temp_dir = tempdir().unwrap();
        let user = enrolled(temp_dir.path(), "4242");
        let mut policy = policy();
        policy.max_attempts = 1;
        let clock = TestClock(Cell::new(T0));
        let auth = Authenticator::new(CountingHasher::new()).with_clock(&clock);

        let mut source = Scripted::new(&["1111", "4242"]);
        assert_eq!(auth.authenticate(&user, &policy, &mut source), Verdict::Reject);
        assert_eq!(source.prompts.len(), 1);

        // The next call is turned away before prompting
        let mut source = Scripted::new(&["4242"]);
        assert_eq!(auth.authenticate(&user, &policy, &mut source), Verdict::Defer);
        assert!(source.prompts.is_empty());
    }

    #[test]
    fn test_locked_out_user_defers_until_expiry() {
        let temp_dir = tempdir().unwrap();
        let user = enrolled(temp_dir.path(), "4242");
        let mut policy = policy();
        policy.max_attempts = 2;
        policy.lockout_enabled = true;
        let clock = TestClock(Cell::new(T0));
        let auth = Authenticator::new(CountingHasher::new()).with_clock(&clock);

        let mut source = Scripted::new(&["1111", "2222"]);
        assert_eq!(auth.authenticate(&user, &policy, &mut source), Verdict::Reject);

        clock.0.set(T0 + 899);
        let mut source = Scripted::new(&["4242"]);
        assert_eq!(auth.authenticate(&user, &policy, &mut source), Verdict::Defer);

        clock.0.set(T0 + 901);
        let mut source = Scripted::new(&["4242"]);
        assert_eq!(auth.authenticate(&user, &policy, &mut source), Verdict::Accept);
    }

    #[test]
    fn test_unreadable_ledger_defers_before_prompt() {
        let temp_dir = tempdir().unwrap();
        let user = enrolled(temp_dir.path(), "4242");
        // A directory where the record should be cannot be read as a file
        std::fs::create_dir(user.ledger_path()).unwrap();

        let observer = RecordingObserver::default();
        let auth = Authenticator::new(CountingHasher::new()).with_observer(&observer);
        let mut source = Scripted::new(&["4242"]);

        assert_eq!(auth.authenticate(&user, &policy(), &mut source), Verdict::Defer);
        assert!(source.prompts.is_empty());
        assert_eq!(auth.hasher().verifies.get(), 0);
        assert_eq!(observer.outcomes(), vec![EventOutcome::Deferred]);
    }

    #[test]
    fn test_unwritable_ledger_rejects_without_reprompt() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        let user = enrolled(temp_dir.path(), "4242");
        // The ledger writer refuses a directory other users can write to
        std::fs::set_permissions(
            user.pinlock_dir(),
            std::fs::Permissions::from_mode(0o770),
        )
        .unwrap();

        let observer = RecordingObserver::default();
        let auth = Authenticator::new(CountingHasher::new()).with_observer(&observer);
        let mut source = Scripted::new(&["1111", "4242"]);

        assert_eq!(auth.authenticate(&user, &policy(), &mut source), Verdict::Reject);
        assert_eq!(source.prompts.len(), 1);
        assert!(!user.ledger_path().exists());
        assert_eq!(
            observer.outcomes(),
            vec![
                EventOutcome::Attempted,
                EventOutcome::Failed,
                EventOutcome::Rejected,
            ]
        );
    }

    #[test]
    fn test_suppressed_logging_does_not_change_verdict() {
        let temp_dir = tempdir().unwrap();
        let user = enrolled(temp_dir.path(), "4242");
        let mut policy = policy();
        policy.logging.attempts = false;
        policy.logging.success = false;
        policy.logging.failures = false;
        let auth = Authenticator::new(CountingHasher::new());

        let mut source = Scripted::new(&["4242"]);
        assert_eq!(auth.authenticate(&user, &policy, &mut source), Verdict::Accept);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Accept.to_string(), "accept");
        assert_eq!(Verdict::Reject.to_string(), "reject");
        assert_eq!(Verdict::Defer.to_string(), "defer");
    }
}
