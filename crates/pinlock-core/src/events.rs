//! Authentication events
//!
//! Emission is informational only; an observer can never influence a verdict.

use tracing::{debug, info, warn};

use crate::config::{EffectivePolicy, LoggingPolicy};

/// What an event reports
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    /// A candidate was obtained and is about to be checked
    Attempted,
    /// A single attempt failed (malformed or wrong PIN)
    Failed,
    /// The call ended in Accept
    Accepted,
    /// The call ended in Reject
    Rejected,
    /// The call ended in Defer
    Deferred,
}

/// Structured authentication event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthEvent {
    pub user: String,
    pub outcome: EventOutcome,
    /// 1-based attempt index within the call; 0 before the first prompt
    pub attempt: u32,
    pub reason: Option<String>,
    /// Emission flags from the policy in force
    pub logging: LoggingPolicy,
    pub debug: bool,
}

impl AuthEvent {
    pub fn new(user: &str, outcome: EventOutcome, attempt: u32, policy: &EffectivePolicy) -> Self {
        Self {
            user: user.to_string(),
            outcome,
            attempt,
            reason: None,
            logging: policy.logging,
            debug: policy.debug,
        }
    }

    pub fn with_reason(mut self, reason: impl ToString) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    /// Whether the policy asks for this event to be emitted
    pub fn is_enabled(&self) -> bool {
        match self.outcome {
            EventOutcome::Attempted | EventOutcome::Deferred => self.logging.attempts,
            EventOutcome::Failed | EventOutcome::Rejected => self.logging.failures,
            EventOutcome::Accepted => self.logging.success,
        }
    }
}

/// Receives authentication events
pub trait AuthObserver {
    fn record(&self, event: &AuthEvent);
}

/// Emits enabled events through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl AuthObserver for TracingObserver {
    fn record(&self, event: &AuthEvent) {
        if !event.is_enabled() {
            if event.debug {
                debug!(user = %event.user, outcome = ?event.outcome, "event suppressed by policy");
            }
            return;
        }

        let reason = event.reason.as_deref().unwrap_or("");
        match event.outcome {
            EventOutcome::Accepted => {
                info!(user = %event.user, attempt = event.attempt, "PIN accepted")
            }
            EventOutcome::Rejected => {
                warn!(user = %event.user, attempt = event.attempt, reason, "PIN rejected")
            }
            EventOutcome::Failed => {
                warn!(user = %event.user, attempt = event.attempt, reason, "PIN attempt failed")
            }
            EventOutcome::Deferred => {
                info!(user = %event.user, attempt = event.attempt, reason, "PIN authentication deferred")
            }
            EventOutcome::Attempted => {
                if event.debug {
                    info!(user = %event.user, attempt = event.attempt, "PIN attempt")
                } else {
                    debug!(user = %event.user, attempt = event.attempt, "PIN attempt")
                }
            }
        }
    }
}

impl<O: AuthObserver + ?Sized> AuthObserver for &O {
    fn record(&self, event: &AuthEvent) {
        (**self).record(event)
    }
}
