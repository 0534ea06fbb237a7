//! Error types for pinlock

use thiserror::Error;

use crate::authenticator::Verdict;
use crate::validator::PinRejection;

/// Result type alias for pinlock operations
pub type Result<T> = std::result::Result<T, PinlockError>;

/// Errors that can occur while authenticating or managing a PIN
#[derive(Debug, Error)]
pub enum PinlockError {
    /// No credential on record for the user
    #[error("No PIN enrolled for {0}")]
    NotEnrolled(String),

    /// Credential record exists but is empty or unreadable
    #[error("Credential record for {0} is corrupt")]
    CorruptCredential(String),

    /// Candidate failed the format policy
    #[error("PIN rejected: {0}")]
    FormatInvalid(#[from] PinRejection),

    /// Hash comparison did not match
    #[error("PIN does not match")]
    VerifyMismatch,

    /// Ledger or credential storage could not be read or written
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Record directory or path is not private to the user
    #[error("Refusing insecure storage: {0}")]
    InsecureStorage(String),

    /// The secret source could not produce a candidate
    #[error("No PIN was provided")]
    InputUnavailable,

    /// Username has no passwd entry
    #[error("Unknown user: {0}")]
    UserNotFound(String),

    /// Username cannot be used as a storage key
    #[error("Invalid username: {0:?}")]
    InvalidUser(String),

    /// Hashing primitive failure
    #[error("Hash error: {0}")]
    Hash(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PinlockError {
    /// The verdict a host shim should see when this error ends a call
    pub fn verdict(&self) -> Verdict {
        match self {
            PinlockError::NotEnrolled(_) | PinlockError::StorageUnavailable(_) => Verdict::Defer,
            _ => Verdict::Reject,
        }
    }

    /// Whether this error consumes part of the guessing budget
    pub fn counts_as_failure(&self) -> bool {
        matches!(
            self,
            PinlockError::FormatInvalid(_) | PinlockError::VerifyMismatch
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_mapping() {
        assert_eq!(
            PinlockError::NotEnrolled("alice".into()).verdict(),
            Verdict::Defer
        );
        assert_eq!(
            PinlockError::StorageUnavailable("disk".into()).verdict(),
            Verdict::Defer
        );
        assert_eq!(
            PinlockError::CorruptCredential("alice".into()).verdict(),
            Verdict::Reject
        );
        assert_eq!(PinlockError::InputUnavailable.verdict(), Verdict::Reject);
        assert_eq!(
            PinlockError::InsecureStorage("~/.pinlock".into()).verdict(),
            Verdict::Reject
        );
        assert_eq!(PinlockError::VerifyMismatch.verdict(), Verdict::Reject);
    }

    #[test]
    fn test_failure_accounting() {
        assert!(PinlockError::VerifyMismatch.counts_as_failure());
        assert!(PinlockError::FormatInvalid(PinRejection::Empty).counts_as_failure());
        assert!(!PinlockError::InputUnavailable.counts_as_failure());
        assert!(!PinlockError::CorruptCredential("bob".into()).counts_as_failure());
    }

    #[test]
    fn test_error_display() {
        let err = PinlockError::NotEnrolled("alice".into());
        assert!(err.to_string().contains("alice"));
    }
}
