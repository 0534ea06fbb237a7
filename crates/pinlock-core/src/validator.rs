//! PIN format validation
//!
//! Runs before the hash is ever consulted so that malformed input never pays
//! for an Argon2id verification.

use thiserror::Error;

use crate::config::EffectivePolicy;

/// Why a candidate PIN was rejected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRejection {
    #[error("PIN is empty")]
    Empty,

    #[error("PIN must be at least {min} characters")]
    TooShort { min: usize },

    #[error("PIN must be at most {max} characters")]
    TooLong { max: usize },

    #[error("PIN must contain only digits")]
    NonDigit,
}

/// Check a candidate against the format policy, returning the first violation
pub fn check(candidate: &str, policy: &EffectivePolicy) -> Result<(), PinRejection> {
    if candidate.is_empty() {
        return Err(PinRejection::Empty);
    }

    let len = candidate.chars().count();
    if len < policy.min_length {
        return Err(PinRejection::TooShort {
            min: policy.min_length,
        });
    }
    if len > policy.max_length {
        return Err(PinRejection::TooLong {
            max: policy.max_length,
        });
    }

    if policy.digits_only && !candidate.chars().all(|c| c.is_ascii_digit()) {
        return Err(PinRejection::NonDigit);
    }

    Ok(())
}

/// Whether a candidate satisfies the format policy
pub fn validate(candidate: &str, policy: &EffectivePolicy) -> bool {
    check(candidate, policy).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn policy(min: usize, max: usize, digits_only: bool) -> EffectivePolicy {
        EffectivePolicy {
            min_length: min,
            max_length: max,
            digits_only,
            ..EffectivePolicy::default()
        }
    }

    #[rstest]
    #[case("", Err(PinRejection::Empty))]
    #[case("123", Err(PinRejection::TooShort { min: 4 }))]
    #[case("123456789", Err(PinRejection::TooLong { max: 8 }))]
    #[case("12a4", Err(PinRejection::NonDigit))]
    #[case("1234", Ok(()))]
    #[case("12345678", Ok(()))]
    fn test_digits_only(#[case] candidate: &str, #[case] expected: Result<(), PinRejection>) {
        assert_eq!(check(candidate, &policy(4, 8, true)), expected);
    }

    #[test]
    fn test_alphanumeric_allowed_when_not_digits_only() {
        let policy = policy(4, 8, false);
        assert!(validate("ab12", &policy));
        assert!(validate("pa ss", &policy));
        assert!(!validate("abc", &policy));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let policy = policy(4, 4, false);
        assert!(validate("éééé", &policy));
    }

    #[test]
    fn test_unicode_digits_rejected() {
        // Arabic-Indic digits are not ASCII digits
        assert!(!validate("١٢٣٤", &policy(4, 8, true)));
    }

    #[test]
    fn test_default_policy() {
        let policy = EffectivePolicy::default();
        assert!(!validate("12345", &policy));
        assert!(validate("123456", &policy));
    }
}
