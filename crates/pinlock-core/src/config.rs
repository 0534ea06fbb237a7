//! Layered policy configuration
//!
//! The effective policy for a call is a fold over three layers:
//!
//! 1. built-in defaults
//! 2. the system file (`/etc/security/pinlock.conf`)
//! 3. the user file (`~/.pinlock/pinlock.conf`)
//!
//! Each layer is `key=value` text. A key that is missing or does not parse at
//! some layer keeps the value from the layer beneath it, so resolution never
//! fails and never produces an out-of-range policy.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::account::UserAccount;
use crate::{DEFAULT_PROMPT, SYSTEM_CONFIG_PATH};

/// Which authentication events are emitted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LoggingPolicy {
    /// Emit an event for every attempt, including failed ones
    pub attempts: bool,
    /// Emit an event when a PIN is accepted
    pub success: bool,
    /// Emit an event when a call ends in rejection
    pub failures: bool,
}

impl Default for LoggingPolicy {
    fn default() -> Self {
        Self {
            attempts: true,
            success: true,
            failures: true,
        }
    }
}

/// Fully resolved policy for one authentication call
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EffectivePolicy {
    /// Minimum PIN length in characters
    pub min_length: usize,
    /// Maximum PIN length in characters
    pub max_length: usize,
    /// Reject PINs containing anything but ASCII digits
    pub digits_only: bool,
    /// Failures allowed per rate-limit window
    pub max_attempts: u32,
    /// Rate-limit window in seconds
    pub rate_limit_window: u64,
    /// Enter a timed lockout when the budget is spent
    pub lockout_enabled: bool,
    /// Lockout duration in seconds
    pub lockout_duration: u64,
    /// In-process prompts per call
    pub local_retries: u32,
    /// Event emission flags
    pub logging: LoggingPolicy,
    /// Emit debug-level diagnostics
    pub debug: bool,
    /// Prompt handed to the secret source
    pub prompt: String,
}

impl Default for EffectivePolicy {
    fn default() -> Self {
        Self {
            min_length: 6,
            max_length: 32,
            digits_only: true,
            max_attempts: 5,
            rate_limit_window: 60,
            lockout_enabled: false,
            lockout_duration: 900,
            local_retries: 3,
            logging: LoggingPolicy::default(),
            debug: false,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

/// Recognized configuration keys
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Key {
    MinLength,
    MaxLength,
    DigitsOnly,
    MaxAttempts,
    RateLimitWindow,
    LockoutEnabled,
    LockoutDuration,
    LocalRetries,
    LogAttempts,
    LogSuccess,
    LogFailures,
    Debug,
}

impl Key {
    fn parse(raw: &str) -> Option<Self> {
        let key = match raw {
            "min_length" | "minLength" => Key::MinLength,
            "max_length" | "maxLength" => Key::MaxLength,
            "digits_only" | "digitsOnly" => Key::DigitsOnly,
            "max_attempts" | "maxAttempts" => Key::MaxAttempts,
            "rate_limit_window" | "rateLimitWindowSeconds" => Key::RateLimitWindow,
            "lockout_enabled" | "lockoutEnabled" => Key::LockoutEnabled,
            "lockout_duration" | "lockoutDurationSeconds" => Key::LockoutDuration,
            "local_retries" | "localRetries" => Key::LocalRetries,
            "log_attempts" | "logAttempts" => Key::LogAttempts,
            "log_success" | "logSuccess" => Key::LogSuccess,
            "log_failures" | "logFailures" => Key::LogFailures,
            "debug" => Key::Debug,
            _ => return None,
        };
        Some(key)
    }
}

/// Parse a boolean; only a fixed set of truthy tokens count as true
pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse an unsigned integer, allowing surrounding whitespace and a leading `+`
pub fn parse_uint<T: std::str::FromStr>(raw: &str) -> Option<T> {
    let raw = raw.trim();
    raw.strip_prefix('+').unwrap_or(raw).parse().ok()
}

/// Parse one layer of `key=value` text
///
/// Comment and blank lines are skipped, lines without `=` are ignored, and a
/// key repeated within the layer keeps its last value.
pub fn parse_layer(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

impl EffectivePolicy {
    /// Apply one parsed layer on top of this policy
    pub fn apply_layer(&self, layer: &HashMap<String, String>) -> Self {
        let mut next = self.clone();

        for (raw_key, value) in layer {
            let Some(key) = Key::parse(raw_key) else {
                debug!(key = %raw_key, "ignoring unknown config key");
                continue;
            };

            match key {
                Key::MinLength => {
                    next.min_length = parse_uint(value).filter(|&n| n >= 1).unwrap_or(next.min_length)
                }
                Key::MaxLength => {
                    next.max_length = parse_uint(value).filter(|&n| n >= 1).unwrap_or(next.max_length)
                }
                Key::DigitsOnly => next.digits_only = parse_bool(value),
                Key::MaxAttempts => {
                    next.max_attempts =
                        parse_uint(value).filter(|&n| n >= 1).unwrap_or(next.max_attempts)
                }
                Key::RateLimitWindow => {
                    next.rate_limit_window = parse_uint(value).unwrap_or(next.rate_limit_window)
                }
                Key::LockoutEnabled => next.lockout_enabled = parse_bool(value),
                Key::LockoutDuration => {
                    next.lockout_duration = parse_uint(value).unwrap_or(next.lockout_duration)
                }
                Key::LocalRetries => {
                    next.local_retries =
                        parse_uint(value).filter(|&n| n >= 1).unwrap_or(next.local_retries)
                }
                Key::LogAttempts => next.logging.attempts = parse_bool(value),
                Key::LogSuccess => next.logging.success = parse_bool(value),
                Key::LogFailures => next.logging.failures = parse_bool(value),
                Key::Debug => next.debug = parse_bool(value),
            }
        }

        // Length bounds are only meaningful as a pair
        if next.min_length > next.max_length {
            debug!(
                min = next.min_length,
                max = next.max_length,
                "discarding inverted length bounds"
            );
            next.min_length = self.min_length;
            next.max_length = self.max_length;
        }

        next
    }

    /// Fold layer texts over the built-in defaults, lowest priority first
    pub fn from_layers<'a>(layers: impl IntoIterator<Item = &'a str>) -> Self {
        layers
            .into_iter()
            .fold(Self::default(), |acc, text| acc.apply_layer(&parse_layer(text)))
    }

    /// Apply per-call overrides
    pub fn with_overrides(mut self, overrides: &CallOverrides) -> Self {
        if let Some(prompt) = &overrides.prompt {
            self.prompt = prompt.clone();
        }
        if let Some(debug) = overrides.debug {
            self.debug = debug;
        }
        if let Some(retries) = overrides.local_retries {
            self.local_retries = retries;
        }
        self
    }
}

/// Overrides a host passes for a single call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallOverrides {
    pub prompt: Option<String>,
    pub debug: Option<bool>,
    pub local_retries: Option<u32>,
}

impl CallOverrides {
    /// Parse module-style arguments: `prompt=<text>`, `debug`, `retries=<n>`
    pub fn from_module_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = Self::default();

        for arg in args {
            let arg = arg.as_ref();
            if let Some(prompt) = arg.strip_prefix("prompt=") {
                overrides.prompt = Some(prompt.to_string());
            } else if arg == "debug" {
                overrides.debug = Some(true);
            } else if let Some(n) = arg
                .strip_prefix("retries=")
                .or_else(|| arg.strip_prefix("local_retries="))
            {
                match parse_uint::<u32>(n).filter(|&n| n >= 1) {
                    Some(n) => overrides.local_retries = Some(n),
                    None => debug!(arg, "ignoring invalid retries override"),
                }
            } else {
                debug!(arg, "ignoring unknown module argument");
            }
        }

        overrides
    }
}

/// Resolves the effective policy for a user from the on-disk layers
#[derive(Clone, Debug)]
pub struct ConfigResolver {
    system_path: PathBuf,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self {
            system_path: PathBuf::from(SYSTEM_CONFIG_PATH),
        }
    }
}

impl ConfigResolver {
    /// Create a resolver with a custom system layer path
    pub fn with_system_path(path: impl Into<PathBuf>) -> Self {
        Self {
            system_path: path.into(),
        }
    }

    /// Path of the system-wide layer
    pub fn system_path(&self) -> &Path {
        &self.system_path
    }

    /// Resolve the effective policy; unreadable layers contribute nothing
    pub fn resolve(&self, user: &UserAccount) -> EffectivePolicy {
        let system = read_layer(&self.system_path);
        let personal = read_layer(&user.config_path());

        EffectivePolicy::from_layers(
            [system.as_deref(), personal.as_deref()]
                .into_iter()
                .flatten(),
        )
    }
}

fn read_layer(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "config layer unreadable");
            None
        }
    }
}
