//! Pinlock Core - PIN verification and adaptive rate limiting
//!
//! This crate decides, for a given local user and a submitted PIN, whether a
//! login attempt is accepted, rejected, or deferred to another authentication
//! method. It keeps two durable records per user:
//!
//! - the credential: an Argon2id encoded hash of the enrolled PIN
//! - the rate-limit ledger: failure counters and lockout timestamps
//!
//! Both live in `~/.pinlock/` with owner-only permissions. Every call re-reads
//! them from disk; nothing is cached between login attempts.
//!
//! # Example
//!
//! ```no_run
//! use pinlock_core::{
//!     Argon2idHasher, Authenticator, ConfigResolver, SecretSource, UserAccount, Verdict,
//! };
//! use zeroize::Zeroizing;
//!
//! struct Fixed(Option<&'static str>);
//!
//! impl SecretSource for Fixed {
//!     fn next_secret(&mut self, _prompt: &str) -> Option<Zeroizing<String>> {
//!         self.0.take().map(|pin| Zeroizing::new(pin.to_string()))
//!     }
//! }
//!
//! let user = UserAccount::lookup("alice")?;
//! let policy = ConfigResolver::default().resolve(&user);
//! let auth = Authenticator::new(Argon2idHasher::default());
//!
//! match auth.authenticate(&user, &policy, &mut Fixed(Some("424242"))) {
//!     Verdict::Accept => println!("welcome"),
//!     Verdict::Reject => println!("wrong PIN"),
//!     Verdict::Defer => println!("try your password"),
//! }
//! # Ok::<(), pinlock_core::PinlockError>(())
//! ```

pub mod account;
pub mod authenticator;
pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod events;
pub mod hasher;
pub mod ledger;
mod storage;
pub mod validator;

pub use account::UserAccount;
pub use authenticator::{Authenticator, SecretSource, Verdict};
pub use clock::{Clock, SystemClock};
pub use config::{CallOverrides, ConfigResolver, EffectivePolicy, LoggingPolicy};
pub use credential::CredentialStore;
pub use error::{PinlockError, Result};
pub use events::{AuthEvent, AuthObserver, EventOutcome, TracingObserver};
pub use hasher::{Argon2idHasher, PinHasher};
pub use ledger::{LedgerState, LedgerVerdict, Outcome, RateLimitLedger, RateLimitRecord};
pub use validator::{validate, PinRejection};

/// Per-user storage directory, relative to the home directory
pub const PINLOCK_DIR: &str = ".pinlock";

/// Credential record file suffix (`<user>.pin`)
pub const CREDENTIAL_SUFFIX: &str = "pin";

/// Rate-limit record file suffix (`<user>.ratelimit`)
pub const LEDGER_SUFFIX: &str = "ratelimit";

/// Per-user configuration layer file name
pub const USER_CONFIG_FILE: &str = "pinlock.conf";

/// System-wide configuration layer
pub const SYSTEM_CONFIG_PATH: &str = "/etc/security/pinlock.conf";

/// Prompt shown when no override is configured
pub const DEFAULT_PROMPT: &str = "PIN (this machine): ";
