//! pinlockctl - manage and test PIN authentication for local accounts

mod prompt;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pinlock_core::{
    Argon2idHasher, Authenticator, CallOverrides, ConfigResolver, CredentialStore,
    EffectivePolicy, LedgerState, RateLimitLedger, RateLimitRecord, SystemClock, UserAccount,
    Verdict, SYSTEM_CONFIG_PATH,
};

use crate::prompt::{prompt_hidden, TerminalPrompt};

/// pinlockctl - PIN authentication for this machine
#[derive(Parser)]
#[command(name = "pinlockctl")]
#[command(about = "Enroll, inspect, and test PIN authentication for local accounts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// System-wide policy file
    #[arg(long, global = true, default_value = SYSTEM_CONFIG_PATH)]
    system_config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Set a new PIN for the user
    #[command(alias = "set")]
    Enroll {
        /// Account name (defaults to the invoking user)
        user: Option<String>,
    },

    /// Remove the PIN for the user
    Remove {
        /// Account name (defaults to the invoking user)
        user: Option<String>,
    },

    /// Show whether a PIN is set and the rate-limit state
    Status {
        /// Account name (defaults to the invoking user)
        user: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective policy for the user
    Policy {
        /// Account name (defaults to the invoking user)
        user: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear the rate-limit record for the user
    Reset {
        /// Account name (defaults to the invoking user)
        user: Option<String>,
    },

    /// Authenticate interactively, exiting 0 (accept), 1 (reject) or 2 (defer)
    Auth {
        /// Account name (defaults to the invoking user)
        #[arg(short, long)]
        user: Option<String>,

        /// Module arguments: prompt=<text>, debug, retries=<n>
        module_args: Vec<String>,
    },
}

/// `status` output
#[derive(Serialize)]
struct StatusReport<'a> {
    user: &'a str,
    enrolled: bool,
    state: &'static str,
    attempts_remaining: Option<u32>,
    locked_until: Option<String>,
    record: RateLimitRecord,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.debug {
        "pinlock_core=debug,pinlockctl=debug"
    } else {
        "pinlock_core=info,pinlockctl=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let resolver = ConfigResolver::with_system_path(&cli.system_config);

    match cli.command {
        Commands::Enroll { user } => {
            let user = resolve_user(user.as_deref())?;
            let policy = resolver.resolve(&user);

            let Some(first) = prompt_hidden("Enter new PIN: ") else {
                bail!("No PIN provided");
            };
            if first.is_empty() {
                bail!("No PIN provided");
            }
            let Some(second) = prompt_hidden("Confirm PIN: ") else {
                bail!("No confirmation provided");
            };
            if *first != *second {
                bail!("PINs do not match");
            }

            CredentialStore::new(&user)
                .enroll(&first, &policy, &Argon2idHasher::default())
                .with_context(|| format!("Failed to enroll PIN for {}", user.name()))?;
            RateLimitLedger::new(&user, SystemClock)
                .reset()
                .context("Failed to clear rate-limit record")?;

            info!(user = %user.name(), "PIN enrolled");
            println!("PIN enrolled for {}", user.name());
        }

        Commands::Remove { user } => {
            let user = resolve_user(user.as_deref())?;
            let removed = CredentialStore::new(&user)
                .remove()
                .context("Failed to remove PIN")?;

            if removed {
                info!(user = %user.name(), "PIN removed");
                println!("PIN removed for {}", user.name());
            } else {
                println!("No PIN set for {}", user.name());
            }
        }

        Commands::Status { user, json } => {
            let user = resolve_user(user.as_deref())?;
            let policy = resolver.resolve(&user);
            let ledger = RateLimitLedger::new(&user, SystemClock);
            let record = ledger.load().context("Failed to read rate-limit record")?;
            let state = record.state(ledger.now(), &policy);

            let report = status_report(
                user.name(),
                CredentialStore::new(&user).is_enrolled(),
                state,
                record,
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_status(&report);
            }
        }

        Commands::Policy { user, json } => {
            let user = resolve_user(user.as_deref())?;
            let policy = resolver.resolve(&user);

            if json {
                println!("{}", serde_json::to_string_pretty(&policy)?);
            } else {
                print_policy(&policy);
            }
        }

        Commands::Reset { user } => {
            let user = resolve_user(user.as_deref())?;
            RateLimitLedger::new(&user, SystemClock)
                .reset()
                .context("Failed to clear rate-limit record")?;
            println!("Rate-limit record cleared for {}", user.name());
        }

        Commands::Auth { user, module_args } => {
            let user = resolve_user(user.as_deref())?;
            let mut policy = resolver
                .resolve(&user)
                .with_overrides(&CallOverrides::from_module_args(&module_args));
            policy.debug |= cli.debug;
            debug!(?policy, "effective policy");

            let verdict = Authenticator::new(Argon2idHasher::default()).authenticate(
                &user,
                &policy,
                &mut TerminalPrompt,
            );

            println!("{}", verdict);
            return Ok(exit_code(verdict));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn resolve_user(name: Option<&str>) -> Result<UserAccount> {
    UserAccount::resolve(name).context("Cannot resolve user account")
}

fn exit_code(verdict: Verdict) -> ExitCode {
    match verdict {
        Verdict::Accept => ExitCode::SUCCESS,
        Verdict::Reject => ExitCode::from(1),
        Verdict::Defer => ExitCode::from(2),
    }
}

fn status_report(
    user: &str,
    enrolled: bool,
    state: LedgerState,
    record: RateLimitRecord,
) -> StatusReport<'_> {
    let (state, attempts_remaining, locked_until) = match state {
        LedgerState::Active { remaining } => ("active", Some(remaining), None),
        LedgerState::Throttled => ("throttled", Some(0), None),
        LedgerState::LockedOut { until } => ("locked", None, Some(format_timestamp(until))),
    };

    StatusReport {
        user,
        enrolled,
        state,
        attempts_remaining,
        locked_until,
        record,
    }
}

fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

fn print_status(report: &StatusReport<'_>) {
    if report.enrolled {
        println!("PIN enrolled for {}", report.user);
    } else {
        println!("No PIN set for {}", report.user);
    }

    match (report.state, report.attempts_remaining, &report.locked_until) {
        ("locked", _, Some(until)) => println!("Locked out until {}", until),
        ("throttled", _, _) => println!("Attempt budget exhausted for this window"),
        (_, Some(remaining), _) => println!("{} attempts remaining", remaining),
        _ => {}
    }

    if report.record.lockout_count > 0 {
        println!("Lockouts so far: {}", report.record.lockout_count);
    }
}

fn print_policy(policy: &EffectivePolicy) {
    println!("min_length={}", policy.min_length);
    println!("max_length={}", policy.max_length);
    println!("digits_only={}", policy.digits_only);
    println!("max_attempts={}", policy.max_attempts);
    println!("rate_limit_window={}", policy.rate_limit_window);
    println!("lockout_enabled={}", policy.lockout_enabled);
    println!("lockout_duration={}", policy.lockout_duration);
    println!("local_retries={}", policy.local_retries);
    println!("log_attempts={}", policy.logging.attempts);
    println!("log_success={}", policy.logging.success);
    println!("log_failures={}", policy.logging.failures);
    println!("debug={}", policy.debug);
}
