//! Credential record storage
//!
//! One file per user holding the encoded hash of the enrolled PIN on its
//! first line. The authentication path only ever reads it.

use std::fs;
use std::io::ErrorKind;

use tracing::debug;
use zeroize::Zeroizing;

use crate::account::UserAccount;
use crate::config::EffectivePolicy;
use crate::error::{PinlockError, Result};
use crate::hasher::PinHasher;
use crate::storage;
use crate::validator;

/// Reads and writes a user's credential record
pub struct CredentialStore<'a> {
    user: &'a UserAccount,
}

impl<'a> CredentialStore<'a> {
    pub fn new(user: &'a UserAccount) -> Self {
        Self { user }
    }

    /// Whether a credential record exists
    pub fn is_enrolled(&self) -> bool {
        fs::metadata(self.user.credential_path())
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Load the encoded hash
    ///
    /// - no record: [`PinlockError::NotEnrolled`]
    /// - empty or non-text record: [`PinlockError::CorruptCredential`]
    /// - any other I/O failure: [`PinlockError::StorageUnavailable`]
    pub fn load(&self) -> Result<Zeroizing<String>> {
        let path = self.user.credential_path();

        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PinlockError::NotEnrolled(self.user.name().to_string()))
            }
            Err(e) => return Err(PinlockError::StorageUnavailable(e.to_string())),
        };
        if !meta.is_file() {
            debug!(path = %path.display(), "credential path is not a regular file");
            return Err(PinlockError::NotEnrolled(self.user.name().to_string()));
        }

        let raw = Zeroizing::new(
            fs::read(&path).map_err(|e| PinlockError::StorageUnavailable(e.to_string()))?,
        );

        let line_end = raw.iter().position(|&b| b == b'\n').unwrap_or(raw.len());
        let mut line = &raw[..line_end];
        while let [rest @ .., b'\r' | b'\n'] = line {
            line = rest;
        }

        let encoded = std::str::from_utf8(line)
            .map_err(|_| PinlockError::CorruptCredential(self.user.name().to_string()))?;
        if encoded.is_empty() {
            return Err(PinlockError::CorruptCredential(self.user.name().to_string()));
        }

        Ok(Zeroizing::new(encoded.to_string()))
    }

    /// Write an already-encoded hash
    pub fn store(&self, encoded: &str) -> Result<()> {
        let contents = Zeroizing::new(format!("{}\n", encoded));
        storage::write_private(self.user, &self.user.credential_path(), contents.as_bytes())
    }

    /// Validate, hash, and store a new PIN, replacing any existing one
    pub fn enroll<H: PinHasher>(
        &self,
        pin: &str,
        policy: &EffectivePolicy,
        hasher: &H,
    ) -> Result<()> {
        validator::check(pin, policy)?;

        let encoded = Zeroizing::new(hasher.hash(pin.as_bytes())?);
        self.store(&encoded)?;

        debug!(user = %self.user.name(), "credential stored");
        Ok(())
    }

    /// Delete the credential; returns whether one existed
    pub fn remove(&self) -> Result<bool> {
        storage::remove_if_present(self.user, &self.user.credential_path())
    }
}
