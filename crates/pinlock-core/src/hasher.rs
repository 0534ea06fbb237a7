//! PIN hashing primitive
//!
//! The rest of the crate treats the encoded hash as an opaque string and only
//! talks to it through [`PinHasher`].

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::{PinlockError, Result};

/// Memory cost in KiB (64 MiB)
pub const DEFAULT_MEMORY_KIB: u32 = 1 << 16;
/// Iterations
pub const DEFAULT_TIME_COST: u32 = 3;
/// Lanes
pub const DEFAULT_PARALLELISM: u32 = 1;
/// Digest length in bytes
pub const OUTPUT_LEN: usize = 32;

/// Opaque hash/verify primitive
pub trait PinHasher {
    /// Hash a secret with a fresh random salt into a self-describing string
    fn hash(&self, secret: &[u8]) -> Result<String>;

    /// Check a secret against an encoded hash; malformed hashes never match
    fn verify(&self, encoded: &str, secret: &[u8]) -> bool;
}

/// Argon2id with a 16-byte salt and 32-byte digest
#[derive(Clone, Debug)]
pub struct Argon2idHasher {
    params: Params,
}

impl Default for Argon2idHasher {
    fn default() -> Self {
        Self {
            params: Params::new(
                DEFAULT_MEMORY_KIB,
                DEFAULT_TIME_COST,
                DEFAULT_PARALLELISM,
                Some(OUTPUT_LEN),
            )
            .unwrap_or_default(),
        }
    }
}

impl Argon2idHasher {
    /// Create a hasher with custom cost parameters
    pub fn with_params(memory_kib: u32, time_cost: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, time_cost, parallelism, Some(OUTPUT_LEN))
            .map_err(|e| PinlockError::Hash(format!("Invalid Argon2 parameters: {}", e)))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PinHasher for Argon2idHasher {
    fn hash(&self, secret: &[u8]) -> Result<String> {
        // SaltString defaults to 16 random bytes
        let salt = SaltString::generate(&mut OsRng);
        let secret = Zeroizing::new(secret.to_vec());

        let hash = self
            .argon2()
            .hash_password(&secret, &salt)
            .map_err(|e| PinlockError::Hash(format!("Failed to hash PIN: {}", e)))?
            .to_string();

        Ok(hash)
    }

    fn verify(&self, encoded: &str, secret: &[u8]) -> bool {
        let Ok(parsed) = PasswordHash::new(encoded) else {
            return false;
        };

        // Parameters come from the encoded string, not from self
        Argon2::default().verify_password(secret, &parsed).is_ok()
    }
}
