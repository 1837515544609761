//! Steam Guard one-time codes derived from a shared secret.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use thiserror::Error;

/// Alphabet used by Steam Guard codes.
const CODE_CHARS: &[u8; 26] = b"23456789BCDFGHJKMNPQRTVWXY";

/// Length of a generated code.
const CODE_LEN: usize = 5;

/// Seconds each code stays valid.
const PERIOD_SECS: u64 = 30;

/// Code derivation error.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Shared secret is not valid base64")]
    InvalidSeed,
    #[error("System clock is before the Unix epoch")]
    Clock,
}

/// Derives a one-time code from an account's two-factor seed.
pub trait CodeGenerator: Send + Sync {
    /// Generate the code valid now.
    ///
    /// # Errors
    /// Returns error if the seed cannot be used.
    fn generate(&self, seed: &SecretString) -> Result<SecretString, GuardError>;
}

/// Steam Guard TOTP: HMAC-SHA1 over 30-second windows, five characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SteamGuardTotp {
    /// Seconds added to the local clock, for hosts with drift.
    pub time_offset: i64,
}

impl SteamGuardTotp {
    #[must_use]
    pub const fn new() -> Self {
        Self { time_offset: 0 }
    }

    #[must_use]
    pub const fn with_time_offset(time_offset: i64) -> Self {
        Self { time_offset }
    }

    /// Code for a given Unix time.
    ///
    /// # Errors
    /// Returns error if the seed is not base64.
    pub fn code_at(seed: &SecretString, unix_secs: u64) -> Result<SecretString, GuardError> {
        let key = BASE64
            .decode(seed.expose_secret().trim())
            .map_err(|_| GuardError::InvalidSeed)?;

        let mut mac = Hmac::<Sha1>::new_from_slice(&key).map_err(|_| GuardError::InvalidSeed)?;
        mac.update(&(unix_secs / PERIOD_SECS).to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let start = usize::from(digest[19] & 0x0f);
        let mut full = u32::from_be_bytes([
            digest[start],
            digest[start + 1],
            digest[start + 2],
            digest[start + 3],
        ]) & 0x7fff_ffff;

        let mut code = String::with_capacity(CODE_LEN);
        for _ in 0..CODE_LEN {
            code.push(char::from(CODE_CHARS[(full % 26) as usize]));
            full /= 26;
        }
        Ok(SecretString::from(code))
    }

    fn now(&self) -> Result<u64, GuardError> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| GuardError::Clock)?
            .as_secs();
        secs.checked_add_signed(self.time_offset)
            .ok_or(GuardError::Clock)
    }
}

impl CodeGenerator for SteamGuardTotp {
    fn generate(&self, seed: &SecretString) -> Result<SecretString, GuardError> {
        Self::code_at(seed, self.now()?)
    }
}
