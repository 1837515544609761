//! Global settings shared by every session.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::VisibilityMode;

/// Settings validation error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("rate-limit backoff ({rate_limited_ms}ms) must not be shorter than standard backoff ({standard_ms}ms)")]
    BackoffOrder { standard_ms: u64, rate_limited_ms: u64 },
}

/// Orchestration settings.
///
/// Every field has a default, so partial settings files merge cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Delay between successive logins in a bulk start.
    #[serde(alias = "startupDelay")]
    pub startup_spacing_ms: u64,
    /// Retryable disconnects tolerated before a session gives up.
    pub max_reconnect_attempts: u32,
    /// Delay before reconnecting after a transient failure.
    pub standard_backoff_ms: u64,
    /// Delay before reconnecting after the provider rate-limited us.
    pub rate_limit_backoff_ms: u64,
    /// Visibility for accounts that do not set their own.
    pub default_visibility: VisibilityMode,
    /// Reconnect automatically after retryable disconnects.
    pub auto_reconnect: bool,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            startup_spacing_ms: 2_000,
            max_reconnect_attempts: 5,
            standard_backoff_ms: 5_000,
            rate_limit_backoff_ms: 30 * 60 * 1_000,
            default_visibility: VisibilityMode::Visible,
            auto_reconnect: true,
            debug: false,
        }
    }
}

/// Settings file as written by older releases, which used a boolean for visibility.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyFlags {
    #[serde(default)]
    invisible_mode: Option<bool>,
}

impl Settings {
    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns error if the rate-limit backoff is shorter than the standard backoff.
    pub const fn validate(&self) -> Result<(), SettingsError> {
        if self.rate_limit_backoff_ms < self.standard_backoff_ms {
            return Err(SettingsError::BackoffOrder {
                standard_ms: self.standard_backoff_ms,
                rate_limited_ms: self.rate_limit_backoff_ms,
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn startup_spacing(&self) -> Duration {
        Duration::from_millis(self.startup_spacing_ms)
    }

    #[must_use]
    pub const fn standard_backoff(&self) -> Duration {
        Duration::from_millis(self.standard_backoff_ms)
    }

    #[must_use]
    pub const fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    /// Parse a settings document, honouring the legacy `invisibleMode` flag.
    ///
    /// # Errors
    /// Returns error if the document is not valid settings JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut settings: Self = serde_json::from_str(json)?;
        let legacy: LegacyFlags = serde_json::from_str(json)?;
        if legacy.invisible_mode == Some(true) {
            settings.default_visibility = VisibilityMode::Invisible;
        }
        Ok(settings)
    }
}
