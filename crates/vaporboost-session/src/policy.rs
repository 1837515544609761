//! Reconnect policy: a pure function of the error classification.

use std::time::Duration;

use vaporboost_core::{Disposition, ErrorKind, ResultCode, SessionError, Settings};

/// Outcome of a failed handshake or a lost connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Retry after `delay`; `attempt` is the new attempt count.
    Reconnect { delay: Duration, attempt: u32 },
    /// Ask for a one-time code; not a disconnect.
    Challenge { wrong_code: bool },
    /// Stop for good.
    Terminate(SessionError),
}

/// Reconnection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub standard_backoff: Duration,
    pub rate_limit_backoff: Duration,
    pub enabled: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ReconnectPolicy {
    #[must_use]
    pub const fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.max_reconnect_attempts,
            standard_backoff: settings.standard_backoff(),
            rate_limit_backoff: settings.rate_limit_backoff(),
            enabled: settings.auto_reconnect,
        }
    }

    /// Decide what a session does after `code`, having already made
    /// `attempts` reconnect attempts since it was last online.
    #[must_use]
    pub fn decide(&self, code: ResultCode, message: Option<String>, attempts: u32) -> Decision {
        let kind = ErrorKind::from_code(code);
        let delay = match kind.disposition() {
            Disposition::Interactive => {
                return Decision::Challenge {
                    wrong_code: kind == ErrorKind::WrongChallengeCode,
                };
            }
            Disposition::Fatal => {
                return Decision::Terminate(SessionError::Fatal {
                    kind,
                    code,
                    message,
                });
            }
            Disposition::RetryStandard => self.standard_backoff,
            Disposition::RetryRateLimited => self.rate_limit_backoff,
        };

        if !self.enabled {
            return Decision::Terminate(SessionError::Retryable {
                kind,
                code,
                message,
            });
        }
        if attempts >= self.max_attempts {
            return Decision::Terminate(SessionError::ReconnectLimitExceeded {
                attempts,
                last: kind,
            });
        }
        Decision::Reconnect {
            delay,
            attempt: attempts + 1,
        }
    }
}
