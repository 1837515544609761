//! Result-code classification and the errors a session can surface.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric result code reported by the connection client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCode(pub u32);

impl ResultCode {
    pub const FAIL: Self = Self(2);
    pub const NO_CONNECTION: Self = Self(3);
    pub const INVALID_PASSWORD: Self = Self(5);
    pub const LOGGED_IN_ELSEWHERE: Self = Self(6);
    pub const ACCOUNT_DISABLED: Self = Self(12);
    pub const ACCESS_DENIED: Self = Self(15);
    pub const BANNED: Self = Self(17);
    pub const ACCOUNT_NOT_FOUND: Self = Self(18);
    pub const LOGON_SESSION_REPLACED: Self = Self(34);
    pub const ACCOUNT_LOCKED: Self = Self(43);
    pub const ACCOUNT_LOGON_DENIED: Self = Self(63);
    pub const GUARD_CODE_REQUIRED: Self = Self(65);
    pub const GUARD_CODE_WRONG: Self = Self(66);
    pub const EXPIRED_AUTH_CODE: Self = Self(71);
    pub const RATE_LIMIT_EXCEEDED: Self = Self(84);
    pub const LOGIN_DENIED_NEED_TWO_FACTOR: Self = Self(85);
    pub const LOGIN_DENIED_THROTTLE: Self = Self(87);
    pub const TWO_FACTOR_CODE_MISMATCH: Self = Self(88);
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classified connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidCredential,
    AccountDisabled,
    BannedOrRestricted,
    RateLimited,
    ChallengeRequired,
    WrongChallengeCode,
    SessionSupersededElsewhere,
    Unknown,
}

/// What the session does with a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Operator action required; never retried.
    Fatal,
    /// Bounded retry after the standard backoff.
    RetryStandard,
    /// Bounded retry after the extended rate-limit backoff.
    RetryRateLimited,
    /// A required step, not a failure.
    Interactive,
}

impl ErrorKind {
    /// Classify a provider result code.
    #[must_use]
    pub const fn from_code(code: ResultCode) -> Self {
        match code {
            ResultCode::INVALID_PASSWORD | ResultCode::ACCOUNT_NOT_FOUND => Self::InvalidCredential,
            ResultCode::ACCOUNT_DISABLED
            | ResultCode::ACCOUNT_LOCKED
            | ResultCode::ACCOUNT_LOGON_DENIED => Self::AccountDisabled,
            ResultCode::ACCESS_DENIED | ResultCode::BANNED => Self::BannedOrRestricted,
            ResultCode::RATE_LIMIT_EXCEEDED | ResultCode::LOGIN_DENIED_THROTTLE => {
                Self::RateLimited
            }
            ResultCode::GUARD_CODE_REQUIRED | ResultCode::LOGIN_DENIED_NEED_TWO_FACTOR => {
                Self::ChallengeRequired
            }
            ResultCode::GUARD_CODE_WRONG
            | ResultCode::EXPIRED_AUTH_CODE
            | ResultCode::TWO_FACTOR_CODE_MISMATCH => Self::WrongChallengeCode,
            ResultCode::LOGGED_IN_ELSEWHERE | ResultCode::LOGON_SESSION_REPLACED => {
                Self::SessionSupersededElsewhere
            }
            _ => Self::Unknown,
        }
    }

    /// Retry policy for this kind.
    #[must_use]
    pub const fn disposition(self) -> Disposition {
        match self {
            Self::InvalidCredential
            | Self::AccountDisabled
            | Self::BannedOrRestricted
            | Self::SessionSupersededElsewhere => Disposition::Fatal,
            Self::RateLimited => Disposition::RetryRateLimited,
            Self::ChallengeRequired | Self::WrongChallengeCode => Disposition::Interactive,
            Self::Unknown => Disposition::RetryStandard,
        }
    }

    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self.disposition(), Disposition::Fatal)
    }

    /// Operator-facing description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::InvalidCredential => "Invalid password",
            Self::AccountDisabled => "Account disabled",
            Self::BannedOrRestricted => "Account banned or restricted",
            Self::RateLimited => "Rate limited - wait 30 min",
            Self::ChallengeRequired => "Steam Guard required",
            Self::WrongChallengeCode => "Wrong Steam Guard code",
            Self::SessionSupersededElsewhere => "Logged in elsewhere",
            Self::Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl From<ResultCode> for ErrorKind {
    fn from(code: ResultCode) -> Self {
        Self::from_code(code)
    }
}

/// Most recent failure recorded on a session.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionError {
    #[error("{kind} (code {code})")]
    Fatal {
        kind: ErrorKind,
        code: ResultCode,
        message: Option<String>,
    },
    #[error("{kind} (code {code})")]
    Retryable {
        kind: ErrorKind,
        code: ResultCode,
        message: Option<String>,
    },
    #[error("gave up after {attempts} reconnect attempts, last error: {last}")]
    ReconnectLimitExceeded { attempts: u32, last: ErrorKind },
    #[error("connection client error: {message}")]
    Client { message: String },
    #[error("challenge could not be resolved: {message}")]
    Challenge { message: String },
}

impl SessionError {
    /// Build the classified error for a reported code.
    #[must_use]
    pub fn classified(code: ResultCode, message: Option<String>) -> Self {
        let kind = ErrorKind::from_code(code);
        if kind.is_fatal() {
            Self::Fatal { kind, code, message }
        } else {
            Self::Retryable { kind, code, message }
        }
    }

    /// Classification, if the error came from a result code.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Fatal { kind, .. } | Self::Retryable { kind, .. } => Some(*kind),
            Self::ReconnectLimitExceeded { .. } | Self::Client { .. } | Self::Challenge { .. } => {
                None
            }
        }
    }

    /// Whether the error ended the session.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Fatal { .. } | Self::ReconnectLimitExceeded { .. } | Self::Challenge { .. }
        )
    }
}
