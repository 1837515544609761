//! Point-in-time views of session state for observers.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    account::{AccountId, VisibilityMode},
    error::SessionError,
};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No connection attempt made yet.
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Waiting for a one-time code or an out-of-band approval.
    AwaitingChallenge,
    Online,
    Disconnected,
    /// Waiting out the backoff before the next handshake.
    Reconnecting,
    Terminated,
}

impl SessionState {
    #[must_use]
    pub const fn is_terminated(self) -> bool {
        matches!(self, Self::Terminated)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::AwaitingChallenge => "GUARD",
            Self::Online => "ONLINE",
            Self::Disconnected => "OFFLINE",
            Self::Reconnecting => "RECONNECTING",
            Self::Terminated => "STOPPED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a session reached `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Stopped by an explicit request.
    Requested,
    /// Ended by a fatal or exhausted error; see `last_error`.
    Failed,
}

/// Per-session snapshot entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub account_id: AccountId,
    /// Distinguishes successive sessions for the same account.
    pub session_id: Uuid,
    pub state: SessionState,
    #[serde(rename = "online_seconds", with = "duration_secs")]
    pub online_duration: Duration,
    pub active_slot_count: usize,
    pub active_app_count: usize,
    pub visibility: VisibilityMode,
    pub reconnect_attempts: u32,
    pub last_error: Option<SessionError>,
    pub termination: Option<Termination>,
}

impl SessionSnapshot {
    /// Terminated because of an error rather than a stop request.
    #[must_use]
    pub const fn failed(&self) -> bool {
        matches!(self.termination, Some(Termination::Failed))
    }
}

/// Cumulative counters for the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub messages_received: u64,
    pub reconnections: u64,
    pub errors: u64,
}

/// Everything an observer needs in one read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    #[serde(rename = "uptime_seconds", with = "duration_secs")]
    pub uptime: Duration,
    pub sessions: Vec<SessionSnapshot>,
    pub counters: CounterSnapshot,
}

impl ManagerSnapshot {
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.state == SessionState::Online)
            .count()
    }

    /// Summarize the run for lifetime statistics.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let online: Duration = self.sessions.iter().map(|s| s.online_duration).sum();
        RunSummary {
            duration: self.uptime,
            accounts: self.sessions.len(),
            apps: self.sessions.iter().map(|s| s.active_app_count).sum(),
            hours_gained: online.as_secs_f64() / 3600.0,
            messages: self.counters.messages_received,
            errors: self.counters.errors,
        }
    }
}

/// Totals recorded at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(rename = "duration_seconds", with = "duration_secs")]
    pub duration: Duration,
    pub accounts: usize,
    pub apps: usize,
    pub hours_gained: f64,
    pub messages: u64,
    pub errors: u64,
}

/// Serialize a `Duration` as whole seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    /// # Errors
    /// Propagates deserializer errors.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
