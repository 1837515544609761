//! Capability traits consumed by the session layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    account::{Account, AccountId, ActivitySlots, VisibilityMode},
    error::ResultCode,
    settings::{Settings, SettingsError},
};

/// Where the provider sent the one-time code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    /// Code mailed to the account's address.
    Email,
    /// Code from the mobile authenticator.
    MobileAuthenticator,
}

/// Credentials for one handshake.
#[derive(Debug, Clone)]
pub struct LogOnDetails {
    pub account_id: AccountId,
    pub credential: SecretString,
    /// One-time code attached when the handshake starts.
    pub two_factor_code: Option<SecretString>,
}

/// Lifecycle event emitted by a connection client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The provider wants a one-time code.
    ChallengeRequested {
        kind: ChallengeKind,
        domain_hint: Option<String>,
        last_code_wrong: bool,
    },
    /// Handshake completed.
    Connected,
    /// Connection lost, or the handshake was rejected.
    Disconnected {
        code: ResultCode,
        message: Option<String>,
    },
    MessageReceived { from: String, text: String },
    WalletInfo {
        has_wallet: bool,
        currency: u32,
        balance_cents: i64,
    },
    RestrictionInfo { vac_bans: u32 },
}

/// Connection client error.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Handshake failed: {message}")]
    Handshake {
        code: Option<ResultCode>,
        message: String,
    },
    #[error("Not connected")]
    NotConnected,
    #[error("Command failed: {0}")]
    Command(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Result code carried by the error, if any.
    #[must_use]
    pub const fn code(&self) -> Option<ResultCode> {
        match self {
            Self::Handshake { code, .. } => *code,
            Self::NotConnected | Self::Command(_) | Self::Io(_) => None,
        }
    }
}

/// One account's connection to the provider.
///
/// Implementations wrap the provider SDK. Outcomes of `connect` and
/// `submit_code` arrive through `next_event`.
#[async_trait]
pub trait ConnectionClient: Send {
    /// Start a handshake.
    async fn connect(&mut self, details: LogOnDetails) -> Result<(), ClientError>;

    /// Answer a pending challenge.
    async fn submit_code(&mut self, code: SecretString) -> Result<(), ClientError>;

    /// Wait for the next lifecycle event.
    ///
    /// Must be cancel-safe: the session polls it inside `select!`.
    /// Returns `None` once the client can emit no more events.
    async fn next_event(&mut self) -> Option<ClientEvent>;

    async fn set_visibility(&mut self, mode: VisibilityMode) -> Result<(), ClientError>;

    /// Replace the full activity list shown by the provider.
    async fn set_activity_slots(&mut self, slots: &ActivitySlots) -> Result<(), ClientError>;

    async fn send_message(&mut self, to: &str, text: &str) -> Result<(), ClientError>;

    /// Log off.
    async fn disconnect_gracefully(&mut self) -> Result<(), ClientError>;
}

/// Creates a connection client per session.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(&self, account: &Account) -> Result<Box<dyn ConnectionClient>, ClientError>;
}

/// Credential store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for account and settings storage backends.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load every configured account, in stored order.
    async fn load_accounts(&self) -> Result<Vec<Account>, StoreError>;

    async fn load_settings(&self) -> Result<Settings, StoreError>;

    /// Insert or replace an account, matching ids case-insensitively.
    async fn save_account(&self, account: &Account) -> Result<(), StoreError>;

    /// Remove an account. Returns whether it existed.
    async fn remove_account(&self, id: &AccountId) -> Result<bool, StoreError>;

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError>;
}

/// Inbound message handed to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub account_id: AccountId,
    pub from: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// Message sink error.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink closed")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Append-only log of inbound messages.
///
/// `append` must return promptly; slow writes belong on a background task.
pub trait MessageSink: Send + Sync {
    fn append(&self, message: InboundMessage) -> Result<(), SinkError>;
}
