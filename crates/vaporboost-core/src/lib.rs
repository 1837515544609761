//! Core abstractions for multi-account session orchestration.
//!
//! This crate provides the fundamental building blocks:
//! - `Account`, `ActivitySlots`, `Settings` - The data model
//! - `ErrorKind` - Result-code classification and retry disposition
//! - `SessionFeed` - Broadcast + history of session events
//! - Connection client, credential store and message sink traits

pub mod account;
pub mod error;
pub mod feed;
pub mod settings;
pub mod snapshot;
pub mod traits;

pub use account::{Account, AccountId, ActivitySlot, ActivitySlots, VisibilityMode};
pub use error::{Disposition, ErrorKind, ResultCode, SessionError};
pub use feed::{SessionEvent, SessionEventKind, SessionFeed};
pub use settings::Settings;
pub use snapshot::{CounterSnapshot, ManagerSnapshot, RunSummary, SessionSnapshot, SessionState};
pub use traits::{ConnectionClient, ConnectionFactory, CredentialStore, MessageSink};
