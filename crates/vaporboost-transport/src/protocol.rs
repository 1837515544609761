//! Wire protocol for observers.

use serde::{Deserialize, Serialize};
use tracing::debug;
use vaporboost_core::{AccountId, ActivitySlots, ManagerSnapshot, SessionEvent};

use crate::control::SessionControl;

/// Message from an observer to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ping for keepalive.
    Ping,
    /// Request the current report.
    Snapshot,
    StopAccount { account_id: AccountId },
    /// Replace an account's activity slots.
    SetActivity {
        account_id: AccountId,
        slots: ActivitySlots,
    },
}

/// Message from the server to an observer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong,
    Snapshot { report: ManagerSnapshot },
    /// Session event from the feed.
    Event { event: SessionEvent },
    Stopped { account_id: AccountId },
    /// Activity slots stored; `sent` tells whether the list went out.
    ActivityUpdated { account_id: AccountId, sent: bool },
    Error { message: String },
}

/// Answer one observer request.
pub async fn dispatch<C: SessionControl + ?Sized>(
    control: &C,
    message: ClientMessage,
) -> ServerMessage {
    debug!(?message, "Observer request");
    match message {
        ClientMessage::Ping => ServerMessage::Pong,
        ClientMessage::Snapshot => ServerMessage::Snapshot {
            report: control.report(),
        },
        ClientMessage::StopAccount { account_id } => {
            match control.stop_account(&account_id).await {
                Ok(_) => ServerMessage::Stopped { account_id },
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            }
        }
        ClientMessage::SetActivity { account_id, slots } => {
            match control.set_activity_slots(&account_id, slots).await {
                Ok(sent) => ServerMessage::ActivityUpdated { account_id, sent },
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            }
        }
    }
}
