//! Broadcast + history feed of session events.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    account::AccountId,
    error::SessionError,
    snapshot::SessionState,
};

/// Default number of events kept for late subscribers.
const HISTORY_EVENTS: usize = 1_000;

/// What happened to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEventKind {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    MessageReceived {
        from: String,
        text: String,
    },
    Wallet {
        currency: String,
        balance_cents: i64,
    },
    Restriction {
        vac_bans: u32,
    },
    Error {
        error: SessionError,
    },
}

/// Timestamped session event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub account_id: AccountId,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: SessionEventKind,
}

impl SessionEvent {
    #[must_use]
    pub fn now(account_id: AccountId, kind: SessionEventKind) -> Self {
        Self {
            account_id,
            at: Utc::now(),
            kind,
        }
    }
}

/// Session event feed with broadcast and history support.
///
/// Late observers receive history first, then live events.
pub struct SessionFeed {
    history: RwLock<VecDeque<SessionEvent>>,
    capacity: usize,
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for SessionFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionFeed {
    /// Create a feed with the default history size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_EVENTS)
    }

    /// Create a feed that keeps at most `capacity` events of history.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(16));
        Self {
            history: RwLock::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            sender,
        }
    }

    /// Push an event to live listeners and history.
    pub fn push(&self, event: SessionEvent) {
        let _ = self.sender.send(event.clone());

        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        while history.len() >= self.capacity.max(1) {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Record a state transition.
    pub fn push_state(&self, account_id: AccountId, from: SessionState, to: SessionState) {
        self.push(SessionEvent::now(
            account_id,
            SessionEventKind::StateChanged { from, to },
        ));
    }

    /// Get a receiver for live events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Get a copy of the history.
    #[must_use]
    pub fn history(&self) -> Vec<SessionEvent> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Stream of live events only, skipping any a lagging subscriber missed.
    #[must_use]
    pub fn subscribe_stream(&self) -> BoxStream<'static, SessionEvent> {
        Box::pin(BroadcastStream::new(self.subscribe()).filter_map(|res| async move { res.ok() }))
    }

    /// Stream that yields history first, then live events.
    ///
    /// Events dropped by a lagging subscriber are skipped.
    #[must_use]
    pub fn history_plus_stream(&self) -> BoxStream<'static, SessionEvent> {
        let live = self.subscribe_stream();
        let history = futures::stream::iter(self.history());
        Box::pin(history.chain(live))
    }
}
