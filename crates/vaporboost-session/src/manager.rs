//! Session manager for orchestrating account sessions.

use std::sync::{Arc, PoisonError, RwLock};

use futures::future::join_all;
use tokio::{
    sync::oneshot,
    time::{self, Instant},
};
use tracing::{debug, info, warn};
use vaporboost_core::{
    Account, AccountId, ActivitySlots, CounterSnapshot, ManagerSnapshot, ResultCode,
    SessionFeed, SessionSnapshot, Settings,
    settings::SettingsError,
    traits::{ClientError, ConnectionFactory, MessageSink},
};
use vaporboost_guard::{ChallengeResolver, CodeGenerator, DeferResolver, SteamGuardTotp};

use crate::{
    counters::RunCounters,
    policy::{Decision, ReconnectPolicy},
    session::{SessionCommand, SessionContext, SessionHandle},
};

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("No session for account: {0}")]
    NotFound(AccountId),
    #[error("Session already running for account: {0}")]
    AlreadyRunning(AccountId),
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("Session for account {0} has ended")]
    SessionClosed(AccountId),
}

/// Outcome of a bulk start.
#[derive(Debug, Default)]
pub struct StartReport {
    pub started: Vec<AccountId>,
    /// Accounts that already had a live session.
    pub skipped: Vec<AccountId>,
    pub failed: Vec<(AccountId, ManagerError)>,
}

/// Owns one session per account and the collaborators they share.
///
/// The session list keeps insertion order. It is written only by start and
/// discard calls; snapshots read it without waiting on any session.
pub struct SessionManager<F: ConnectionFactory> {
    factory: F,
    settings: RwLock<Settings>,
    ctx: SessionContext,
    started_at: Instant,
    sessions: RwLock<Vec<Arc<SessionHandle>>>,
}

impl<F: ConnectionFactory> SessionManager<F> {
    /// Create a manager that defers challenges and derives Steam Guard codes.
    #[must_use]
    pub fn new(factory: F, settings: Settings) -> Self {
        Self {
            factory,
            settings: RwLock::new(settings),
            ctx: SessionContext {
                resolver: Arc::new(DeferResolver),
                generator: Arc::new(SteamGuardTotp::new()),
                sink: None,
                counters: Arc::new(RunCounters::new()),
                feed: Arc::new(SessionFeed::new()),
            },
            started_at: Instant::now(),
            sessions: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ChallengeResolver>) -> Self {
        self.ctx.resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_code_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.ctx.generator = generator;
        self
    }

    #[must_use]
    pub fn with_message_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.ctx.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_feed(mut self, feed: Arc<SessionFeed>) -> Self {
        self.ctx.feed = feed;
        self
    }

    fn find(&self, id: &AccountId) -> Option<Arc<SessionHandle>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|h| h.shared.account_id() == id)
            .cloned()
    }

    fn handles(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_live(&self, id: &AccountId) -> bool {
        self.find(id).is_some_and(|h| h.is_live())
    }

    /// Start a session for one account.
    ///
    /// A terminated session for the same account is replaced in place.
    ///
    /// # Errors
    /// Returns error if a live session exists or the client cannot be created.
    pub async fn start_account(&self, account: Account) -> Result<(), ManagerError> {
        if self.is_live(&account.id) {
            return Err(ManagerError::AlreadyRunning(account.id));
        }

        let client = self.factory.create(&account).await?;
        let settings = self.settings();

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let existing = sessions
            .iter()
            .position(|h| h.shared.account_id() == &account.id);
        if let Some(index) = existing
            && sessions[index].is_live()
        {
            return Err(ManagerError::AlreadyRunning(account.id));
        }

        let id = account.id.clone();
        let handle = Arc::new(SessionHandle::spawn(
            account,
            client,
            &settings,
            Arc::new(self.ctx.clone()),
        ));
        match existing {
            Some(index) => sessions[index] = handle,
            None => sessions.push(handle),
        }
        drop(sessions);

        debug!(account = %id, "Session started");
        Ok(())
    }

    /// Start accounts in order, spacing successive starts by
    /// `Settings::startup_spacing`.
    ///
    /// Accounts with a live session are skipped without waiting.
    pub async fn start_accounts(
        &self,
        accounts: impl IntoIterator<Item = Account>,
    ) -> StartReport {
        let mut report = StartReport::default();
        let mut attempted = false;

        for account in accounts {
            let id = account.id.clone();
            if self.is_live(&id) {
                info!(account = %id, "Already running, skipping");
                report.skipped.push(id);
                continue;
            }

            if attempted {
                time::sleep(self.settings().startup_spacing()).await;
            }
            attempted = true;

            match self.start_account(account).await {
                Ok(()) => report.started.push(id),
                Err(ManagerError::AlreadyRunning(id)) => report.skipped.push(id),
                Err(e) => {
                    warn!(account = %id, error = %e, "Failed to start session");
                    report.failed.push((id, e));
                }
            }
        }

        info!(
            started = report.started.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Bulk start finished"
        );
        report
    }

    /// Stop a session and return its final snapshot.
    ///
    /// The session stays listed until `discard` is called.
    ///
    /// # Errors
    /// Returns error if no session exists for `id`.
    pub async fn stop_account(&self, id: &AccountId) -> Result<SessionSnapshot, ManagerError> {
        let handle = self
            .find(id)
            .ok_or_else(|| ManagerError::NotFound(id.clone()))?;
        handle.stop().await;
        Ok(handle.shared.snapshot())
    }

    /// Stop every session concurrently.
    pub async fn stop_all(&self) {
        let handles = self.handles();
        info!(sessions = handles.len(), "Stopping all sessions");
        join_all(handles.iter().map(|h| h.stop())).await;
    }

    /// Stop a session if needed and remove it from the manager.
    ///
    /// # Errors
    /// Returns error if no session exists for `id`.
    pub async fn discard(&self, id: &AccountId) -> Result<SessionSnapshot, ManagerError> {
        let snapshot = self.stop_account(id).await?;
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|h| h.shared.session_id() != snapshot.session_id);
        Ok(snapshot)
    }

    /// Point-in-time view of every session, in start order.
    ///
    /// Terminated sessions are included until discarded.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|h| h.shared.snapshot())
            .collect()
    }

    #[must_use]
    pub fn session(&self, id: &AccountId) -> Option<SessionSnapshot> {
        self.find(id).map(|h| h.shared.snapshot())
    }

    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        self.ctx.counters.snapshot()
    }

    /// Sessions, counters and uptime in one read.
    #[must_use]
    pub fn report(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            uptime: self.started_at.elapsed(),
            sessions: self.snapshot(),
            counters: self.counters(),
        }
    }

    #[must_use]
    pub fn feed(&self) -> Arc<SessionFeed> {
        Arc::clone(&self.ctx.feed)
    }

    #[must_use]
    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the settings used by sessions started from now on.
    ///
    /// # Errors
    /// Returns error if the settings are inconsistent.
    pub fn update_settings(&self, settings: Settings) -> Result<(), ManagerError> {
        settings.validate()?;
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
        Ok(())
    }

    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::from_settings(&self.settings())
    }

    /// What the reconnect policy would do if the session for `id` failed
    /// with `code` now.
    ///
    /// # Errors
    /// Returns error if no session exists for `id`.
    pub fn reconnect_decision(
        &self,
        id: &AccountId,
        code: ResultCode,
        message: Option<String>,
    ) -> Result<Decision, ManagerError> {
        let snapshot = self
            .session(id)
            .ok_or_else(|| ManagerError::NotFound(id.clone()))?;
        Ok(self
            .reconnect_policy()
            .decide(code, message, snapshot.reconnect_attempts))
    }

    fn live_handle(&self, id: &AccountId) -> Result<Arc<SessionHandle>, ManagerError> {
        let handle = self
            .find(id)
            .ok_or_else(|| ManagerError::NotFound(id.clone()))?;
        if handle.is_live() {
            Ok(handle)
        } else {
            Err(ManagerError::SessionClosed(id.clone()))
        }
    }

    /// Replace a session's activity slots.
    ///
    /// Returns whether the list was sent; an unchanged list while online,
    /// or any list while offline, is only stored.
    ///
    /// # Errors
    /// Returns error if the session is gone or the client rejects the list.
    pub async fn set_activity_slots(
        &self,
        id: &AccountId,
        slots: ActivitySlots,
    ) -> Result<bool, ManagerError> {
        let handle = self.live_handle(id)?;
        let (ack, rx) = oneshot::channel();
        if !handle.send(SessionCommand::SetActivity { slots, ack }) {
            return Err(ManagerError::SessionClosed(id.clone()));
        }
        rx.await
            .map_err(|_| ManagerError::SessionClosed(id.clone()))?
            .map_err(ManagerError::from)
    }

    /// Send a chat message from an online session.
    ///
    /// # Errors
    /// Returns error if the session is gone or not online.
    pub async fn send_message(
        &self,
        id: &AccountId,
        to: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), ManagerError> {
        let handle = self.live_handle(id)?;
        let (ack, rx) = oneshot::channel();
        let command = SessionCommand::SendMessage {
            to: to.into(),
            text: text.into(),
            ack,
        };
        if !handle.send(command) {
            return Err(ManagerError::SessionClosed(id.clone()));
        }
        rx.await
            .map_err(|_| ManagerError::SessionClosed(id.clone()))?
            .map_err(ManagerError::from)
    }
}
