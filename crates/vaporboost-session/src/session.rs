//! Per-account session: a state machine driving one connection client.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use chrono::Utc;
use futures::future::BoxFuture;
use secrecy::SecretString;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{self, MissedTickBehavior, Sleep},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vaporboost_core::{
    Account, AccountId, ActivitySlots, ErrorKind, ResultCode, SessionError, SessionFeed,
    SessionSnapshot, SessionState, Settings, VisibilityMode,
    feed::{SessionEvent, SessionEventKind},
    snapshot::Termination,
    traits::{
        ChallengeKind, ClientError, ClientEvent, ConnectionClient, InboundMessage, LogOnDetails,
        MessageSink,
    },
};
use vaporboost_guard::{
    ChallengeError, ChallengeRequest, ChallengeResolver, ChallengeResponse, CodeGenerator,
};

use crate::{
    counters::RunCounters,
    policy::{Decision, ReconnectPolicy},
    timer::OnlineTimer,
};

/// Online-timer checkpoint interval.
const TICK: Duration = Duration::from_secs(1);

/// Mutable session state visible to observers.
#[derive(Debug)]
struct SharedState {
    state: SessionState,
    timer: OnlineTimer,
    active_slots: ActivitySlots,
    visibility: VisibilityMode,
    last_error: Option<SessionError>,
    reconnect_attempts: u32,
    termination: Option<Termination>,
}

/// State shared between a session task and the manager.
#[derive(Debug)]
pub(crate) struct SessionShared {
    account_id: AccountId,
    session_id: Uuid,
    inner: RwLock<SharedState>,
}

impl SessionShared {
    fn new(account_id: AccountId, visibility: VisibilityMode) -> Self {
        Self {
            account_id,
            session_id: Uuid::new_v4(),
            inner: RwLock::new(SharedState {
                state: SessionState::Idle,
                timer: OnlineTimer::new(),
                active_slots: ActivitySlots::default(),
                visibility,
                last_error: None,
                reconnect_attempts: 0,
                termination: None,
            }),
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut SharedState) -> R) -> R {
        f(&mut self.inner.write().unwrap_or_else(PoisonError::into_inner))
    }

    fn read<R>(&self, f: impl FnOnce(&SharedState) -> R) -> R {
        f(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn state(&self) -> SessionState {
        self.read(|s| s.state)
    }

    pub(crate) const fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub(crate) const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Set the state, pausing or resuming the timer. Returns the old state.
    fn set_state(&self, to: SessionState) -> SessionState {
        self.update(|s| {
            let from = s.state;
            s.state = to;
            if to == SessionState::Online {
                s.timer.resume();
            } else {
                s.timer.pause();
            }
            from
        })
    }

    fn checkpoint(&self) {
        self.update(|s| s.timer.checkpoint());
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        self.read(|s| SessionSnapshot {
            account_id: self.account_id.clone(),
            session_id: self.session_id,
            state: s.state,
            online_duration: s.timer.elapsed(),
            active_slot_count: s.active_slots.len(),
            active_app_count: s.active_slots.app_count(),
            visibility: s.visibility,
            reconnect_attempts: s.reconnect_attempts,
            last_error: s.last_error.clone(),
            termination: s.termination,
        })
    }
}

/// Request sent from the manager to a running session.
pub(crate) enum SessionCommand {
    /// Replace the configured slots; ack reports whether they were sent.
    SetActivity {
        slots: ActivitySlots,
        ack: oneshot::Sender<Result<bool, ClientError>>,
    },
    SendMessage {
        to: String,
        text: String,
        ack: oneshot::Sender<Result<(), ClientError>>,
    },
}

/// Collaborators shared by every session of a manager.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub resolver: Arc<dyn ChallengeResolver>,
    pub generator: Arc<dyn CodeGenerator>,
    pub sink: Option<Arc<dyn MessageSink>>,
    pub counters: Arc<RunCounters>,
    pub feed: Arc<SessionFeed>,
}

/// Manager-side handle to a spawned session.
pub(crate) struct SessionHandle {
    pub shared: Arc<SessionShared>,
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<SessionCommand>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    /// Spawn a session task for `account` on `client`.
    pub(crate) fn spawn(
        account: Account,
        client: Box<dyn ConnectionClient>,
        settings: &Settings,
        ctx: Arc<SessionContext>,
    ) -> Self {
        let visibility = account.effective_visibility(settings.default_visibility);
        let shared = Arc::new(SessionShared::new(account.id.clone(), visibility));
        let cancel = CancellationToken::new();
        let (commands, command_rx) = mpsc::unbounded_channel();

        let driver = SessionDriver {
            account,
            client,
            visibility,
            shared: Arc::clone(&shared),
            ctx,
            policy: ReconnectPolicy::from_settings(settings),
            commands: command_rx,
            cancel: cancel.clone(),
            backoff: None,
            challenge: None,
            challenge_needs_handshake: false,
            auto_code_rejected: false,
            auto_code_resubmitted: false,
            attached: false,
            events_open: false,
        };
        let task = tokio::spawn(driver.run());

        Self {
            shared,
            cancel,
            commands,
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        !self.shared.state().is_terminated()
    }

    pub(crate) fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Cancel the session and wait until its task has finished.
    pub(crate) async fn stop(&self) {
        self.cancel.cancel();
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take()
            && let Err(e) = handle.await
        {
            error!(account = %self.shared.account_id, error = %e, "Session task failed");
        }
    }
}

enum Flow {
    Continue,
    Stop,
}

type PendingChallenge = BoxFuture<'static, Result<ChallengeResponse, ChallengeError>>;

/// Await an optional future, clearing the slot when it completes.
///
/// Never resolves while the slot is empty.
async fn settle<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot.as_mut() {
        Some(fut) => {
            let output = fut.await;
            *slot = None;
            output
        }
        None => std::future::pending().await,
    }
}

/// The task owning one account's connection.
struct SessionDriver {
    account: Account,
    client: Box<dyn ConnectionClient>,
    visibility: VisibilityMode,
    shared: Arc<SessionShared>,
    ctx: Arc<SessionContext>,
    policy: ReconnectPolicy,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    cancel: CancellationToken,
    backoff: Option<Pin<Box<Sleep>>>,
    challenge: Option<PendingChallenge>,
    /// The pending challenge came from a rejected handshake, so its code
    /// goes into a new handshake instead of `submit_code`.
    challenge_needs_handshake: bool,
    /// The provider rejected an auto-derived code.
    auto_code_rejected: bool,
    /// An auto-derived code was already resubmitted during this handshake.
    auto_code_resubmitted: bool,
    /// A handshake or connection is in place that needs a log off.
    attached: bool,
    events_open: bool,
}

impl SessionDriver {
    async fn run(mut self) {
        if matches!(self.begin_handshake(None).await, Flow::Continue) {
            self.event_loop().await;
        }
        self.finish().await;
    }

    async fn event_loop(&mut self) {
        let mut ticker = time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let flow = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Flow::Stop,
                result = settle(&mut self.challenge) => self.on_challenge_response(result).await,
                () = settle(&mut self.backoff) => self.begin_handshake(None).await,
                Some(command) = self.commands.recv() => self.on_command(command).await,
                event = self.client.next_event(), if self.events_open => match event {
                    Some(event) => self.on_event(event).await,
                    None => {
                        self.events_open = false;
                        self.on_failure(ResultCode::NO_CONNECTION, Some("event stream closed".into()))
                            .await
                    }
                },
                _ = ticker.tick() => {
                    self.shared.checkpoint();
                    Flow::Continue
                }
            };

            if matches!(flow, Flow::Stop) || self.shared.state().is_terminated() {
                break;
            }
        }
    }

    fn transition(&self, to: SessionState) {
        let from = self.shared.set_state(to);
        if from != to {
            debug!(account = %self.account.id, ?from, ?to, "Session state changed");
            self.ctx.feed.push_state(self.account.id.clone(), from, to);
        }
    }

    fn record_error(&self, err: SessionError) {
        self.ctx.counters.record_error();
        self.shared.update(|s| s.last_error = Some(err.clone()));
        self.ctx.feed.push(SessionEvent::now(
            self.account.id.clone(),
            SessionEventKind::Error { error: err },
        ));
    }

    /// Derive a one-time code from the account's seed, unless one was rejected.
    fn derive_code(&self) -> Option<SecretString> {
        if self.auto_code_rejected {
            return None;
        }
        let seed = self.account.two_factor_seed.as_ref()?;
        match self.ctx.generator.generate(seed) {
            Ok(code) => {
                debug!(account = %self.account.id, "Auto-generated 2FA code");
                Some(code)
            }
            Err(e) => {
                warn!(account = %self.account.id, error = %e, "Could not derive 2FA code");
                None
            }
        }
    }

    async fn begin_handshake(&mut self, code: Option<SecretString>) -> Flow {
        self.transition(SessionState::Connecting);
        self.auto_code_resubmitted = false;
        info!(account = %self.account.id, "Connecting...");

        let details = LogOnDetails {
            account_id: self.account.id.clone(),
            credential: self.account.credential.clone(),
            two_factor_code: code.or_else(|| self.derive_code()),
        };

        self.attached = true;
        let cancel = self.cancel.clone();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Flow::Stop,
            result = self.client.connect(details) => result,
        };

        match result {
            Ok(()) => {
                self.events_open = true;
                Flow::Continue
            }
            Err(e) => {
                warn!(account = %self.account.id, error = %e, "Login failed");
                let code = e.code().unwrap_or(ResultCode::FAIL);
                self.on_failure(code, Some(e.to_string())).await
            }
        }
    }

    async fn on_event(&mut self, event: ClientEvent) -> Flow {
        match event {
            ClientEvent::ChallengeRequested {
                kind,
                domain_hint,
                last_code_wrong,
            } => {
                self.challenge_needs_handshake = false;
                match self.request_challenge(kind, domain_hint, last_code_wrong, true) {
                    Some(code) => self.submit(code).await,
                    None => Flow::Continue,
                }
            }
            ClientEvent::Connected => self.on_connected().await,
            ClientEvent::Disconnected { code, message } => self.on_failure(code, message).await,
            ClientEvent::MessageReceived { from, text } => {
                self.on_message(from, text).await;
                Flow::Continue
            }
            ClientEvent::WalletInfo {
                has_wallet,
                currency,
                balance_cents,
            } => {
                if has_wallet && balance_cents > 0 {
                    let currency = currency_code(currency);
                    info!(
                        account = %self.account.id,
                        "Wallet: {}.{:02} {currency}",
                        balance_cents / 100,
                        balance_cents % 100
                    );
                    self.ctx.feed.push(SessionEvent::now(
                        self.account.id.clone(),
                        SessionEventKind::Wallet {
                            currency: currency.to_owned(),
                            balance_cents,
                        },
                    ));
                }
                Flow::Continue
            }
            ClientEvent::RestrictionInfo { vac_bans } => {
                if vac_bans > 0 {
                    warn!(account = %self.account.id, vac_bans, "VAC bans on record");
                    self.ctx.feed.push(SessionEvent::now(
                        self.account.id.clone(),
                        SessionEventKind::Restriction { vac_bans },
                    ));
                }
                Flow::Continue
            }
        }
    }

    /// Enter `AwaitingChallenge` and start the resolver.
    ///
    /// Returns a derived code instead when a mobile challenge can be
    /// answered from the seed.
    fn request_challenge(
        &mut self,
        kind: ChallengeKind,
        domain_hint: Option<String>,
        last_code_wrong: bool,
        allow_auto: bool,
    ) -> Option<SecretString> {
        self.transition(SessionState::AwaitingChallenge);
        if last_code_wrong {
            warn!(account = %self.account.id, "Wrong code, try again");
            if self.account.has_two_factor_seed() {
                self.auto_code_rejected = true;
            }
        }

        if allow_auto
            && kind == ChallengeKind::MobileAuthenticator
            && !self.auto_code_resubmitted
            && let Some(code) = self.derive_code()
        {
            self.auto_code_resubmitted = true;
            return Some(code);
        }

        let request = ChallengeRequest {
            account_id: self.account.id.clone(),
            kind,
            domain_hint,
            retry_reason: last_code_wrong.then_some(ErrorKind::WrongChallengeCode),
        };
        warn!(account = %self.account.id, source = %request.source(), "Code required");

        let resolver = Arc::clone(&self.ctx.resolver);
        self.challenge = Some(Box::pin(async move { resolver.resolve(request).await }));
        None
    }

    async fn on_challenge_response(
        &mut self,
        result: Result<ChallengeResponse, ChallengeError>,
    ) -> Flow {
        match result {
            Ok(ChallengeResponse::Code(code)) => {
                if self.challenge_needs_handshake {
                    self.challenge_needs_handshake = false;
                    self.begin_handshake(Some(code)).await
                } else {
                    self.submit(code).await
                }
            }
            Ok(ChallengeResponse::Defer) => {
                info!(account = %self.account.id, "Waiting for app approval...");
                Flow::Continue
            }
            Err(e) => {
                error!(account = %self.account.id, error = %e, "Challenge failed");
                self.terminate(SessionError::Challenge {
                    message: e.to_string(),
                });
                Flow::Stop
            }
        }
    }

    async fn submit(&mut self, code: SecretString) -> Flow {
        self.transition(SessionState::Connecting);
        let cancel = self.cancel.clone();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Flow::Stop,
            result = self.client.submit_code(code) => result,
        };

        match result {
            Ok(()) => Flow::Continue,
            Err(e) => {
                warn!(account = %self.account.id, error = %e, "Code submission failed");
                let code = e.code().unwrap_or(ResultCode::FAIL);
                self.on_failure(code, Some(e.to_string())).await
            }
        }
    }

    async fn on_connected(&mut self) -> Flow {
        if self.shared.state() == SessionState::Online {
            debug!(account = %self.account.id, "Duplicate login event ignored");
            return Flow::Continue;
        }

        self.challenge = None;
        self.backoff = None;
        self.attached = true;
        self.auto_code_rejected = false;
        self.transition(SessionState::Online);
        self.shared.update(|s| s.reconnect_attempts = 0);
        info!(account = %self.account.id, "Logged in!");

        if let Err(e) = self.client.set_visibility(self.visibility).await {
            warn!(account = %self.account.id, error = %e, "Failed to set visibility");
            self.record_error(SessionError::Client {
                message: e.to_string(),
            });
        } else if self.visibility == VisibilityMode::Invisible {
            info!(account = %self.account.id, "Mode: Invisible");
        }

        let slots = self.account.activity_slots.clone();
        let _ = self.apply_slots(slots).await;
        Flow::Continue
    }

    /// Send the full slot list and record it as applied.
    async fn apply_slots(&mut self, slots: ActivitySlots) -> Result<(), ClientError> {
        match self.client.set_activity_slots(&slots).await {
            Ok(()) => {
                info!(account = %self.account.id, "Boosting {} game(s)", slots.app_count());
                self.shared.update(|s| s.active_slots = slots);
                Ok(())
            }
            Err(e) => {
                warn!(account = %self.account.id, error = %e, "Failed to set activity");
                self.record_error(SessionError::Client {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn on_failure(&mut self, code: ResultCode, message: Option<String>) -> Flow {
        let attempts = self.shared.read(|s| s.reconnect_attempts);

        match self.policy.decide(code, message.clone(), attempts) {
            Decision::Challenge { wrong_code } => {
                self.challenge_needs_handshake = true;
                let kind = if matches!(
                    code,
                    ResultCode::LOGIN_DENIED_NEED_TWO_FACTOR | ResultCode::TWO_FACTOR_CODE_MISMATCH
                ) {
                    ChallengeKind::MobileAuthenticator
                } else {
                    ChallengeKind::Email
                };
                self.attached = false;
                self.request_challenge(kind, None, wrong_code, false);
                Flow::Continue
            }
            Decision::Terminate(err) => {
                self.attached = false;
                match err.kind() {
                    Some(ErrorKind::SessionSupersededElsewhere) => error!(
                        account = %self.account.id,
                        code = %code,
                        "Session taken over by another login; not retrying"
                    ),
                    _ => error!(account = %self.account.id, code = %code, error = %err, "Session failed"),
                }
                self.terminate(err);
                Flow::Stop
            }
            Decision::Reconnect { delay, attempt } => {
                self.attached = false;
                let err = SessionError::classified(code, message);
                warn!(
                    account = %self.account.id,
                    code = %code,
                    "Disconnected: {err}; reconnecting in {}s (attempt {attempt}/{})",
                    delay.as_secs(),
                    self.policy.max_attempts
                );
                self.record_error(err);
                self.transition(SessionState::Disconnected);
                self.shared.update(|s| s.reconnect_attempts = attempt);
                self.ctx.counters.record_reconnection();
                self.transition(SessionState::Reconnecting);
                self.challenge = None;
                self.backoff = Some(Box::pin(time::sleep(delay)));
                Flow::Continue
            }
        }
    }

    fn terminate(&mut self, err: SessionError) {
        self.record_error(err);
        self.challenge = None;
        self.backoff = None;
        self.shared.update(|s| s.termination = Some(Termination::Failed));
        self.transition(SessionState::Terminated);
    }

    async fn on_message(&mut self, from: String, text: String) {
        self.ctx.counters.record_message();
        info!(account = %self.account.id, from = %from, "Message: {text}");
        self.ctx.feed.push(SessionEvent::now(
            self.account.id.clone(),
            SessionEventKind::MessageReceived {
                from: from.clone(),
                text: text.clone(),
            },
        ));

        if self.account.persist_inbound_messages
            && let Some(sink) = &self.ctx.sink
        {
            let message = InboundMessage {
                account_id: self.account.id.clone(),
                from: from.clone(),
                text,
                received_at: Utc::now(),
            };
            if let Err(e) = sink.append(message) {
                warn!(account = %self.account.id, error = %e, "Failed to persist message");
            }
        }

        if let Some(reply) = &self.account.auto_reply
            && let Err(e) = self.client.send_message(&from, reply).await
        {
            warn!(account = %self.account.id, error = %e, "Auto-reply failed");
        }
    }

    async fn on_command(&mut self, command: SessionCommand) -> Flow {
        match command {
            SessionCommand::SetActivity { slots, ack } => {
                self.account.activity_slots = slots.clone();
                let online = self.shared.state() == SessionState::Online;
                let unchanged = self.shared.read(|s| s.active_slots == slots);
                let result = if online && !unchanged {
                    self.apply_slots(slots).await.map(|()| true)
                } else {
                    Ok(false)
                };
                let _ = ack.send(result);
            }
            SessionCommand::SendMessage { to, text, ack } => {
                let result = if self.shared.state() == SessionState::Online {
                    self.client.send_message(&to, &text).await
                } else {
                    Err(ClientError::NotConnected)
                };
                let _ = ack.send(result);
            }
        }
        Flow::Continue
    }

    /// Release the connection and settle in `Terminated`.
    async fn finish(&mut self) {
        self.challenge = None;
        self.backoff = None;

        if self.attached {
            info!(account = %self.account.id, "Logging out...");
            if let Err(e) = self.client.disconnect_gracefully().await {
                warn!(account = %self.account.id, error = %e, "Log off failed");
            }
            self.attached = false;
        }

        if !self.shared.state().is_terminated() {
            self.shared.update(|s| s.termination = Some(Termination::Requested));
            self.transition(SessionState::Terminated);
        }
        debug!(account = %self.account.id, "Session task finished");
    }
}

/// Currency code for a provider currency id.
fn currency_code(id: u32) -> &'static str {
    match id {
        1 => "USD",
        2 => "GBP",
        3 => "EUR",
        5 => "RUB",
        7 => "BRL",
        16 => "ARS",
        34 => "MXN",
        _ => "",
    }
}
