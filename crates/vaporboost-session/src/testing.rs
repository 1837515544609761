//! Scripted connection client and collaborators for session tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::{sync::mpsc, time::Instant};
use vaporboost_core::{
    Account, AccountId, ActivitySlots, ErrorKind, SessionState, VisibilityMode,
    traits::{
        ClientError, ClientEvent, ConnectionClient, ConnectionFactory, InboundMessage,
        LogOnDetails, MessageSink, SinkError,
    },
};
use vaporboost_guard::{
    ChallengeError, ChallengeRequest, ChallengeResolver, ChallengeResponse, CodeGenerator,
    GuardError,
};

use crate::manager::SessionManager;

/// Outbound call recorded by a scripted client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect { code: Option<String> },
    SubmitCode(String),
    SetVisibility(VisibilityMode),
    SetActivity(ActivitySlots),
    SendMessage { to: String, text: String },
    Disconnect,
}

/// Per-account script and call log, shared by every client created for it.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<(Instant, Call)>>,
    connect_scripts: Mutex<VecDeque<Vec<ClientEvent>>>,
    events: Mutex<Option<mpsc::UnboundedSender<ClientEvent>>>,
    fail_commands: AtomicBool,
    hang_handshake: AtomicBool,
}

impl Recorder {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((Instant::now(), call));
    }

    fn push(&self, events: Vec<ClientEvent>) {
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            for event in events {
                let _ = tx.send(event);
            }
        }
    }

    /// Events emitted after the next unscripted connect. Defaults to `Connected`.
    pub fn script_connect(&self, events: Vec<ClientEvent>) {
        self.connect_scripts.lock().unwrap().push_back(events);
    }

    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    /// Make `connect` and `submit_code` never return, like a stalled network.
    pub fn hang_handshake(&self, hang: bool) {
        self.hang_handshake.store(hang, Ordering::SeqCst);
    }

    async fn stall_if_hung(&self) {
        if self.hang_handshake.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    /// Inject an event into the current client.
    pub fn emit(&self, event: ClientEvent) {
        self.push(vec![event]);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| matches!(c, Call::Connect { .. }))
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn connect_codes(&self) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Connect { code } => Some(code),
                _ => None,
            })
            .collect()
    }

    pub fn activity_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::SetActivity(_)))
            .count()
    }

    fn command_result(&self) -> Result<(), ClientError> {
        if self.fail_commands.load(Ordering::SeqCst) {
            Err(ClientError::Command("scripted failure".into()))
        } else {
            Ok(())
        }
    }
}

struct ScriptedClient {
    recorder: Arc<Recorder>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

#[async_trait]
impl ConnectionClient for ScriptedClient {
    async fn connect(&mut self, details: LogOnDetails) -> Result<(), ClientError> {
        let code = details
            .two_factor_code
            .map(|c| c.expose_secret().to_owned());
        self.recorder.record(Call::Connect { code });
        self.recorder.stall_if_hung().await;
        let script = self.recorder.connect_scripts.lock().unwrap().pop_front();
        self.recorder
            .push(script.unwrap_or_else(|| vec![ClientEvent::Connected]));
        Ok(())
    }

    async fn submit_code(&mut self, code: SecretString) -> Result<(), ClientError> {
        self.recorder
            .record(Call::SubmitCode(code.expose_secret().to_owned()));
        self.recorder.stall_if_hung().await;
        self.recorder.push(vec![ClientEvent::Connected]);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    async fn set_visibility(&mut self, mode: VisibilityMode) -> Result<(), ClientError> {
        self.recorder.record(Call::SetVisibility(mode));
        self.recorder.command_result()
    }

    async fn set_activity_slots(&mut self, slots: &ActivitySlots) -> Result<(), ClientError> {
        self.recorder.record(Call::SetActivity(slots.clone()));
        self.recorder.command_result()
    }

    async fn send_message(&mut self, to: &str, text: &str) -> Result<(), ClientError> {
        self.recorder.record(Call::SendMessage {
            to: to.to_owned(),
            text: text.to_owned(),
        });
        self.recorder.command_result()
    }

    async fn disconnect_gracefully(&mut self) -> Result<(), ClientError> {
        self.recorder.record(Call::Disconnect);
        Ok(())
    }
}

/// Factory handing out scripted clients, one recorder per account.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    recorders: Arc<Mutex<HashMap<AccountId, Arc<Recorder>>>>,
    failing: Arc<Mutex<HashSet<AccountId>>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorder(&self, id: &str) -> Arc<Recorder> {
        Arc::clone(
            self.recorders
                .lock()
                .unwrap()
                .entry(AccountId::from(id))
                .or_default(),
        )
    }

    pub fn fail_create(&self, id: &str) {
        self.failing.lock().unwrap().insert(AccountId::from(id));
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    async fn create(&self, account: &Account) -> Result<Box<dyn ConnectionClient>, ClientError> {
        if self.failing.lock().unwrap().contains(&account.id) {
            return Err(ClientError::Command("no client".into()));
        }
        let recorder = self.recorder(account.id.as_str());
        let (tx, events) = mpsc::unbounded_channel();
        *recorder.events.lock().unwrap() = Some(tx);
        Ok(Box::new(ScriptedClient { recorder, events }))
    }
}

/// Generator returning the same code for every seed.
pub struct FixedCodeGenerator(pub &'static str);

impl CodeGenerator for FixedCodeGenerator {
    fn generate(&self, _seed: &SecretString) -> Result<SecretString, GuardError> {
        Ok(SecretString::from(self.0.to_owned()))
    }
}

/// Resolver answering with a fixed code and counting requests.
pub struct CountingResolver {
    code: &'static str,
    calls: AtomicUsize,
    last_retry_reason: Mutex<Option<ErrorKind>>,
}

impl CountingResolver {
    pub fn new(code: &'static str) -> Self {
        Self {
            code,
            calls: AtomicUsize::new(0),
            last_retry_reason: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_retry_reason(&self) -> Option<ErrorKind> {
        *self.last_retry_reason.lock().unwrap()
    }
}

#[async_trait]
impl ChallengeResolver for CountingResolver {
    async fn resolve(
        &self,
        request: ChallengeRequest,
    ) -> Result<ChallengeResponse, ChallengeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_retry_reason.lock().unwrap() = request.retry_reason;
        Ok(ChallengeResponse::code(self.code))
    }
}

/// Resolver that never answers; tracks whether a request is still pending.
#[derive(Default)]
pub struct PendingResolver {
    waiting: Arc<AtomicBool>,
}

impl PendingResolver {
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }
}

struct WaitGuard(Arc<AtomicBool>);

impl Drop for WaitGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChallengeResolver for PendingResolver {
    async fn resolve(
        &self,
        _request: ChallengeRequest,
    ) -> Result<ChallengeResponse, ChallengeError> {
        self.waiting.store(true, Ordering::SeqCst);
        let _guard = WaitGuard(Arc::clone(&self.waiting));
        std::future::pending().await
    }
}

/// Sink that rejects every message.
pub struct FailingSink;

impl MessageSink for FailingSink {
    fn append(&self, _message: InboundMessage) -> Result<(), SinkError> {
        Err(SinkError::Closed)
    }
}

/// Let spawned session tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Yield until the session for `id` reaches `state`.
pub async fn wait_for_state<F: ConnectionFactory>(
    manager: &SessionManager<F>,
    id: &str,
    state: SessionState,
) {
    let id = AccountId::from(id);
    for _ in 0..1_000 {
        if manager.session(&id).is_some_and(|s| s.state == state) {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!(
        "{id} never reached {state}; now {:?}",
        manager.session(&id).map(|s| s.state)
    );
}
