//! Offline connection client.
//!
//! Accepts any non-empty password and stays online until logged off. A
//! provider binding plugs in through the same `ConnectionFactory` seam.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tracing::debug;
use vaporboost_core::{
    Account, AccountId, ActivitySlots, ResultCode, VisibilityMode,
    traits::{ClientError, ClientEvent, ConnectionClient, ConnectionFactory, LogOnDetails},
};

/// Hands out an `OfflineClient` per account.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineFactory;

#[async_trait]
impl ConnectionFactory for OfflineFactory {
    async fn create(&self, account: &Account) -> Result<Box<dyn ConnectionClient>, ClientError> {
        Ok(Box::new(OfflineClient::new(account.id.clone())))
    }
}

/// Client that answers handshakes locally.
pub struct OfflineClient {
    account_id: AccountId,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events_rx: mpsc::UnboundedReceiver<ClientEvent>,
    connected: bool,
}

impl OfflineClient {
    #[must_use]
    pub fn new(account_id: AccountId) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            account_id,
            events_tx,
            events_rx,
            connected: false,
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events_tx.send(event);
    }

    fn ensure_connected(&self) -> Result<(), ClientError> {
        if self.connected {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }
}

#[async_trait]
impl ConnectionClient for OfflineClient {
    async fn connect(&mut self, details: LogOnDetails) -> Result<(), ClientError> {
        debug!(
            account = %details.account_id,
            with_code = details.two_factor_code.is_some(),
            "Offline login"
        );
        if details.credential.expose_secret().is_empty() {
            self.emit(ClientEvent::Disconnected {
                code: ResultCode::INVALID_PASSWORD,
                message: Some("empty password".to_owned()),
            });
        } else {
            self.connected = true;
            self.emit(ClientEvent::Connected);
        }
        Ok(())
    }

    async fn submit_code(&mut self, _code: secrecy::SecretString) -> Result<(), ClientError> {
        self.connected = true;
        self.emit(ClientEvent::Connected);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events_rx.recv().await
    }

    async fn set_visibility(&mut self, mode: VisibilityMode) -> Result<(), ClientError> {
        self.ensure_connected()?;
        debug!(account = %self.account_id, ?mode, "Visibility set");
        Ok(())
    }

    async fn set_activity_slots(&mut self, slots: &ActivitySlots) -> Result<(), ClientError> {
        self.ensure_connected()?;
        debug!(account = %self.account_id, apps = slots.app_count(), "Activity set");
        Ok(())
    }

    async fn send_message(&mut self, to: &str, text: &str) -> Result<(), ClientError> {
        self.ensure_connected()?;
        debug!(account = %self.account_id, to, text, "Message sent");
        Ok(())
    }

    async fn disconnect_gracefully(&mut self) -> Result<(), ClientError> {
        self.connected = false;
        Ok(())
    }
}
