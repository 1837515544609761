//! In-memory credential store.

use std::sync::RwLock;

use async_trait::async_trait;
use vaporboost_core::{
    Account, AccountId, Settings,
    traits::{CredentialStore, StoreError},
};

/// In-memory store implementation.
///
/// Useful for tests and embedding callers that own their configuration.
/// Data is lost on restart.
pub struct MemoryStore {
    accounts: RwLock<Vec<Account>>,
    settings: RwLock<Settings>,
}

impl MemoryStore {
    /// Create an empty store with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_accounts(Vec::new(), Settings::default())
    }

    /// Create a store seeded with accounts and settings.
    #[must_use]
    pub fn with_accounts(accounts: Vec<Account>, settings: Settings) -> Self {
        Self {
            accounts: RwLock::new(accounts),
            settings: RwLock::new(settings),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self
            .accounts
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .clone())
    }

    async fn load_settings(&self) -> Result<Settings, StoreError> {
        Ok(self
            .settings
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .clone())
    }

    async fn save_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        match accounts.iter_mut().find(|a| a.id == account.id) {
            Some(existing) => *existing = account.clone(),
            None => accounts.push(account.clone()),
        }
        Ok(())
    }

    async fn remove_account(&self, id: &AccountId) -> Result<bool, StoreError> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let before = accounts.len();
        accounts.retain(|a| &a.id != id);
        Ok(accounts.len() != before)
    }

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        settings.validate()?;
        *self
            .settings
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))? = settings.clone();
        Ok(())
    }
}
