//! JSON file credential store (feature-gated).
//!
//! Layout under the root directory:
//! - `config/accounts.json`: array of account records
//! - `config/settings.json`: settings object, missing keys defaulted

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info};
use vaporboost_core::{
    Account, AccountId, ActivitySlot, Settings,
    account::AccountRecord,
    traits::{CredentialStore, StoreError},
};

const CONFIG_DIR: &str = "config";
const ACCOUNTS_FILE: &str = "accounts.json";
const SETTINGS_FILE: &str = "settings.json";
const EXPORT_VERSION: &str = "3.0.0";

/// Secret-free view of one account, for backups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedAccount {
    pub username: String,
    #[serde(rename = "has2FA")]
    pub has_two_factor: bool,
    pub invisible: bool,
    pub games: Vec<u32>,
    pub status: Option<String>,
    pub reply_message: Option<String>,
}

impl From<&AccountRecord> for ExportedAccount {
    fn from(record: &AccountRecord) -> Self {
        let slots = record.games_and_status.clone().unwrap_or_default();
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_owned());
        Self {
            username: record.username.clone(),
            has_two_factor: !record.shared_secret.is_empty(),
            invisible: record.invisible.unwrap_or(false),
            games: slots.app_ids().collect(),
            status: slots.as_slice().iter().find_map(|slot| match slot {
                ActivitySlot::Label(label) => Some(label.clone()),
                ActivitySlot::App(_) => None,
            }),
            reply_message: non_empty(&record.reply_message),
        }
    }
}

/// Backup document written by `JsonFileStore::export_to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountExport {
    pub exported: DateTime<Utc>,
    pub version: String,
    pub accounts: Vec<ExportedAccount>,
}

/// Credential store backed by JSON files.
pub struct JsonFileStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles on the accounts file.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store under the user's config directory (`<config>/vaporboost`).
    #[must_use]
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join("vaporboost")))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn accounts_path(&self) -> PathBuf {
        self.root.join(CONFIG_DIR).join(ACCOUNTS_FILE)
    }

    fn settings_path(&self) -> PathBuf {
        self.root.join(CONFIG_DIR).join(SETTINGS_FILE)
    }

    /// Read a file, treating a missing one as absent.
    async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace a file's contents via a sibling temp file and rename.
    async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn load_records(&self) -> Result<Vec<AccountRecord>, StoreError> {
        let Some(data) = Self::read_optional(&self.accounts_path()).await? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&data)?)
    }

    async fn save_records(&self, records: &[AccountRecord]) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(records)?;
        Self::write_atomic(&self.accounts_path(), &data).await
    }

    /// Secret-free summary of every stored account.
    ///
    /// # Errors
    /// Returns error if the accounts file cannot be read.
    pub async fn export_summary(&self) -> Result<AccountExport, StoreError> {
        let records = self.load_records().await?;
        Ok(AccountExport {
            exported: Utc::now(),
            version: EXPORT_VERSION.to_owned(),
            accounts: records.iter().map(ExportedAccount::from).collect(),
        })
    }

    /// Write the export summary to `path`.
    ///
    /// # Errors
    /// Returns error if the accounts file cannot be read or the export written.
    pub async fn export_to(&self, path: &Path) -> Result<usize, StoreError> {
        let export = self.export_summary().await?;
        let data = serde_json::to_vec_pretty(&export)?;
        Self::write_atomic(path, &data).await?;
        info!(path = %path.display(), accounts = export.accounts.len(), "Exported accounts");
        Ok(export.accounts.len())
    }
}

#[async_trait]
impl CredentialStore for JsonFileStore {
    async fn load_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let records = self.load_records().await?;
        debug!(count = records.len(), "Loaded accounts");
        Ok(records.into_iter().map(Account::from).collect())
    }

    async fn load_settings(&self) -> Result<Settings, StoreError> {
        match Self::read_optional(&self.settings_path()).await? {
            Some(data) => Ok(Settings::from_json(&data)?),
            None => Ok(Settings::default()),
        }
    }

    async fn save_account(&self, account: &Account) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_records().await?;
        let record = account.to_record();

        match records
            .iter_mut()
            .find(|r| AccountId::new(r.username.as_str()) == account.id)
        {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.save_records(&records).await
    }

    async fn remove_account(&self, id: &AccountId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_records().await?;
        let before = records.len();
        records.retain(|r| &AccountId::new(r.username.as_str()) != id);
        if records.len() == before {
            return Ok(false);
        }
        self.save_records(&records).await?;
        Ok(true)
    }

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        settings.validate()?;
        let data = serde_json::to_vec_pretty(settings)?;
        Self::write_atomic(&self.settings_path(), &data).await
    }
}
