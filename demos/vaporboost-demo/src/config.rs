//! Locating and loading the JSON configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use vaporboost_core::{Account, Settings, traits::CredentialStore};
use vaporboost_session::storage::JsonFileStore;

/// Environment variable naming the configuration root.
pub const ROOT_ENV: &str = "VAPORBOOST_HOME";

/// Open the store at `root`, else `$VAPORBOOST_HOME`, else the user config dir.
///
/// # Errors
/// Returns error if no location can be determined.
pub fn open_store(root: Option<PathBuf>) -> Result<JsonFileStore> {
    if let Some(root) = root.or_else(|| std::env::var_os(ROOT_ENV).map(PathBuf::from)) {
        return Ok(JsonFileStore::new(root));
    }
    JsonFileStore::default_location().context("No config directory; pass a path or set VAPORBOOST_HOME")
}

/// Validated settings plus the stored accounts.
///
/// # Errors
/// Returns error if either file cannot be read or the settings are invalid.
pub async fn load(store: &impl CredentialStore) -> Result<(Settings, Vec<Account>)> {
    let settings = store.load_settings().await.context("Failed to load settings")?;
    settings.validate()?;
    let accounts = store.load_accounts().await.context("Failed to load accounts")?;
    info!(accounts = accounts.len(), "Configuration loaded");
    Ok((settings, accounts))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use vaporboost_core::VisibilityMode;

    use super::*;

    #[test]
    fn test_explicit_root_wins() {
        let store = open_store(Some(PathBuf::from("/tmp/boost"))).unwrap();
        assert_eq!(store.root(), std::path::Path::new("/tmp/boost"));
    }

    #[tokio::test]
    async fn test_load_reads_both_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("config/settings.json"),
            r#"{"invisibleMode": true, "startupDelay": 500}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("config/accounts.json"),
            r#"[{"username": "gabe", "password": "pw", "invisible": false}]"#,
        )
        .unwrap();

        let store = open_store(Some(dir.path().to_path_buf())).unwrap();
        let (settings, accounts) = load(&store).await.unwrap();

        assert_eq!(settings.startup_spacing_ms, 500);
        assert_eq!(accounts.len(), 1);
        assert_eq!(
            accounts[0].effective_visibility(settings.default_visibility),
            VisibilityMode::Invisible
        );
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("config/settings.json"),
            r#"{"standardBackoffMs": 10000, "rateLimitBackoffMs": 10}"#,
        )
        .unwrap();

        let store = open_store(Some(dir.path().to_path_buf())).unwrap();
        assert!(load(&store).await.is_err());
    }
}
