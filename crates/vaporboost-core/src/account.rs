//! Account records and the activity slots applied to a live connection.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// App id applied when an account record lists no activity at all.
pub const DEFAULT_APP_ID: u32 = 730;

/// Account identifier.
///
/// Keeps the spelling it was created with for display, but compares and
/// hashes case-insensitively.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn folded(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars().flat_map(char::to_lowercase)
    }
}

impl PartialEq for AccountId {
    fn eq(&self, other: &Self) -> bool {
        self.folded().eq(other.folded())
    }
}

impl Eq for AccountId {}

impl Hash for AccountId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.folded() {
            c.hash(state);
        }
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Presence shown to other users once online.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityMode {
    #[default]
    Visible,
    Invisible,
}

/// A single "currently doing X" entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActivitySlot {
    /// Numeric activity (app) id.
    App(u32),
    /// Free-text status label.
    Label(String),
}

/// Ordered activity slot list.
///
/// Holds at most one label, always first. App ids are unique and non-zero,
/// in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ActivitySlot>", into = "Vec<ActivitySlot>")]
pub struct ActivitySlots(Vec<ActivitySlot>);

impl ActivitySlots {
    /// Build a normalized slot list.
    pub fn new(slots: impl IntoIterator<Item = ActivitySlot>) -> Self {
        let mut label = None;
        let mut apps: Vec<ActivitySlot> = Vec::new();

        for slot in slots {
            match slot {
                ActivitySlot::Label(text) => {
                    if label.is_none() && !text.trim().is_empty() {
                        label = Some(text);
                    }
                }
                ActivitySlot::App(0) => {}
                app @ ActivitySlot::App(_) => {
                    if !apps.contains(&app) {
                        apps.push(app);
                    }
                }
            }
        }

        let mut normalized = Vec::with_capacity(apps.len() + 1);
        normalized.extend(label.map(ActivitySlot::Label));
        normalized.extend(apps);
        Self(normalized)
    }

    /// Build a slot list from app ids only.
    pub fn apps(ids: impl IntoIterator<Item = u32>) -> Self {
        Self::new(ids.into_iter().map(ActivitySlot::App))
    }

    /// Replace the status label, keeping the app ids.
    #[must_use]
    pub fn with_label(self, label: impl Into<String>) -> Self {
        let label = ActivitySlot::Label(label.into());
        Self::new(std::iter::once(label).chain(self.0))
    }

    /// The status label, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        match self.0.first() {
            Some(ActivitySlot::Label(text)) => Some(text),
            _ => None,
        }
    }

    /// App ids in order.
    pub fn app_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().filter_map(|slot| match slot {
            ActivitySlot::App(id) => Some(*id),
            ActivitySlot::Label(_) => None,
        })
    }

    /// Number of app ids.
    #[must_use]
    pub fn app_count(&self) -> usize {
        self.app_ids().count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ActivitySlot] {
        &self.0
    }
}

impl From<Vec<ActivitySlot>> for ActivitySlots {
    fn from(slots: Vec<ActivitySlot>) -> Self {
        Self::new(slots)
    }
}

impl From<ActivitySlots> for Vec<ActivitySlot> {
    fn from(slots: ActivitySlots) -> Self {
        slots.0
    }
}

/// Account configuration consumed by the session layer.
///
/// Secrets are held as `SecretString` so they never show up in `Debug`
/// output or logs.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub credential: SecretString,
    /// Shared secret for deriving one-time codes without prompting.
    pub two_factor_seed: Option<SecretString>,
    /// Requested presence. Invisible from either this or
    /// `Settings::default_visibility` wins.
    pub visibility: Option<VisibilityMode>,
    pub activity_slots: ActivitySlots,
    pub auto_reply: Option<String>,
    pub persist_inbound_messages: bool,
}

impl Account {
    /// Create an account with a credential and default options.
    #[must_use]
    pub fn new(id: impl Into<AccountId>, credential: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            credential: SecretString::from(credential.into()),
            two_factor_seed: None,
            visibility: None,
            activity_slots: ActivitySlots::apps([DEFAULT_APP_ID]),
            auto_reply: None,
            persist_inbound_messages: true,
        }
    }

    #[must_use]
    pub fn with_two_factor_seed(mut self, seed: impl Into<String>) -> Self {
        self.two_factor_seed = Some(SecretString::from(seed.into()));
        self
    }

    #[must_use]
    pub const fn with_visibility(mut self, mode: VisibilityMode) -> Self {
        self.visibility = Some(mode);
        self
    }

    #[must_use]
    pub fn with_activity_slots(mut self, slots: ActivitySlots) -> Self {
        self.activity_slots = slots;
        self
    }

    #[must_use]
    pub fn with_auto_reply(mut self, text: impl Into<String>) -> Self {
        self.auto_reply = Some(text.into());
        self
    }

    #[must_use]
    pub const fn with_persisted_messages(mut self, persist: bool) -> Self {
        self.persist_inbound_messages = persist;
        self
    }

    /// Visibility to apply given the global default.
    ///
    /// The account is invisible when either side asks for it.
    #[must_use]
    pub fn effective_visibility(&self, default: VisibilityMode) -> VisibilityMode {
        if default == VisibilityMode::Invisible {
            return VisibilityMode::Invisible;
        }
        self.visibility.unwrap_or(default)
    }

    #[must_use]
    pub const fn has_two_factor_seed(&self) -> bool {
        self.two_factor_seed.is_some()
    }

    /// Convert back to the on-disk record.
    #[must_use]
    pub fn to_record(&self) -> AccountRecord {
        AccountRecord {
            username: self.id.as_str().to_owned(),
            password: self.credential.expose_secret().to_owned(),
            shared_secret: self
                .two_factor_seed
                .as_ref()
                .map(|s| s.expose_secret().to_owned())
                .unwrap_or_default(),
            invisible: self.visibility.map(|v| v == VisibilityMode::Invisible),
            games_and_status: Some(self.activity_slots.clone()),
            reply_message: self.auto_reply.clone().unwrap_or_default(),
            save_messages: self.persist_inbound_messages,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// On-disk account record, using the account file's field names.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub shared_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invisible: Option<bool>,
    #[serde(default)]
    pub games_and_status: Option<ActivitySlots>,
    #[serde(default)]
    pub reply_message: String,
    #[serde(default = "default_true")]
    pub save_messages: bool,
}

impl fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRecord")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("has_shared_secret", &!self.shared_secret.is_empty())
            .field("invisible", &self.invisible)
            .field("games_and_status", &self.games_and_status)
            .finish_non_exhaustive()
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

impl From<AccountRecord> for Account {
    fn from(record: AccountRecord) -> Self {
        Self {
            id: AccountId::new(record.username),
            credential: SecretString::from(record.password),
            two_factor_seed: non_empty(record.shared_secret).map(SecretString::from),
            visibility: record.invisible.map(|invisible| {
                if invisible {
                    VisibilityMode::Invisible
                } else {
                    VisibilityMode::Visible
                }
            }),
            activity_slots: record
                .games_and_status
                .unwrap_or_else(|| ActivitySlots::apps([DEFAULT_APP_ID])),
            auto_reply: non_empty(record.reply_message),
            persist_inbound_messages: record.save_messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_case_insensitive() {
        let a = AccountId::new("PlayerOne");
        let b = AccountId::new("playerone");
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert_eq!(set.iter().next().unwrap().as_str(), "PlayerOne");
    }

    #[test]
    fn test_slots_label_moves_first() {
        let slots = ActivitySlots::new([
            ActivitySlot::App(440),
            ActivitySlot::Label("Idling".into()),
            ActivitySlot::App(570),
        ]);
        assert_eq!(slots.label(), Some("Idling"));
        assert_eq!(slots.app_ids().collect::<Vec<_>>(), vec![440, 570]);
        assert_eq!(slots.len(), 3);
    }

    #[test]
    fn test_slots_drop_duplicates_and_extra_labels() {
        let slots = ActivitySlots::new([
            ActivitySlot::Label("first".into()),
            ActivitySlot::App(730),
            ActivitySlot::App(730),
            ActivitySlot::Label("second".into()),
            ActivitySlot::App(0),
        ]);
        assert_eq!(slots.label(), Some("first"));
        assert_eq!(slots.app_count(), 1);
    }

    #[test]
    fn test_slots_from_mixed_json() {
        let slots: ActivitySlots = serde_json::from_str(r#"[730, "Away", 440]"#).unwrap();
        assert_eq!(slots.label(), Some("Away"));
        assert_eq!(slots.app_count(), 2);

        let json = serde_json::to_string(&slots).unwrap();
        assert_eq!(json, r#"["Away",730,440]"#);
    }

    #[test]
    fn test_with_label_replaces_existing() {
        let slots = ActivitySlots::apps([10, 20]).with_label("a").with_label("b");
        assert_eq!(slots.label(), Some("b"));
        assert_eq!(slots.app_count(), 2);
    }

    #[test]
    fn test_record_conversion() {
        let json = r#"{
            "username": "alice",
            "password": "hunter2",
            "sharedSecret": "",
            "invisible": true,
            "gamesAndStatus": ["Busy", 570],
            "replyMessage": "afk"
        }"#;
        let record: AccountRecord = serde_json::from_str(json).unwrap();
        let account = Account::from(record);

        assert_eq!(account.id.as_str(), "alice");
        assert!(!account.has_two_factor_seed());
        assert_eq!(account.visibility, Some(VisibilityMode::Invisible));
        assert_eq!(account.auto_reply.as_deref(), Some("afk"));
        assert!(account.persist_inbound_messages);
        assert_eq!(account.credential.expose_secret(), "hunter2");
    }

    #[test]
    fn test_record_defaults_activity() {
        let record: AccountRecord =
            serde_json::from_str(r#"{"username": "bob", "password": "pw"}"#).unwrap();
        let account = Account::from(record);
        assert_eq!(account.activity_slots, ActivitySlots::apps([DEFAULT_APP_ID]));
        assert_eq!(account.visibility, None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let account = Account::new("carol", "topsecret").with_two_factor_seed("seedvalue");
        let debug = format!("{account:?}");
        assert!(!debug.contains("topsecret"));
        assert!(!debug.contains("seedvalue"));

        let debug = format!("{:?}", account.to_record());
        assert!(!debug.contains("topsecret"));
    }

    #[test]
    fn test_effective_visibility() {
        let account = Account::new("dave", "pw");
        assert_eq!(
            account.effective_visibility(VisibilityMode::Invisible),
            VisibilityMode::Invisible
        );
        let account = account.with_visibility(VisibilityMode::Visible);
        assert_eq!(
            account.effective_visibility(VisibilityMode::Invisible),
            VisibilityMode::Invisible
        );
        assert_eq!(
            account.effective_visibility(VisibilityMode::Visible),
            VisibilityMode::Visible
        );

        let account = account.with_visibility(VisibilityMode::Invisible);
        assert_eq!(
            account.effective_visibility(VisibilityMode::Visible),
            VisibilityMode::Invisible
        );
    }

    #[test]
    fn test_global_invisible_mode_beats_record_flag() {
        let settings = crate::Settings::from_json(r#"{"invisibleMode": true}"#).unwrap();
        let record: AccountRecord = serde_json::from_value(serde_json::json!({
            "username": "erin",
            "password": "pw",
            "invisible": false
        }))
        .unwrap();
        let account = Account::from(record);

        assert_eq!(account.visibility, Some(VisibilityMode::Visible));
        assert_eq!(
            account.effective_visibility(settings.default_visibility),
            VisibilityMode::Invisible
        );
    }
}
