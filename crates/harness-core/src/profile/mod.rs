//! Persisted profiles and settings
//!
//! [`ProfileStore`] owns every persisted setting of the harness:
//!
//! | key | value |
//! |-----|-------|
//! | `telnyx_client_options` | current [`ClientOptions`] (merge-on-read) |
//! | `telnyx_client_profiles` | saved [`ClientOptions`] list, keyed by login |
//! | `telnyx_client_mode` | [`ClientMode`] |
//! | `region` | region name, `"auto"` by default |
//! | `environment` | [`Environment`] |
//! | `telnyx-login-method` | [`LoginMethod`] |
//! | `telnyx_call_history` | [`CallHistoryEntry`] list, newest first |
//! | `telnyx_simple_user_client_options` | [`SimpleUserClientOptions`] (merge-on-read) |
//! | `telnyx_simple_user_call_options` | [`SimpleUserCallOptions`] (merge-on-read) |
//!
//! Reads never fail: missing or unreadable entries yield defaults. Writes
//! return the storage error, if any.

pub mod history;
pub mod merge;
pub mod options;
pub mod storage;

use std::sync::Arc;

use serde_json::Value;

use crate::error::{HarnessError, HarnessResult};
use crate::status::ClientMode;

pub use history::CallHistoryEntry;
pub use merge::{merge_over_defaults, StoredValue};
pub use options::{
    ClientOptions, Environment, LoginMethod, SimpleUserCallOptions, SimpleUserClientOptions,
};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};

pub const CLIENT_OPTIONS_KEY: &str = "telnyx_client_options";
pub const PROFILES_KEY: &str = "telnyx_client_profiles";
pub const CLIENT_MODE_KEY: &str = "telnyx_client_mode";
pub const REGION_KEY: &str = "region";
pub const ENVIRONMENT_KEY: &str = "environment";
pub const LOGIN_METHOD_KEY: &str = "telnyx-login-method";
pub const CALL_HISTORY_KEY: &str = "telnyx_call_history";
pub const SIMPLE_USER_CLIENT_OPTIONS_KEY: &str = "telnyx_simple_user_client_options";
pub const SIMPLE_USER_CALL_OPTIONS_KEY: &str = "telnyx_simple_user_call_options";

/// Default region name
pub const DEFAULT_REGION: &str = "auto";

/// Persisted settings of the harness
#[derive(Debug, Clone)]
pub struct ProfileStore {
    storage: Arc<dyn KeyValueStorage>,
    client_options: StoredValue<ClientOptions>,
    profiles: StoredValue<Vec<Value>>,
    client_mode: StoredValue<ClientMode>,
    region: StoredValue<String>,
    environment: StoredValue<Environment>,
    login_method: StoredValue<LoginMethod>,
    call_history: StoredValue<Vec<CallHistoryEntry>>,
    simple_user_options: StoredValue<SimpleUserClientOptions>,
    simple_user_call_options: StoredValue<SimpleUserCallOptions>,
}

impl ProfileStore {
    /// Store over `storage` with the built-in defaults
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_defaults(
            storage,
            ClientOptions::default(),
            SimpleUserClientOptions::default(),
        )
    }

    /// Store over `storage` with custom default templates
    pub fn with_defaults(
        storage: Arc<dyn KeyValueStorage>,
        client_defaults: ClientOptions,
        simple_user_defaults: SimpleUserClientOptions,
    ) -> Self {
        Self {
            storage,
            client_options: StoredValue::merging(CLIENT_OPTIONS_KEY, client_defaults),
            profiles: StoredValue::new(PROFILES_KEY, Vec::new()),
            client_mode: StoredValue::new(CLIENT_MODE_KEY, ClientMode::default()),
            region: StoredValue::new(REGION_KEY, DEFAULT_REGION.to_string()),
            environment: StoredValue::new(ENVIRONMENT_KEY, Environment::default()),
            login_method: StoredValue::new(LOGIN_METHOD_KEY, LoginMethod::default()),
            call_history: StoredValue::new(CALL_HISTORY_KEY, Vec::new()),
            simple_user_options: StoredValue::merging(
                SIMPLE_USER_CLIENT_OPTIONS_KEY,
                simple_user_defaults,
            ),
            simple_user_call_options: StoredValue::merging(
                SIMPLE_USER_CALL_OPTIONS_KEY,
                SimpleUserCallOptions::default(),
            ),
        }
    }

    /// Store backed by process memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStorage> {
        &self.storage
    }

    // --- current options ----------------------------------------------------

    pub fn current_options(&self) -> ClientOptions {
        self.client_options.read(self.storage.as_ref())
    }

    pub fn set_current_options(&self, options: &ClientOptions) -> HarnessResult<()> {
        self.client_options.write(self.storage.as_ref(), options)
    }

    // --- profiles -----------------------------------------------------------

    /// Saved profiles, each merged over the current defaults
    pub fn profiles(&self) -> Vec<ClientOptions> {
        let defaults = serde_json::to_value(self.client_options.default_value())
            .unwrap_or(Value::Null);

        self.profiles
            .read(self.storage.as_ref())
            .into_iter()
            .filter_map(|stored| {
                let merged = merge_over_defaults(&defaults, stored);
                match serde_json::from_value(merged) {
                    Ok(profile) => Some(profile),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping unreadable profile");
                        None
                    }
                }
            })
            .collect()
    }

    /// Insert or replace the profile with the same login
    ///
    /// Works on the stored JSON, so entries that no longer parse as
    /// [`ClientOptions`] are kept as they are.
    pub fn save_profile(&self, profile: &ClientOptions) -> HarnessResult<()> {
        let key = profile_key(profile);
        if key.is_empty() {
            return Err(HarnessError::config("profile needs a login or login token"));
        }

        let value = serde_json::to_value(profile)?;
        let mut stored = self.profiles.read(self.storage.as_ref());
        match stored.iter_mut().find(|existing| stored_profile_key(existing) == key) {
            Some(existing) => *existing = value,
            None => stored.push(value),
        }
        tracing::debug!(profile = %key, count = stored.len(), "Saved profile");
        self.profiles.write(self.storage.as_ref(), &stored)
    }

    /// Remove a profile; returns whether one was removed
    pub fn remove_profile(&self, login: &str) -> HarnessResult<bool> {
        let mut stored = self.profiles.read(self.storage.as_ref());
        let before = stored.len();
        stored.retain(|existing| stored_profile_key(existing) != login);
        if stored.len() == before {
            return Ok(false);
        }
        self.profiles.write(self.storage.as_ref(), &stored)?;
        Ok(true)
    }

    /// Make a saved profile the current option set
    pub fn select_profile(&self, login: &str) -> HarnessResult<ClientOptions> {
        let profile = self
            .profiles()
            .into_iter()
            .find(|profile| profile_key(profile) == login)
            .ok_or_else(|| HarnessError::ProfileNotFound {
                login: login.to_string(),
            })?;
        self.set_current_options(&profile)?;
        Ok(profile)
    }

    // --- simple settings ----------------------------------------------------

    pub fn client_mode(&self) -> ClientMode {
        self.client_mode.read(self.storage.as_ref())
    }

    pub fn set_client_mode(&self, mode: ClientMode) -> HarnessResult<()> {
        self.client_mode.write(self.storage.as_ref(), &mode)
    }

    pub fn region(&self) -> String {
        self.region.read(self.storage.as_ref())
    }

    pub fn set_region(&self, region: &str) -> HarnessResult<()> {
        let region = region.trim();
        let region = if region.is_empty() { DEFAULT_REGION } else { region };
        self.region.write(self.storage.as_ref(), &region.to_string())
    }

    pub fn environment(&self) -> Environment {
        self.environment.read(self.storage.as_ref())
    }

    pub fn set_environment(&self, environment: Environment) -> HarnessResult<()> {
        self.environment.write(self.storage.as_ref(), &environment)
    }

    pub fn login_method(&self) -> LoginMethod {
        self.login_method.read(self.storage.as_ref())
    }

    pub fn set_login_method(&self, method: LoginMethod) -> HarnessResult<()> {
        self.login_method.write(self.storage.as_ref(), &method)
    }

    // --- SIP device ---------------------------------------------------------

    pub fn simple_user_options(&self) -> SimpleUserClientOptions {
        self.simple_user_options.read(self.storage.as_ref())
    }

    pub fn set_simple_user_options(&self, options: &SimpleUserClientOptions) -> HarnessResult<()> {
        options.validate()?;
        self.simple_user_options.write(self.storage.as_ref(), options)
    }

    pub fn simple_user_call_options(&self) -> SimpleUserCallOptions {
        self.simple_user_call_options.read(self.storage.as_ref())
    }

    pub fn set_simple_user_call_options(&self, options: &SimpleUserCallOptions) -> HarnessResult<()> {
        self.simple_user_call_options
            .write(self.storage.as_ref(), options)
    }

    // --- call history -------------------------------------------------------

    pub fn call_history(&self) -> Vec<CallHistoryEntry> {
        self.call_history.read(self.storage.as_ref())
    }

    /// Add a finished call unless it is already recorded
    pub fn record_call(&self, entry: CallHistoryEntry) -> HarnessResult<bool> {
        let mut history = self.call_history();
        if !history::prepend_unique(&mut history, entry) {
            return Ok(false);
        }
        self.call_history.write(self.storage.as_ref(), &history)?;
        Ok(true)
    }

    pub fn clear_call_history(&self) -> HarnessResult<()> {
        self.call_history.write(self.storage.as_ref(), &Vec::new())
    }
}

/// Profiles are keyed by login, falling back to the token for token logins
fn profile_key(profile: &ClientOptions) -> &str {
    if profile.login.is_empty() {
        &profile.login_token
    } else {
        &profile.login
    }
}

/// Profile key of a stored entry, read without deserializing it
fn stored_profile_key(stored: &Value) -> &str {
    let field = |name: &str| stored.get(name).and_then(Value::as_str).unwrap_or_default();
    match field("login") {
        "" => field("login_token"),
        login => login,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::CallDirection;
    use serde_json::json;

    fn store() -> (Arc<MemoryStorage>, ProfileStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = ProfileStore::new(storage.clone());
        (storage, store)
    }

    #[test]
    fn defaults_when_nothing_is_stored() {
        let (_, store) = store();
        assert_eq!(store.current_options(), ClientOptions::default());
        assert_eq!(store.client_mode(), ClientMode::Sdk);
        assert_eq!(store.region(), "auto");
        assert_eq!(store.environment(), Environment::Development);
        assert_eq!(store.login_method(), LoginMethod::Credentials);
        assert!(store.profiles().is_empty());
        assert!(store.call_history().is_empty());
        assert_eq!(store.simple_user_options().port, "7443");
    }

    #[test]
    fn old_stored_options_pick_up_new_defaults() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(CLIENT_OPTIONS_KEY, json!({"login": "alice", "password": "pw"}).to_string())
            .unwrap();
        let defaults = ClientOptions {
            trickle_ice: true,
            ..Default::default()
        };
        let store = ProfileStore::with_defaults(storage, defaults, SimpleUserClientOptions::default());

        let options = store.current_options();
        assert_eq!(options.login, "alice");
        assert!(options.trickle_ice);
    }

    #[test]
    fn stored_values_win_over_defaults() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(SIMPLE_USER_CLIENT_OPTIONS_KEY, json!({"displayName": "Desk"}).to_string())
            .unwrap();
        let store = ProfileStore::new(storage);
        let options = store.simple_user_options();
        assert_eq!(options.display_name, "Desk");
        assert_eq!(options.host, "sip.telnyx.com");
    }

    #[test]
    fn profiles_upsert_by_login() {
        let (_, store) = store();
        store.save_profile(&ClientOptions::with_credentials("alice", "one")).unwrap();
        store.save_profile(&ClientOptions::with_credentials("bob", "two")).unwrap();
        store.save_profile(&ClientOptions::with_credentials("alice", "three")).unwrap();

        let profiles = store.profiles();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].password, "three");

        assert!(store.save_profile(&ClientOptions::default()).is_err());
    }

    #[test]
    fn selecting_a_profile_makes_it_current() {
        let (_, store) = store();
        store.save_profile(&ClientOptions::with_token("jwt-1")).unwrap();
        store.save_profile(&ClientOptions::with_credentials("bob", "two")).unwrap();

        let selected = store.select_profile("bob").unwrap();
        assert_eq!(store.current_options(), selected);
        assert!(matches!(
            store.select_profile("carol"),
            Err(HarnessError::ProfileNotFound { .. })
        ));

        assert!(store.remove_profile("jwt-1").unwrap());
        assert!(!store.remove_profile("jwt-1").unwrap());
        assert_eq!(store.profiles().len(), 1);
    }

    #[test]
    fn unreadable_profiles_survive_save_and_remove() {
        let (storage, store) = store();
        storage
            .set(
                PROFILES_KEY,
                json!([{"login": "bob", "password": "x", "debug": "yes"}]).to_string(),
            )
            .unwrap();
        assert!(store.profiles().is_empty());

        store.save_profile(&ClientOptions::with_credentials("alice", "pw")).unwrap();
        store.save_profile(&ClientOptions::with_token("jwt-1")).unwrap();
        assert!(store.remove_profile("jwt-1").unwrap());

        let raw: Value = serde_json::from_str(&storage.get(PROFILES_KEY).unwrap().unwrap()).unwrap();
        let logins: Vec<&str> = raw
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["login"].as_str().unwrap())
            .collect();
        assert_eq!(logins, ["bob", "alice"]);
        assert_eq!(raw[0]["debug"], "yes");
        assert_eq!(store.profiles().len(), 1);

        // an unreadable entry can still be replaced by login
        store.save_profile(&ClientOptions::with_credentials("bob", "new")).unwrap();
        assert_eq!(store.profiles().len(), 2);
        assert!(store.remove_profile("bob").unwrap());
        assert_eq!(store.profiles().len(), 1);
    }

    #[test]
    fn call_history_is_deduplicated_newest_first() {
        let (_, store) = store();
        assert!(store.record_call(CallHistoryEntry::new("c1", "100", CallDirection::Outbound)).unwrap());
        assert!(store.record_call(CallHistoryEntry::new("c2", "200", CallDirection::Inbound)).unwrap());
        assert!(!store.record_call(CallHistoryEntry::new("c1", "100", CallDirection::Outbound)).unwrap());

        let history = store.call_history();
        assert_eq!(history.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), ["c2", "c1"]);

        store.clear_call_history().unwrap();
        assert!(store.call_history().is_empty());
    }

    #[test]
    fn settings_round_trip() {
        let (storage, store) = store();
        store.set_client_mode(ClientMode::Sipjs).unwrap();
        store.set_region(" ").unwrap();
        store.set_environment(Environment::Production).unwrap();
        store.set_login_method(LoginMethod::Token).unwrap();

        assert_eq!(storage.get(CLIENT_MODE_KEY).unwrap().as_deref(), Some("\"sipjs\""));
        assert_eq!(store.region(), "auto");
        assert_eq!(store.environment(), Environment::Production);
        assert_eq!(store.login_method(), LoginMethod::Token);
    }

    #[test]
    fn unreadable_mode_falls_back_to_sdk() {
        let (storage, store) = store();
        storage.set(CLIENT_MODE_KEY, "\"teams\"".to_string()).unwrap();
        assert_eq!(store.client_mode(), ClientMode::Sdk);
    }
}
