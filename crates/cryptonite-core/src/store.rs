//! Persisted properties.
//!
//! [`KeyValueStore`] is the opaque string store supplied by the host.
//! [`PropertyStore`] layers the key catalogue and typed accessors over it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// A backend could not tell whether a key exists.
#[derive(Debug, Error)]
#[error("failed to read {key}: {reason}")]
pub struct ReadError {
    pub key: String,
    pub reason: String,
}

/// Opaque persistent key-value store.
///
/// Plain reads and writes are infallible: a backend that can fail logs the
/// failure and behaves as if the key were absent. [`try_get`](Self::try_get)
/// is for callers that must not mistake a failed read for a missing key.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn try_get(&self, key: &str) -> Result<Option<String>, ReadError> {
        Ok(self.get(key))
    }

    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn clear(&self);
}

/// In-memory store, used by tests and as a fallback when no database is available.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values.write().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }

    fn clear(&self) {
        self.values.write().clear();
    }
}

/// Persisted key names.
pub mod keys {
    const PREFIX: &str = "metacert.cryptonite.general.";

    macro_rules! key {
        ($name:ident, $suffix:literal) => {
            pub const $name: &str = concat!("metacert.cryptonite.general.", $suffix);
        };
    }

    key!(ENABLE_BANNER_ANNOTATION, "enable.banner.annotation");
    key!(ENABLE_WEBSITE_ANNOTATIONS, "enable.website.annotations");
    key!(ENABLE_TWITTER_MENTIONS_ANNOTATIONS, "enable.twitter.mentions.annotations");
    key!(FIRST_RUN_PAGE_DISPLAYED, "firstRunPage.displayed");
    key!(CRYPTO_URLS_HISTORY, "crypto.urls.history.array");
    key!(ACCESS_ANYWAY_URLS, "access.anyway.urls.array");
    key!(DISPLAY_UPDATE_BANNER, "display.update.banner");
    key!(DISPLAY_INSTALL_BANNER, "display.install.banner");
    key!(UPDATE_BANNER_TAB_ID, "update.banner.tab.id");
    key!(INSTALL_BANNER_TAB_ID, "install.banner.tab.id");
    key!(ACCESS_ANYWAY_FIX_APPLIED, "is.access.anyway.fix.applied");
    key!(EXTENSION_PAID, "extension.paid");
    key!(TRIAL_ACTIVE, "trial.active");
    key!(TRIAL_START_TIMESTAMP, "trial.start.timestamp");
    key!(SUBSCRIPTION_ID, "subscription.id");

    // Replaced by ENABLE_BANNER_ANNOTATION.
    key!(LEGACY_ENABLE_ALL_ANNOTATIONS, "enable.all.annotations");

    /// Returns true if the key belongs to this extension.
    pub fn is_cryptonite_key(key: &str) -> bool {
        key.starts_with(PREFIX)
    }
}

/// Tab id stored when no banner has been shown yet.
pub const NO_BANNER_TAB: i64 = -1;

/// Typed view over a [`KeyValueStore`].
///
/// Values are written as JSON text unless they are plain strings. Reads try
/// JSON first and fall back to the raw stored string.
#[derive(Clone)]
pub struct PropertyStore {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyStore").finish_non_exhaustive()
    }
}

impl PropertyStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Property store over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// The underlying raw store.
    pub fn raw(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Seeds defaults for missing keys and migrates legacy keys.
    ///
    /// Keys that cannot be read are left alone.
    pub fn init(&self) {
        self.seed(keys::ENABLE_BANNER_ANNOTATION, &true);
        self.seed(keys::ENABLE_WEBSITE_ANNOTATIONS, &true);
        self.seed(keys::ENABLE_TWITTER_MENTIONS_ANNOTATIONS, &true);
        self.seed(keys::FIRST_RUN_PAGE_DISPLAYED, &false);
        self.seed(keys::CRYPTO_URLS_HISTORY, &Vec::<Value>::new());
        self.seed(keys::ACCESS_ANYWAY_URLS, &Vec::<String>::new());
        self.seed(keys::DISPLAY_UPDATE_BANNER, &false);
        self.seed(keys::DISPLAY_INSTALL_BANNER, &false);
        self.seed(keys::UPDATE_BANNER_TAB_ID, &NO_BANNER_TAB);
        self.seed(keys::INSTALL_BANNER_TAB_ID, &NO_BANNER_TAB);
        self.seed(keys::ACCESS_ANYWAY_FIX_APPLIED, &false);

        if let Some(legacy) = self.get(keys::LEGACY_ENABLE_ALL_ANNOTATIONS) {
            debug!("Migrating legacy annotation setting");
            self.set(keys::ENABLE_BANNER_ANNOTATION, &legacy);
            self.remove(keys::LEGACY_ENABLE_ALL_ANNOTATIONS);
        }
    }

    fn seed<T: Serialize>(&self, key: &str, default: &T) {
        match self.store.try_get(key) {
            Ok(None) => self.set(key, default),
            Ok(Some(_)) => {}
            Err(e) => warn!(error = %e, "Not seeding unreadable property"),
        }
    }

    /// Reads a value. Unparseable JSON comes back as a string value.
    pub fn get(&self, key: &str) -> Option<Value> {
        let raw = self.store.get(key)?;
        Some(serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
    }

    /// Writes a value as JSON, or verbatim if it serializes to a string.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(Value::String(s)) => self.store.set(key, &s),
            Ok(other) => self.store.set(key, &other.to_string()),
            Err(e) => warn!(key, error = %e, "Failed to serialize property"),
        }
    }

    pub fn remove(&self, key: &str) {
        self.store.remove(key);
    }

    /// Reads a flag. Missing or non-boolean values read as false.
    pub fn get_bool(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Reads a JSON array. Missing or malformed values read as empty.
    pub fn get_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        match self.get(key) {
            Some(value @ Value::Array(_)) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(key, error = %e, "Stored list has unexpected shape");
                Vec::new()
            }),
            _ => Vec::new(),
        }
    }
}
