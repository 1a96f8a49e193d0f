//! SQLite-backed [`KeyValueStore`].

use cryptonite_core::{KeyValueStore, ReadError};
use tracing::warn;

use crate::database::Database;

/// Property store persisted in SQLite.
///
/// Write failures are logged and dropped. Reads report failures through
/// [`KeyValueStore::try_get`]; plain `get` logs them and returns `None`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Option<String> {
        self.try_get(key).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read property");
            None
        })
    }

    fn try_get(&self, key: &str) -> Result<Option<String>, ReadError> {
        self.db
            .get_property(key)
            .map(|property| property.map(|p| p.value))
            .map_err(|e| ReadError {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.db.set_property(key, value) {
            warn!(key, error = %e, "Failed to write property");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.db.delete_property(key) {
            warn!(key, error = %e, "Failed to delete property");
        }
    }

    fn clear(&self) {
        if let Err(e) = self.db.clear_properties() {
            warn!(error = %e, "Failed to clear properties");
        }
    }
}
