//! SQLite database handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::models::Property;
use crate::repository::PropertiesRepo;
use crate::schema;

/// Database file name inside the data directory.
pub const DB_FILE_NAME: &str = "cryptonite.db";

/// Shared handle to the properties database.
///
/// One connection behind a lock; the host writes a few keys per navigation.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Opens the database in the default app data directory.
    pub fn new() -> Result<Self> {
        Self::with_path(Self::default_db_path()?)
    }

    /// Opens (or creates) the database file at `path`.
    pub fn with_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        info!("Opening database at: {:?}", path);
        let conn = Connection::open(path)?;
        // WAL keeps reads from blocking on the occasional write
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "Journal mode set");
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::ensure(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Platform data directory for Cryptonite.
    pub fn data_dir() -> Result<PathBuf> {
        ProjectDirs::from("com", "metacert", "cryptonite")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(StorageError::NoDataDir)
    }

    pub fn default_db_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join(DB_FILE_NAME))
    }

    pub fn get_property(&self, key: &str) -> Result<Option<Property>> {
        PropertiesRepo::get(&self.conn.lock(), key)
    }

    pub fn set_property(&self, key: &str, value: &str) -> Result<()> {
        PropertiesRepo::set(&self.conn.lock(), key, value)
    }

    pub fn delete_property(&self, key: &str) -> Result<bool> {
        PropertiesRepo::delete(&self.conn.lock(), key)
    }

    pub fn clear_properties(&self) -> Result<usize> {
        PropertiesRepo::clear(&self.conn.lock())
    }

    pub fn get_all_properties(&self) -> Result<Vec<Property>> {
        PropertiesRepo::get_all(&self.conn.lock())
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }
}
