//! Properties table layout.
//!
//! The version lives in SQLite's `user_version` header field.

use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, StorageError};

pub const SCHEMA_VERSION: i32 = 1;

// Values are opaque strings; typing happens in the core property layer.
const PROPERTIES_DDL: &str = "CREATE TABLE IF NOT EXISTS properties (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

/// Creates the properties table on a fresh file and checks the version of an old one.
pub fn ensure(conn: &Connection) -> Result<()> {
    let found: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if found > SCHEMA_VERSION {
        return Err(StorageError::SchemaTooNew {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    conn.execute(PROPERTIES_DDL, [])?;

    if found < SCHEMA_VERSION {
        info!(from = found, to = SCHEMA_VERSION, "Initialized properties schema");
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
}
