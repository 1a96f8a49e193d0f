//! Storage error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cannot create database directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The platform reports no home directory.
    #[error("no data directory available on this platform")]
    NoDataDir,

    /// The file was written by a newer build.
    #[error("database schema version {found} is newer than {supported}")]
    SchemaTooNew { found: i32, supported: i32 },
}

pub type Result<T> = std::result::Result<T, StorageError>;
