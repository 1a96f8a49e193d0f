//! Cryptonite Storage - SQLite persistence layer.
//!
//! Backs the core [`KeyValueStore`](cryptonite_core::KeyValueStore) with a
//! single `properties` table so extension state survives restarts.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cryptonite_core::PropertyStore;
//! use cryptonite_storage::{Database, SqliteStore};
//!
//! let db = Database::new().unwrap();
//! let props = PropertyStore::new(Arc::new(SqliteStore::new(db)));
//! props.init();
//! ```

mod database;
pub mod error;
pub mod models;
pub mod repository;
mod schema;
mod store;

pub use database::{Database, DB_FILE_NAME};
pub use error::{Result, StorageError};
pub use models::Property;
pub use repository::PropertiesRepo;
pub use store::SqliteStore;
