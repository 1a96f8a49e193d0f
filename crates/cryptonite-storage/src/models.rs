//! Data models for storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored extension property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    /// Raw stored text, JSON or a plain string.
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
