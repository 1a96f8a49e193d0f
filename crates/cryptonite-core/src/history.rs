//! Visited crypto-site history.

use serde::{Deserialize, Serialize};

use crate::store::{keys, PropertyStore};

/// A verified site the user opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    pub favicon: String,
}

impl HistoryEntry {
    pub fn new(url: impl Into<String>, favicon: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            favicon: favicon.into(),
        }
    }
}

/// Bounded, url-deduplicated history, oldest first.
#[derive(Debug, Clone)]
pub struct History {
    props: PropertyStore,
    max_stored: usize,
    max_displayed: usize,
}

impl History {
    pub fn new(props: PropertyStore, max_stored: usize, max_displayed: usize) -> Self {
        Self {
            props,
            max_stored,
            max_displayed,
        }
    }

    /// All stored entries, oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.props.get_list(keys::CRYPTO_URLS_HISTORY)
    }

    /// Adds or refreshes an entry.
    ///
    /// An existing entry with the same url is moved to the end. The oldest
    /// entries are dropped beyond the stored limit.
    pub fn upsert(&self, entry: HistoryEntry) {
        let mut entries = self.entries();
        entries.retain(|e| e.url != entry.url);
        entries.push(entry);

        if entries.len() > self.max_stored {
            let excess = entries.len() - self.max_stored;
            entries.drain(..excess);
        }

        self.props.set(keys::CRYPTO_URLS_HISTORY, &entries);
    }

    /// Most recent entries first, up to `limit` (display limit by default).
    pub fn recent(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        let limit = limit.unwrap_or(self.max_displayed);
        self.entries().into_iter().rev().take(limit).collect()
    }

    pub fn clear(&self) {
        self.props
            .set(keys::CRYPTO_URLS_HISTORY, &Vec::<HistoryEntry>::new());
    }
}
