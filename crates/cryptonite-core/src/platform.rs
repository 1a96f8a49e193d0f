//! Browser capabilities the engine drives.
//!
//! The engine never talks to a browser directly. Everything it does to the
//! outside world goes through [`Platform`], injected at construction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::messages::TabMessage;
use crate::verdict::PlaceFound;

/// Browser tab id.
pub type TabId = i64;

/// Loading phase reported with a tab update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    #[default]
    Complete,
}

/// Snapshot of a browser tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: TabStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
}

impl Tab {
    pub fn new(id: TabId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            status: TabStatus::Complete,
            fav_icon_url: None,
        }
    }

    pub fn loading(mut self) -> Self {
        self.status = TabStatus::Loading;
        self
    }

    pub fn with_favicon(mut self, favicon: impl Into<String>) -> Self {
        self.fav_icon_url = Some(favicon.into());
        self
    }

    pub fn is_loading(&self) -> bool {
        self.status == TabStatus::Loading
    }
}

/// Toolbar icon variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Icon {
    #[default]
    Default,
    Verified,
    AccessAnyway,
}

impl Icon {
    /// Extension-relative image path.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Default => "/images/black/cryptonite-icon-128x128.png",
            Self::Verified => "/images/green/cryptonite-icon-128x128.png",
            Self::AccessAnyway => "/images/red/cryptonite-icon-128x128.png",
        }
    }
}

/// Toolbar tooltip, as a localization key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", rename_all = "snake_case")]
pub enum Tooltip {
    #[default]
    Default,
    Verified {
        #[serde(rename = "placeFound")]
        place_found: PlaceFound,
    },
    AccessAnyway,
    TrialExpired,
}

impl Tooltip {
    /// Localization message name.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::Default => "button_openPopup_black",
            Self::Verified { .. } => "button_openPopup_green",
            Self::AccessAnyway => "button_openPopup_red",
            Self::TrialExpired => "button_openPopup_trialExpired",
        }
    }

    /// Localization message substituted into the main message, if any.
    pub fn argument_key(&self) -> Option<String> {
        match self {
            Self::Verified { place_found } => Some(format!("button_openPopup_verify_{place_found}")),
            _ => None,
        }
    }
}

/// Badge shown when the extension cannot be used.
pub const TRIAL_EXPIRED_BADGE: &str = "!";

/// Icon, tooltip and badge for one tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionState {
    pub icon: Icon,
    pub title: Tooltip,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
}

impl ActionState {
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn verified(place_found: PlaceFound) -> Self {
        Self {
            icon: Icon::Verified,
            title: Tooltip::Verified { place_found },
            badge: None,
        }
    }

    pub fn access_anyway() -> Self {
        Self {
            icon: Icon::AccessAnyway,
            title: Tooltip::AccessAnyway,
            badge: None,
        }
    }

    pub fn trial_expired() -> Self {
        Self {
            icon: Icon::Default,
            title: Tooltip::TrialExpired,
            badge: Some(TRIAL_EXPIRED_BADGE.to_string()),
        }
    }
}

/// Capabilities supplied by the host browser.
///
/// Implementations use interior mutability; the engine holds a shared reference.
pub trait Platform: Send + Sync {
    /// Sets the toolbar action state for a tab.
    fn set_action(&self, tab_id: TabId, state: ActionState);

    /// Navigates a tab to a new URL.
    fn redirect(&self, tab_id: TabId, url: &str);

    /// Delivers a message to the content script of a tab.
    fn send_to_tab(&self, tab_id: TabId, message: TabMessage);

    fn reload_tab(&self, tab_id: TabId);

    fn open_tab(&self, url: &str);

    /// Current state of a tab, or `None` if it was closed.
    fn tab(&self, tab_id: TabId) -> Option<Tab>;

    fn tabs(&self) -> Vec<Tab>;

    /// Absolute URL of an extension resource.
    fn extension_url(&self, path: &str) -> String;

    /// Asks the host to call back when the trial should expire.
    fn schedule_trial_expiry(&self, at: DateTime<Utc>);
}

/// Serialized form of every platform call that changes something.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Directive {
    #[serde(rename_all = "camelCase")]
    SetAction { tab_id: TabId, state: ActionState },
    #[serde(rename_all = "camelCase")]
    Redirect { tab_id: TabId, url: String },
    #[serde(rename_all = "camelCase")]
    SendToTab { tab_id: TabId, message: TabMessage },
    #[serde(rename_all = "camelCase")]
    ReloadTab { tab_id: TabId },
    OpenTab { url: String },
    #[serde(rename_all = "camelCase")]
    ScheduleTrialExpiry { at: DateTime<Utc> },
}

/// [`Platform`] that records directives for a remote host to execute.
///
/// Tab state is mirrored from the events the host reports. Directives
/// produced inside [`capture`](Self::capture) belong to that caller; all
/// others collect in a shared backlog read by [`drain`](Self::drain).
#[derive(Debug, Default)]
pub struct DirectiveQueue {
    base_url: String,
    tabs: Mutex<BTreeMap<TabId, Tab>>,
    pending: Mutex<Vec<Directive>>,
    captured: Mutex<Option<Vec<Directive>>>,
    trial_expiry: Mutex<Option<DateTime<Utc>>>,
}

impl DirectiveQueue {
    /// `base_url` is the extension origin, for example `chrome-extension://<id>/`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Records or replaces a tab snapshot.
    pub fn upsert_tab(&self, tab: Tab) {
        self.tabs.lock().insert(tab.id, tab);
    }

    pub fn remove_tab(&self, tab_id: TabId) {
        self.tabs.lock().remove(&tab_id);
    }

    /// Runs `f` and returns the directives it produced.
    ///
    /// Captures must not run concurrently; callers serialize them behind
    /// the lock that guards the engine.
    pub fn capture<R>(&self, f: impl FnOnce() -> R) -> (R, Vec<Directive>) {
        let outer = self.captured.lock().replace(Vec::new());
        let result = f();
        let produced = std::mem::replace(&mut *self.captured.lock(), outer).unwrap_or_default();
        (result, produced)
    }

    /// Takes every directive recorded outside a capture.
    pub fn drain(&self) -> Vec<Directive> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Directives recorded so far, without removing them.
    pub fn pending(&self) -> Vec<Directive> {
        self.pending.lock().clone()
    }

    /// The most recently requested trial expiry.
    pub fn trial_expiry(&self) -> Option<DateTime<Utc>> {
        *self.trial_expiry.lock()
    }

    /// Clears the trial expiry if it is due. Returns true if it was.
    pub fn take_due_trial_expiry(&self, now: DateTime<Utc>) -> bool {
        let mut expiry = self.trial_expiry.lock();
        match *expiry {
            Some(at) if at <= now => {
                *expiry = None;
                true
            }
            _ => false,
        }
    }

    fn push(&self, directive: Directive) {
        match self.captured.lock().as_mut() {
            Some(produced) => produced.push(directive),
            None => self.pending.lock().push(directive),
        }
    }
}

impl Platform for DirectiveQueue {
    fn set_action(&self, tab_id: TabId, state: ActionState) {
        self.push(Directive::SetAction { tab_id, state });
    }

    fn redirect(&self, tab_id: TabId, url: &str) {
        if let Some(tab) = self.tabs.lock().get_mut(&tab_id) {
            tab.url = url.to_string();
            tab.status = TabStatus::Loading;
        }
        self.push(Directive::Redirect {
            tab_id,
            url: url.to_string(),
        });
    }

    fn send_to_tab(&self, tab_id: TabId, message: TabMessage) {
        self.push(Directive::SendToTab { tab_id, message });
    }

    fn reload_tab(&self, tab_id: TabId) {
        self.push(Directive::ReloadTab { tab_id });
    }

    fn open_tab(&self, url: &str) {
        self.push(Directive::OpenTab {
            url: url.to_string(),
        });
    }

    fn tab(&self, tab_id: TabId) -> Option<Tab> {
        self.tabs.lock().get(&tab_id).cloned()
    }

    fn tabs(&self) -> Vec<Tab> {
        self.tabs.lock().values().cloned().collect()
    }

    fn extension_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn schedule_trial_expiry(&self, at: DateTime<Utc>) {
        *self.trial_expiry.lock() = Some(at);
        self.push(Directive::ScheduleTrialExpiry { at });
    }
}
