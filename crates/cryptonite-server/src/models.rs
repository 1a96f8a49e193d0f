//! Bridge request and response models.

use cryptonite_core::{
    Directive, ExtensionMessage, HistoryEntry, InstallReason, SubscriptionStatus, Tab, TabId,
    TabStatus,
};
use serde::{Deserialize, Serialize};

/// Event posted by the extension shell to POST /api/events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum InboundEvent {
    /// `tabs.onUpdated`.
    #[serde(rename_all = "camelCase")]
    TabUpdated {
        tab: Tab,
        /// Status carried by the change info, if any.
        #[serde(default)]
        status: Option<TabStatus>,
        /// The change info carried a new URL.
        #[serde(default)]
        url_changed: bool,
    },
    /// `tabs.onRemoved`.
    #[serde(rename_all = "camelCase")]
    TabRemoved { tab_id: TabId },
    /// `runtime.onInstalled`, with the currently open tabs.
    Installed {
        reason: InstallReason,
        #[serde(default)]
        tabs: Vec<Tab>,
    },
    /// `runtime.onStartup`, with the currently open tabs.
    Startup {
        #[serde(default)]
        tabs: Vec<Tab>,
    },
    /// `runtime.onMessage`.
    Message {
        #[serde(default)]
        sender: Option<Tab>,
        message: ExtensionMessage,
    },
    /// The first-run page opened in this tab.
    #[serde(rename_all = "camelCase")]
    InstallBannerTab { tab_id: TabId },
}

/// Response body for POST /api/events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResponse {
    /// Platform calls for the shell to execute, in order.
    pub directives: Vec<Directive>,
}

/// Query parameters for GET /api/history.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum entries to return (default: the display limit).
    pub limit: Option<usize>,
}

/// Response body for GET /api/history.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntry>,
}

/// Response body for GET /api/subscription.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    #[serde(flatten)]
    pub status: SubscriptionStatus,
    pub can_use_extension: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

/// Request body for POST /api/subscription/refresh.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSubscriptionRequest {
    /// Subscription to store before the lookup.
    #[serde(default)]
    pub subscription_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_updated_parses() {
        let event: InboundEvent = serde_json::from_str(
            r#"{"event": "tabUpdated", "tab": {"id": 3, "url": "https://a.test/"}, "status": "complete"}"#,
        )
        .unwrap();

        assert_eq!(
            event,
            InboundEvent::TabUpdated {
                tab: Tab::new(3, "https://a.test/"),
                status: Some(TabStatus::Complete),
                url_changed: false,
            }
        );
    }

    #[test]
    fn message_event_parses() {
        let event: InboundEvent = serde_json::from_str(
            r#"{"event": "message", "sender": {"id": 2, "url": "https://twitter.com/"},
                "message": {"operation": "checkURL", "url": "https://twitter.com/a", "nodeId": "n"}}"#,
        )
        .unwrap();

        match event {
            InboundEvent::Message { sender, message } => {
                assert_eq!(sender.map(|t| t.id), Some(2));
                assert!(matches!(message, ExtensionMessage::CheckUrl { .. }));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn lifecycle_events_parse() {
        let event: InboundEvent =
            serde_json::from_str(r#"{"event": "installed", "reason": "update"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Installed {
                reason: InstallReason::Update,
                tabs: vec![]
            }
        );

        let event: InboundEvent = serde_json::from_str(r#"{"event": "startup"}"#).unwrap();
        assert_eq!(event, InboundEvent::Startup { tabs: vec![] });
    }
}
