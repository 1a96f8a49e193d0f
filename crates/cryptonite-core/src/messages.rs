//! Messages exchanged with content scripts.
//!
//! Both directions are tagged by an `operation` field.

use serde::{Deserialize, Serialize};

use crate::annotation::{Annotation, LinkNode};
use crate::platform::TabId;
use crate::verdict::Verdict;

/// Annotation preferences attached to every page-level message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationFlags {
    pub is_banner_annotation_enabled: bool,
    pub are_website_annotations_enabled: bool,
    pub are_twitter_mentions_annotations_enabled: bool,
}

impl Default for AnnotationFlags {
    fn default() -> Self {
        Self {
            is_banner_annotation_enabled: true,
            are_website_annotations_enabled: true,
            are_twitter_mentions_annotations_enabled: true,
        }
    }
}

/// Classification of the page a tab is showing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteReport {
    pub url: String,
    #[serde(flatten)]
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force_flag_remove: bool,
    #[serde(flatten)]
    pub flags: AnnotationFlags,
}

/// Classification of one in-page link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkReport {
    pub node_id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub verdict: Verdict,
    #[serde(flatten)]
    pub flags: AnnotationFlags,
}

/// Background to content script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum TabMessage {
    /// Show the verified banner.
    FlagSite(SiteReport),
    /// Remove any banner.
    RemoveFlag(SiteReport),
    /// Scan the page for links to annotate.
    AnnotatePage(SiteReport),
    /// Result for a single link.
    #[serde(rename = "checkURL")]
    CheckUrl(LinkReport),
    /// Collect the links matching `selector` and report them with `scanLinks`.
    ScanLinks { selector: String },
    /// Decorate one scanned link.
    AnnotateLink(Annotation),
    /// Annotation preferences changed.
    EnableAnnotations(AnnotationFlags),
    #[serde(rename_all = "camelCase")]
    ForceUpdateBanner {
        extension_version: String,
        tab_id: TabId,
    },
    ForceInstallBanner,
}

impl TabMessage {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::FlagSite(_) => "flagSite",
            Self::RemoveFlag(_) => "removeFlag",
            Self::AnnotatePage(_) => "annotatePage",
            Self::CheckUrl(_) => "checkURL",
            Self::ScanLinks { .. } => "scanLinks",
            Self::AnnotateLink(_) => "annotateLink",
            Self::EnableAnnotations(_) => "enableAnnotations",
            Self::ForceUpdateBanner { .. } => "forceUpdateBanner",
            Self::ForceInstallBanner => "forceInstallBanner",
        }
    }
}

/// Content script or UI to background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum ExtensionMessage {
    /// Classify one in-page link.
    #[serde(rename = "checkURL", rename_all = "camelCase")]
    CheckUrl { url: String, node_id: String },
    /// Links found on the page after a `scanLinks` request.
    ScanLinks { links: Vec<LinkNode> },
    /// The user proceeded past a block page.
    AddAccessAnywayUrl { url: String },
    CloseAnnotationBanner,
    UpdateBannerClosed,
    InstallBannerClosed,
    /// Acknowledgement of `forceUpdateBanner`.
    #[serde(rename_all = "camelCase")]
    UpdateBannerShown { tab_id: TabId },
    /// Operations handled by the UI layer.
    #[serde(other)]
    Unsupported,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::PlaceFound;

    #[test]
    fn flag_site_wire_format() {
        let message = TabMessage::FlagSite(SiteReport {
            url: "https://coin.test/".to_string(),
            verdict: Verdict::new("cryptocurrency", PlaceFound::Domains),
            force_flag_remove: true,
            flags: AnnotationFlags::default(),
        });

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["operation"], "flagSite");
        assert_eq!(json["url"], "https://coin.test/");
        assert_eq!(json["type"], "cryptocurrency");
        assert_eq!(json["placeFound"], "domains");
        assert_eq!(json["forceFlagRemove"], true);
        assert_eq!(json["isBannerAnnotationEnabled"], true);

        let back: TabMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn remove_flag_omits_force_flag() {
        let message = TabMessage::RemoveFlag(SiteReport {
            url: "https://a.test/".to_string(),
            verdict: Verdict::none(),
            force_flag_remove: false,
            flags: AnnotationFlags::default(),
        });
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["operation"], message.operation());
        assert!(json.get("forceFlagRemove").is_none());
        assert!(json["type"].is_null());
    }

    #[test]
    fn link_result_nests_verdict() {
        let message = TabMessage::CheckUrl(LinkReport {
            node_id: "n-1".to_string(),
            url: "https://twitter.com/someone".to_string(),
            verdict: Verdict::new("crypto-phish", PlaceFound::Folders),
            flags: AnnotationFlags::default(),
        });
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["operation"], "checkURL");
        assert_eq!(json["nodeId"], "n-1");
        assert_eq!(json["type"]["type"], "crypto-phish");
        assert_eq!(json["type"]["placeFound"], "folders");
    }

    #[test]
    fn link_scan_wire_format() {
        let json = serde_json::to_value(TabMessage::ScanLinks {
            selector: ".twitter-atreply".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"operation": "scanLinks", "selector": ".twitter-atreply"})
        );

        let json = serde_json::to_value(TabMessage::AnnotateLink(Annotation {
            node_key: "k1".to_string(),
            verified: true,
            hidden: false,
        }))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"operation": "annotateLink", "nodeKey": "k1", "verified": true, "hidden": false})
        );

        let message: ExtensionMessage = serde_json::from_str(
            r#"{"operation": "scanLinks", "links": [{"key": "k1", "href": "https://a.test/", "isMention": true}, {"key": "k2"}]}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            ExtensionMessage::ScanLinks {
                links: vec![
                    LinkNode::new("k1", "https://a.test/").mention(),
                    LinkNode {
                        key: "k2".to_string(),
                        href: None,
                        is_mention: false,
                    },
                ]
            }
        );
    }

    #[test]
    fn banner_messages() {
        let json = serde_json::to_value(TabMessage::ForceUpdateBanner {
            extension_version: "0.3.0".to_string(),
            tab_id: 9,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"operation": "forceUpdateBanner", "extensionVersion": "0.3.0", "tabId": 9})
        );

        let json = serde_json::to_value(TabMessage::ForceInstallBanner).unwrap();
        assert_eq!(json, serde_json::json!({"operation": "forceInstallBanner"}));
    }

    #[test]
    fn inbound_messages_parse() {
        let message: ExtensionMessage = serde_json::from_str(
            r#"{"operation": "checkURL", "url": "https://a.test/", "nodeId": "x"}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            ExtensionMessage::CheckUrl {
                url: "https://a.test/".to_string(),
                node_id: "x".to_string()
            }
        );

        let message: ExtensionMessage =
            serde_json::from_str(r#"{"operation": "updateBannerShown", "tabId": 4}"#).unwrap();
        assert_eq!(message, ExtensionMessage::UpdateBannerShown { tab_id: 4 });

        let message: ExtensionMessage =
            serde_json::from_str(r#"{"operation": "closeAnnotationBanner"}"#).unwrap();
        assert_eq!(message, ExtensionMessage::CloseAnnotationBanner);
    }

    #[test]
    fn unknown_operations_are_unsupported() {
        let message: ExtensionMessage =
            serde_json::from_str(r#"{"operation": "buyExtension"}"#).unwrap();
        assert_eq!(message, ExtensionMessage::Unsupported);
    }
}
