//! In-page link annotation.
//!
//! Content-script side of the link flow. Each link on a check-internally
//! site gets one correlation id and one `checkURL` request per page load;
//! results are matched back to the node by that id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain_policy::extract_domain_parts;
use crate::messages::{ExtensionMessage, LinkReport};
use crate::verdict::CategoryPolicy;

/// Maps a page host to the site id used for selector lookup.
pub fn site_id_for_host(host: &str) -> String {
    let domain = extract_domain_parts(host).domain;
    match domain.as_str() {
        "facebook.com" => "facebook",
        "twitter.com" => "twitter",
        "yahoo.com" => "yahoo",
        "aol.com" => "aol",
        other => other,
    }
    .to_string()
}

/// A link found on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkNode {
    /// Stable identity of the DOM node for the page lifetime.
    pub key: String,
    #[serde(default)]
    pub href: Option<String>,
    /// True for `@mention` links.
    #[serde(default)]
    pub is_mention: bool,
}

impl LinkNode {
    pub fn new(key: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            href: Some(href.into()),
            is_mention: false,
        }
    }

    pub fn mention(mut self) -> Self {
        self.is_mention = true;
        self
    }
}

/// How a link result should be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub node_key: String,
    /// Green shield when true, black otherwise.
    pub verified: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone)]
struct NodeState {
    key: String,
    is_mention: bool,
    flagged_type: Option<String>,
}

/// Per-page annotation state.
#[derive(Debug)]
pub struct PageAnnotator {
    site_id: String,
    selector: Option<String>,
    policy: CategoryPolicy,
    /// Node key to correlation id.
    processed: HashMap<String, String>,
    /// Correlation id to node.
    nodes: HashMap<String, NodeState>,
}

impl PageAnnotator {
    pub fn for_host(host: &str, config: &EngineConfig) -> Self {
        let site_id = site_id_for_host(host);
        let selector = config.check_internally_domains.get(&site_id).cloned();

        debug!(site_id = %site_id, checked = selector.is_some(), "Identified site");

        Self {
            site_id,
            selector,
            policy: CategoryPolicy::from_config(config),
            processed: HashMap::new(),
            nodes: HashMap::new(),
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// CSS selector of links to scan, if this site is checked link by link.
    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    pub fn is_check_internally(&self) -> bool {
        self.selector.is_some()
    }

    /// Assigns correlation ids to new links and emits their lookups.
    ///
    /// Links already processed or flagged are skipped. Links without an
    /// href are marked processed but not looked up.
    pub fn scan(&mut self, links: &[LinkNode]) -> Vec<ExtensionMessage> {
        if !self.is_check_internally() {
            return Vec::new();
        }

        let mut requests = Vec::new();
        for link in links {
            if self.processed.contains_key(&link.key) {
                continue;
            }

            let node_id = Uuid::new_v4().to_string();
            self.processed.insert(link.key.clone(), node_id.clone());
            self.nodes.insert(
                node_id.clone(),
                NodeState {
                    key: link.key.clone(),
                    is_mention: link.is_mention,
                    flagged_type: None,
                },
            );

            match link.href.as_deref().map(str::trim) {
                Some(href) if !href.is_empty() => requests.push(ExtensionMessage::CheckUrl {
                    url: href.to_string(),
                    node_id,
                }),
                _ => {}
            }
        }

        requests
    }

    /// Applies a link result to the node it was requested for.
    ///
    /// Unknown correlation ids and results without a type are ignored.
    pub fn apply_result(&mut self, report: &LinkReport) -> Option<Annotation> {
        let kind = report.verdict.kind()?;
        let node = self.nodes.get_mut(&report.node_id)?;

        node.flagged_type = Some(kind.to_string());

        let hidden = !report.flags.are_website_annotations_enabled
            || (node.is_mention && !report.flags.are_twitter_mentions_annotations_enabled);

        Some(Annotation {
            node_key: node.key.clone(),
            verified: self.policy.should_display_website_banner(Some(kind)),
            hidden,
        })
    }

    /// Returns true if `node_id` was issued by this page's scan.
    pub fn knows(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Type recorded for a node, if a result arrived.
    pub fn flagged_type(&self, node_key: &str) -> Option<&str> {
        let node_id = self.processed.get(node_key)?;
        self.nodes.get(node_id)?.flagged_type.as_deref()
    }

    /// Forgets every node. Called on a new page load.
    pub fn reset(&mut self) {
        self.processed.clear();
        self.nodes.clear();
    }
}
