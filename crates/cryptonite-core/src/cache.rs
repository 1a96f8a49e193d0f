//! Local short-circuits in front of the remote classifier.
//!
//! Two sources can settle a URL without a lookup: the known-domain matcher
//! and the user's access-anyway overrides.

use tracing::{debug, info};

use crate::known_domains::KnownDomainsMatcher;
use crate::store::{keys, PropertyStore};

/// Query parameter appended to a blocked URL when the user proceeds anyway.
pub const ACCESS_ANYWAY_PARAM: &str = "access-anyway=true";

/// Removes the access-anyway parameter from a URL.
///
/// The `?`, `&` and bare forms are tried in that order and only the first
/// form found is removed, once.
pub fn remove_access_anyway_param(url: &str) -> String {
    const FORMS: [&str; 3] = [
        "?access-anyway=true",
        "&access-anyway=true",
        ACCESS_ANYWAY_PARAM,
    ];

    for form in FORMS {
        if url.contains(form) {
            return url.replacen(form, "", 1);
        }
    }
    url.to_string()
}

/// Known-domain matcher plus the persisted access-anyway set.
#[derive(Debug)]
pub struct ClassificationCache {
    known_domains: Vec<String>,
    matcher: Option<KnownDomainsMatcher>,
    props: PropertyStore,
}

impl ClassificationCache {
    pub fn new(known_domains: Vec<String>, props: PropertyStore) -> Self {
        Self {
            known_domains,
            matcher: None,
            props,
        }
    }

    /// Compiles the known-domain matcher. Later calls are no-ops until
    /// [`reset_known_domains_matcher`](Self::reset_known_domains_matcher).
    pub fn build_known_domains_matcher(&mut self) -> &KnownDomainsMatcher {
        self.matcher
            .get_or_insert_with(|| KnownDomainsMatcher::build(&self.known_domains))
    }

    /// Drops the compiled matcher, optionally replacing the domain list.
    pub fn reset_known_domains_matcher(&mut self, known_domains: Option<Vec<String>>) {
        if let Some(domains) = known_domains {
            self.known_domains = domains;
        }
        self.matcher = None;
    }

    /// Returns true if the domain is trusted without a lookup.
    ///
    /// An empty domain counts as known.
    pub fn is_known_domain(&mut self, domain: &str) -> bool {
        if domain.is_empty() {
            return true;
        }
        self.build_known_domains_matcher().is_match(domain)
    }

    /// The stored access-anyway URLs.
    pub fn access_anyway_urls(&self) -> Vec<String> {
        self.props.get_list(keys::ACCESS_ANYWAY_URLS)
    }

    pub fn is_access_anyway(&self, url: &str) -> bool {
        let canonical = remove_access_anyway_param(url);
        self.access_anyway_urls().contains(&canonical)
    }

    /// Records a user override. Adding a URL already present is a no-op.
    pub fn add_access_anyway(&self, url: &str) {
        let canonical = remove_access_anyway_param(url);
        let mut urls = self.access_anyway_urls();

        if urls.contains(&canonical) {
            return;
        }

        debug!(url = %canonical, "Adding access-anyway override");
        urls.push(canonical);
        self.props.set(keys::ACCESS_ANYWAY_URLS, &urls);
    }

    /// Clears every override. Called at browser startup.
    pub fn reset_access_anyway_list(&self) {
        info!("Resetting access-anyway overrides");
        self.props
            .set(keys::ACCESS_ANYWAY_URLS, &Vec::<String>::new());
    }

    /// Removes known-bad entries exactly once.
    ///
    /// Returns true if the migration ran on this call.
    pub fn apply_one_time_migration<S: AsRef<str>>(&self, known_bad: &[S]) -> bool {
        if self.props.get_bool(keys::ACCESS_ANYWAY_FIX_APPLIED) {
            return false;
        }

        let before = self.access_anyway_urls();
        let kept: Vec<String> = before
            .iter()
            .filter(|url| !known_bad.iter().any(|bad| bad.as_ref() == url.as_str()))
            .cloned()
            .collect();

        info!(
            removed = before.len() - kept.len(),
            "Applied access-anyway migration"
        );
        self.props.set(keys::ACCESS_ANYWAY_URLS, &kept);
        self.props.set(keys::ACCESS_ANYWAY_FIX_APPLIED, &true);
        true
    }
}
