//! Decision engine.
//!
//! Turns navigation, lifecycle and message events into platform calls.
//! A tab check runs in two phases so the caller can await the remote
//! lookup without holding the engine:
//!
//! 1. [`DecisionEngine::begin_tab_check`] runs every local rule and either
//!    settles the check or returns a [`PendingLookup`].
//! 2. [`DecisionEngine::complete_tab_check`] applies the lookup result
//!    after re-reading the tab from the platform.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::annotation::PageAnnotator;
use crate::api::{self, CheckRequest, ClassificationApi, ClassificationResponse, CLIENT_VERSION};
use crate::cache::ClassificationCache;
use crate::config::EngineConfig;
use crate::domain_policy::{extract_domain_parts, is_local_tab, is_preferences_url};
use crate::history::{History, HistoryEntry};
use crate::messages::{AnnotationFlags, ExtensionMessage, LinkReport, SiteReport, TabMessage};
use crate::platform::{ActionState, Platform, Tab, TabId, TabStatus};
use crate::store::{keys, PropertyStore, NO_BANNER_TAB};
use crate::subscription::{SubscriptionGate, SubscriptionStatus};
use crate::verdict::{CategoryClass, CategoryPolicy, PlaceFound, Verdict};

/// Initial and fallback value of the last known URL.
pub const BLANK_PAGE: &str = "about:blank";

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// How a navigation reached the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckContext {
    /// The user loaded the page, as opposed to an automatic re-check.
    pub is_page_load: bool,
    /// The page had not finished loading.
    pub is_page_loading: bool,
}

impl CheckContext {
    pub const PAGE_COMPLETE: Self = Self {
        is_page_load: true,
        is_page_loading: false,
    };

    pub const PAGE_LOADING: Self = Self {
        is_page_load: true,
        is_page_loading: true,
    };

    pub const AUTOMATIC: Self = Self {
        is_page_load: false,
        is_page_loading: false,
    };
}

/// Why the extension was installed or updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallReason {
    Install,
    Update,
    ChromeUpdate,
    SharedModuleUpdate,
}

/// A tab check waiting on the remote classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLookup {
    pub tab_id: TabId,
    /// Tab URL at the time of the check.
    pub url: String,
    pub context: CheckContext,
    pub request: CheckRequest,
}

/// A link check waiting on the remote classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLookup {
    pub tab_id: TabId,
    pub request: CheckRequest,
}

/// Outcome of the local phase of a tab check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabCheck {
    /// The event does not trigger a check.
    Ignored,
    /// The subscription does not allow classification.
    Ineligible,
    /// Not a processable URL.
    OutOfScope,
    /// The extension's own options page.
    Preferences,
    /// The user chose to proceed to this URL.
    AccessAnyway,
    /// Trusted without a lookup.
    Known,
    Lookup(PendingLookup),
}

impl TabCheck {
    pub fn into_lookup(self) -> Option<PendingLookup> {
        match self {
            Self::Lookup(pending) => Some(pending),
            _ => None,
        }
    }
}

/// Replaces `#{NAME}` placeholders, ignoring case.
fn replace_placeholder(template: &str, name: &str, value: &str) -> String {
    let needle = format!("#{{{name}}}").to_ascii_lowercase();
    let haystack = template.to_ascii_lowercase();

    let mut out = String::with_capacity(template.len() + value.len());
    let mut last = 0;
    for (start, _) in haystack.match_indices(&needle) {
        out.push_str(&template[last..start]);
        out.push_str(value);
        last = start + needle.len();
    }
    out.push_str(&template[last..]);
    out
}

/// Builds the block page URL for a flagged site.
pub fn block_page_url(template: &str, blocked_url: &str, redirect_url: &str) -> String {
    let url = replace_placeholder(template, "DOMAIN", &urlencoding::encode(blocked_url));
    replace_placeholder(&url, "REDIRECT", &urlencoding::encode(redirect_url))
}

/// Maps blank and new-tab pages to `about:blank`.
pub fn normalize_last_url(url: &str) -> String {
    let decoded = urlencoding::decode(url)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| url.to_string());

    if url.is_empty() || decoded == "chrome://newtab/" || decoded == "about:newtab" {
        BLANK_PAGE.to_string()
    } else {
        url.to_string()
    }
}

/// Per-process decision state.
pub struct DecisionEngine {
    config: EngineConfig,
    platform: Arc<dyn Platform>,
    clock: Arc<dyn Clock>,
    props: PropertyStore,
    cache: ClassificationCache,
    history: History,
    gate: SubscriptionGate,
    policy: CategoryPolicy,
    options_url: String,
    last_url: String,
    /// Link annotation state of tabs on check-internally sites.
    pages: HashMap<TabId, PageAnnotator>,
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("options_url", &self.options_url)
            .field("last_url", &self.last_url)
            .finish_non_exhaustive()
    }
}

impl DecisionEngine {
    pub fn new(config: EngineConfig, props: PropertyStore, platform: Arc<dyn Platform>) -> Self {
        Self::with_clock(config, props, platform, Arc::new(SystemClock))
    }

    /// Creates the engine.
    ///
    /// Seeds stored defaults, compiles the known-domain matcher and re-arms
    /// the trial expiry timer if a trial is running.
    pub fn with_clock(
        config: EngineConfig,
        props: PropertyStore,
        platform: Arc<dyn Platform>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        props.init();
        props.set(keys::ENABLE_WEBSITE_ANNOTATIONS, &true);

        let mut cache = ClassificationCache::new(config.known_domains.clone(), props.clone());
        cache.build_known_domains_matcher();

        let history = History::new(
            props.clone(),
            config.max_history_items_in_array,
            config.max_history_items,
        );
        let gate = SubscriptionGate::new(props.clone(), config.trial_days);
        let policy = CategoryPolicy::from_config(&config);
        let options_url = platform.extension_url(&config.options_page_path);

        if let SubscriptionStatus::Trial { expires_at } = gate.status(clock.now()) {
            platform.schedule_trial_expiry(expires_at);
        }

        info!(options_url = %options_url, "Decision engine ready");

        Self {
            config,
            platform,
            clock,
            props,
            cache,
            history,
            gate,
            policy,
            options_url,
            last_url: BLANK_PAGE.to_string(),
            pages: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }

    pub fn gate(&self) -> &SubscriptionGate {
        &self.gate
    }

    /// Safe redirect target for the next block.
    pub fn last_url(&self) -> &str {
        &self.last_url
    }

    /// Recent verified sites, newest first.
    pub fn history(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        self.history.recent(limit)
    }

    pub fn subscription_status(&self) -> SubscriptionStatus {
        self.gate.status(self.clock.now())
    }

    pub fn annotation_flags(&self) -> AnnotationFlags {
        AnnotationFlags {
            is_banner_annotation_enabled: self.props.get_bool(keys::ENABLE_BANNER_ANNOTATION),
            are_website_annotations_enabled: self.props.get_bool(keys::ENABLE_WEBSITE_ANNOTATIONS),
            are_twitter_mentions_annotations_enabled: self
                .props
                .get_bool(keys::ENABLE_TWITTER_MENTIONS_ANNOTATIONS),
        }
    }

    fn is_local(&self, url: &str) -> bool {
        is_local_tab(url, &self.config.local_tab_prefixes)
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    /// Handles a tab update.
    ///
    /// A completed load is a user page load. A load that just started is
    /// checked only when it changed the URL.
    pub fn on_tab_updated(&mut self, tab: &Tab, status: Option<TabStatus>, url_changed: bool) -> TabCheck {
        match status {
            Some(TabStatus::Complete) => self.begin_tab_check(tab, CheckContext::PAGE_COMPLETE),
            Some(TabStatus::Loading) if url_changed => {
                self.begin_tab_check(tab, CheckContext::PAGE_LOADING)
            }
            _ => TabCheck::Ignored,
        }
    }

    /// Handles install and update.
    ///
    /// Returns the lookups needed to re-check every open web tab.
    pub fn on_installed(&mut self, reason: InstallReason) -> Vec<PendingLookup> {
        if !matches!(reason, InstallReason::Install | InstallReason::Update) {
            debug!(?reason, "Ignoring install event");
            return Vec::new();
        }

        info!(?reason, "Extension installed");
        self.cache
            .apply_one_time_migration(&self.config.access_anyway_fix_list);

        match reason {
            InstallReason::Update => {
                self.props.set(keys::DISPLAY_UPDATE_BANNER, &true);
                self.props.set(keys::UPDATE_BANNER_TAB_ID, &NO_BANNER_TAB);
            }
            InstallReason::Install => {
                self.open_first_run_page();
                if let Some(expires_at) = self.gate.start_trial(self.clock.now()) {
                    self.platform.schedule_trial_expiry(expires_at);
                }
            }
            _ => {}
        }

        let tabs: Vec<Tab> = self
            .platform
            .tabs()
            .into_iter()
            .filter(|tab| !self.is_local(&tab.url))
            .collect();

        tabs.iter()
            .filter_map(|tab| self.begin_tab_check(tab, CheckContext::AUTOMATIC).into_lookup())
            .collect()
    }

    /// Handles browser startup.
    pub fn on_startup(&mut self) {
        self.cache.reset_access_anyway_list();
    }

    /// Forgets the link annotation state of a closed tab.
    pub fn on_tab_removed(&mut self, tab_id: TabId) {
        self.pages.remove(&tab_id);
    }

    /// Handles the scheduled end of the trial.
    pub fn on_trial_expired(&mut self) {
        if self.gate.expire_trial() {
            info!("Trial timer fired");
        }

        if !self.gate.can_use_extension(self.clock.now()) {
            for tab in self.platform.tabs() {
                self.platform.set_action(tab.id, ActionState::trial_expired());
            }
        }
    }

    /// Records a confirmed purchase.
    pub fn activate_subscription(&mut self, subscription_id: &str) {
        self.gate.set_subscription_id(subscription_id);
        self.gate.set_paid(true);
    }

    /// Re-runs the one-time purchase lookup.
    pub async fn refresh_purchases(&self, api: &dyn ClassificationApi) -> bool {
        self.gate.refresh_purchases(api).await
    }

    /// Marks the tab that shows the install banner.
    pub fn show_install_banner(&mut self, tab_id: TabId) {
        self.props.set(keys::DISPLAY_INSTALL_BANNER, &true);
        self.props.set(keys::INSTALL_BANNER_TAB_ID, &tab_id);
    }

    fn open_first_run_page(&self) {
        if self.props.get_bool(keys::FIRST_RUN_PAGE_DISPLAYED) {
            return;
        }

        self.platform.open_tab(&self.config.first_run_page);
        self.props.set(keys::FIRST_RUN_PAGE_DISPLAYED, &true);
    }

    // ---------------------------------------------------------------------
    // Tab checks
    // ---------------------------------------------------------------------

    /// Runs the local rules for a tab.
    pub fn begin_tab_check(&mut self, tab: &Tab, context: CheckContext) -> TabCheck {
        if !self.gate.can_use_extension(self.clock.now()) {
            debug!(tab_id = tab.id, "Subscription inactive, skipping check");
            self.platform.set_action(tab.id, ActionState::trial_expired());
            return TabCheck::Ineligible;
        }

        self.force_update_banner(tab, context);
        self.force_install_banner(tab, context);

        let parts = extract_domain_parts(&tab.url);
        if !parts.can_process() {
            if is_preferences_url(&tab.url, &self.options_url, &self.config.local_tab_prefixes) {
                self.platform
                    .set_action(tab.id, ActionState::verified(PlaceFound::Domains));
                return TabCheck::Preferences;
            }
            return TabCheck::OutOfScope;
        }

        if context.is_page_load && !context.is_page_loading {
            self.start_link_scan(tab);
        }

        if self.cache.is_access_anyway(&tab.url) {
            debug!(tab_id = tab.id, url = %tab.url, "Access-anyway override");
            self.platform.set_action(tab.id, ActionState::access_anyway());
            self.last_url = normalize_last_url(&tab.url);
            return TabCheck::AccessAnyway;
        }

        if self.cache.is_known_domain(&parts.domain) {
            debug!(tab_id = tab.id, domain = %parts.domain, "Known domain");
            return TabCheck::Known;
        }

        debug!(tab_id = tab.id, url = %tab.url, "Classification lookup needed");
        TabCheck::Lookup(PendingLookup {
            tab_id: tab.id,
            url: tab.url.clone(),
            context,
            request: CheckRequest::new(tab.url.to_lowercase()),
        })
    }

    /// Applies a lookup result to the tab.
    ///
    /// Errors and empty responses leave the tab untouched. A tab that was
    /// closed meanwhile is skipped; a tab that navigated elsewhere still
    /// receives the result.
    pub fn complete_tab_check(
        &mut self,
        pending: PendingLookup,
        result: api::Result<Option<ClassificationResponse>>,
    ) -> Option<Verdict> {
        let response = match result {
            Ok(Some(response)) => response,
            Ok(None) => {
                debug!(tab_id = pending.tab_id, "No classification returned");
                return None;
            }
            Err(e) => {
                debug!(tab_id = pending.tab_id, error = %e, "Classification failed");
                return None;
            }
        };

        let Some(tab) = self.platform.tab(pending.tab_id) else {
            debug!(tab_id = pending.tab_id, "Tab closed before classification arrived");
            return None;
        };

        if tab.url != pending.url {
            debug!(
                tab_id = tab.id,
                checked = %pending.url,
                current = %tab.url,
                "Applying classification to a tab that navigated away"
            );
        }

        let verdict = Verdict::from_response(Some(&response), &self.config.social_networks_marker);
        let is_page_load = pending.context.is_page_load;
        let is_page_loading = tab.is_loading();

        debug!(
            tab_id = tab.id,
            url = %pending.url,
            kind = ?verdict.kind,
            "Classification received"
        );

        let report = SiteReport {
            url: pending.url.clone(),
            verdict: verdict.clone(),
            force_flag_remove: false,
            flags: self.annotation_flags(),
        };

        if !self.is_local(&pending.url) {
            let message = if self.policy.should_display_website_banner(verdict.kind()) {
                TabMessage::FlagSite(SiteReport {
                    force_flag_remove: true,
                    ..report.clone()
                })
            } else {
                TabMessage::RemoveFlag(report.clone())
            };
            self.platform.send_to_tab(tab.id, message);
        }

        self.apply_verdict(&verdict, &tab, &pending.url, is_page_load, is_page_loading);

        if is_page_load && !is_page_loading && !self.is_local(&pending.url) {
            self.platform
                .send_to_tab(tab.id, TabMessage::AnnotatePage(report));
        }

        Some(verdict)
    }

    /// Runs both phases of a tab check.
    pub async fn check_tab(
        &mut self,
        tab: &Tab,
        context: CheckContext,
        api: &dyn ClassificationApi,
    ) -> Option<Verdict> {
        let pending = self.begin_tab_check(tab, context).into_lookup()?;
        let result = api.check_url(pending.request.clone()).await;
        self.complete_tab_check(pending, result)
    }

    fn apply_verdict(
        &mut self,
        verdict: &Verdict,
        tab: &Tab,
        url: &str,
        is_page_load: bool,
        is_page_loading: bool,
    ) {
        match self.policy.classify(verdict.kind()) {
            CategoryClass::Flagged if !is_page_loading => {
                let target = block_page_url(&self.config.block_page_template, url, &self.last_url);
                info!(tab_id = tab.id, url = %url, "Blocking flagged site");
                self.platform.redirect(tab.id, &target);
                return;
            }
            CategoryClass::Flagged => {
                debug!(tab_id = tab.id, "Flagged site still loading, deferring block");
                return;
            }
            CategoryClass::CryptoGood => {
                let place_found = verdict.place_found.unwrap_or(PlaceFound::Domains);
                self.platform
                    .set_action(tab.id, ActionState::verified(place_found));

                if is_page_load {
                    let favicon = tab
                        .fav_icon_url
                        .clone()
                        .filter(|f| !f.is_empty())
                        .unwrap_or_else(|| self.platform.extension_url(&self.config.default_favicon_path));
                    self.history.upsert(HistoryEntry::new(url, favicon));
                }
            }
            CategoryClass::Neutral => {
                self.platform.set_action(tab.id, ActionState::neutral());
            }
        }

        if !is_page_loading {
            self.last_url = normalize_last_url(url);
        }
    }

    // ---------------------------------------------------------------------
    // Banners
    // ---------------------------------------------------------------------

    fn force_update_banner(&self, tab: &Tab, context: CheckContext) {
        if !self.props.get_bool(keys::DISPLAY_UPDATE_BANNER) || !context.is_page_load {
            return;
        }

        let banner_tab = self
            .props
            .get_i64(keys::UPDATE_BANNER_TAB_ID)
            .unwrap_or(NO_BANNER_TAB);

        if (banner_tab == NO_BANNER_TAB || banner_tab == tab.id) && !self.is_local(&tab.url) {
            self.platform.send_to_tab(
                tab.id,
                TabMessage::ForceUpdateBanner {
                    extension_version: CLIENT_VERSION.to_string(),
                    tab_id: tab.id,
                },
            );
        }
    }

    fn force_install_banner(&self, tab: &Tab, context: CheckContext) {
        if self.props.get_bool(keys::DISPLAY_INSTALL_BANNER)
            && self.props.get_i64(keys::INSTALL_BANNER_TAB_ID) == Some(tab.id)
            && context.is_page_load
            && !self.is_local(&tab.url)
        {
            self.platform
                .send_to_tab(tab.id, TabMessage::ForceInstallBanner);
        }
    }

    // ---------------------------------------------------------------------
    // Messages
    // ---------------------------------------------------------------------

    /// Handles a message from a content script.
    ///
    /// Returns the link lookups for `checkURL` and `scanLinks`; every other
    /// operation completes here.
    pub fn handle_message(&mut self, sender: Option<TabId>, message: ExtensionMessage) -> Vec<LinkLookup> {
        match message {
            ExtensionMessage::CheckUrl { url, node_id } => {
                let Some(tab_id) = self.link_sender(sender) else {
                    return Vec::new();
                };
                vec![LinkLookup {
                    tab_id,
                    request: CheckRequest::for_node(url, node_id),
                }]
            }
            ExtensionMessage::ScanLinks { links } => {
                let Some(tab_id) = self.link_sender(sender) else {
                    return Vec::new();
                };
                let Some(annotator) = self.pages.get_mut(&tab_id) else {
                    debug!(tab_id, "Links reported for a page that is not scanned");
                    return Vec::new();
                };

                annotator
                    .scan(&links)
                    .into_iter()
                    .filter_map(|request| match request {
                        ExtensionMessage::CheckUrl { url, node_id } => Some(LinkLookup {
                            tab_id,
                            request: CheckRequest::for_node(url, node_id),
                        }),
                        _ => None,
                    })
                    .collect()
            }
            ExtensionMessage::AddAccessAnywayUrl { url } => {
                self.cache.add_access_anyway(&url);
                Vec::new()
            }
            ExtensionMessage::CloseAnnotationBanner => {
                self.close_annotation_banner();
                Vec::new()
            }
            ExtensionMessage::UpdateBannerClosed => {
                self.props.set(keys::DISPLAY_UPDATE_BANNER, &false);
                self.props.set(keys::UPDATE_BANNER_TAB_ID, &NO_BANNER_TAB);
                Vec::new()
            }
            ExtensionMessage::InstallBannerClosed => {
                self.props.set(keys::DISPLAY_INSTALL_BANNER, &false);
                self.props.set(keys::INSTALL_BANNER_TAB_ID, &NO_BANNER_TAB);
                Vec::new()
            }
            ExtensionMessage::UpdateBannerShown { tab_id } => {
                self.props.set(keys::UPDATE_BANNER_TAB_ID, &tab_id);
                Vec::new()
            }
            ExtensionMessage::Unsupported => {
                debug!("Ignoring unsupported message");
                Vec::new()
            }
        }
    }

    /// Tab a link check may run for.
    fn link_sender(&self, sender: Option<TabId>) -> Option<TabId> {
        let tab_id = sender?;
        if !self.gate.can_use_extension(self.clock.now()) {
            debug!(tab_id, "Subscription inactive, skipping link check");
            return None;
        }
        Some(tab_id)
    }

    /// Asks a check-internally page to report its links.
    fn start_link_scan(&mut self, tab: &Tab) {
        let annotator = PageAnnotator::for_host(&tab.url, &self.config);
        match annotator.selector() {
            Some(selector) => {
                self.platform.send_to_tab(
                    tab.id,
                    TabMessage::ScanLinks {
                        selector: selector.to_string(),
                    },
                );
                self.pages.insert(tab.id, annotator);
            }
            None => {
                self.pages.remove(&tab.id);
            }
        }
    }

    /// Sends a link result back to the tab that asked. Failed lookups send nothing.
    ///
    /// Links from a page scan come back as `annotateLink`; results without a
    /// type are dropped. Other links get the raw `checkURL` report.
    pub fn complete_link_check(
        &mut self,
        lookup: LinkLookup,
        result: api::Result<Option<ClassificationResponse>>,
    ) {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                debug!(tab_id = lookup.tab_id, error = %e, "Link classification failed");
                return;
            }
        };

        let verdict = Verdict::from_response(response.as_ref(), &self.config.social_networks_marker);
        let report = LinkReport {
            node_id: lookup.request.node_id.unwrap_or_default(),
            url: lookup.request.url,
            verdict,
            flags: self.annotation_flags(),
        };

        if let Some(annotator) = self.pages.get_mut(&lookup.tab_id) {
            if annotator.knows(&report.node_id) {
                if let Some(annotation) = annotator.apply_result(&report) {
                    self.platform
                        .send_to_tab(lookup.tab_id, TabMessage::AnnotateLink(annotation));
                }
                return;
            }
        }

        self.platform
            .send_to_tab(lookup.tab_id, TabMessage::CheckUrl(report));
    }

    /// Runs a link check end to end.
    pub async fn check_link(
        &mut self,
        sender: TabId,
        url: &str,
        node_id: &str,
        api: &dyn ClassificationApi,
    ) {
        let message = ExtensionMessage::CheckUrl {
            url: url.to_string(),
            node_id: node_id.to_string(),
        };
        for lookup in self.handle_message(Some(sender), message) {
            let result = api.check_url(lookup.request.clone()).await;
            self.complete_link_check(lookup, result);
        }
    }

    fn close_annotation_banner(&mut self) {
        self.props.set(keys::ENABLE_BANNER_ANNOTATION, &false);
        let flags = self.annotation_flags();

        for tab in self.platform.tabs() {
            if tab.url == self.options_url {
                self.platform.reload_tab(tab.id);
            } else if !self.is_local(&tab.url) {
                self.platform
                    .send_to_tab(tab.id, TabMessage::EnableAnnotations(flags));
            }
        }
    }
}
