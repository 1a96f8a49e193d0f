//! Engine configuration.
//!
//! Every list and constant the decision engine consults lives here. The
//! `Default` impl carries the bundled values; a JSON file can override any
//! subset of fields.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding [`ApiConfig::api_key`].
pub const API_KEY_ENV: &str = "CRYPTONITE_API_KEY";

/// Environment variable overriding [`ApiConfig::security_token`].
pub const SECURITY_TOKEN_ENV: &str = "CRYPTONITE_SECURITY_TOKEN";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the config file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid JSON for [`EngineConfig`].
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which classification endpoint the subscription grants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    Standard,
    #[default]
    Pro,
}

/// Remote service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub subscription_type: SubscriptionType,
    /// Classification endpoint for standard subscriptions.
    pub standard_endpoint: String,
    /// Classification endpoint for pro subscriptions.
    pub pro_endpoint: String,
    /// Purchase code lookup endpoint.
    pub purchase_lookup_endpoint: String,
    pub api_key: String,
    pub security_token: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Client platform reported in the `x-cryptonite-browser` header.
    pub browser_name: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            subscription_type: SubscriptionType::Pro,
            standard_endpoint: String::new(),
            pro_endpoint: String::new(),
            purchase_lookup_endpoint: String::new(),
            api_key: String::new(),
            security_token: String::new(),
            timeout_secs: 60,
            browser_name: "chrome".to_string(),
        }
    }
}

impl ApiConfig {
    /// Returns the classification endpoint for the configured subscription type.
    pub fn classification_endpoint(&self) -> &str {
        match self.subscription_type {
            SubscriptionType::Standard => &self.standard_endpoint,
            SubscriptionType::Pro => &self.pro_endpoint,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Domains trusted without a remote lookup. Entries are regex fragments
    /// whose dots are escaped when the matcher is compiled.
    pub known_domains: Vec<String>,
    /// Access-anyway entries removed by the one-time migration.
    pub access_anyway_fix_list: Vec<String>,
    /// Types that trigger a redirect to the block page.
    pub flagged_categories: Vec<String>,
    /// Types that earn the verified icon.
    pub crypto_good_categories: Vec<String>,
    /// Domain-level type that never counts as a verdict.
    pub social_networks_marker: String,
    /// Site id to CSS selector of links classified one by one.
    pub check_internally_domains: BTreeMap<String, String>,
    /// URL prefixes of pages that cannot receive tab messages.
    pub local_tab_prefixes: Vec<String>,
    /// Extension-relative path of the options page.
    pub options_page_path: String,
    /// Block page URL with `#{DOMAIN}` and `#{REDIRECT}` placeholders.
    pub block_page_template: String,
    pub first_run_page: String,
    /// History entries shown to the user.
    pub max_history_items: usize,
    /// History entries kept in storage.
    pub max_history_items_in_array: usize,
    /// Extension-relative favicon used when a tab has none.
    pub default_favicon_path: String,
    pub trial_days: i64,
    pub api: ApiConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            known_domains: to_strings(KNOWN_DOMAINS),
            access_anyway_fix_list: to_strings(ACCESS_ANYWAY_FIX_LIST),
            flagged_categories: to_strings(&["malware-phishing", "crypto-phish"]),
            crypto_good_categories: to_strings(&["cryptocurrency"]),
            social_networks_marker: "social-networks".to_string(),
            check_internally_domains: BTreeMap::from([(
                "twitter".to_string(),
                ".js-user-profile-link, .ProfileCard-screennameLink, .twitter-atreply, .js-profile-popup-actionable"
                    .to_string(),
            )]),
            local_tab_prefixes: to_strings(&["about:", "chrome-extension:", "moz-extension:"]),
            options_page_path: "html/options/options.html".to_string(),
            block_page_template: "http://block.metacert.com/?domain=#{DOMAIN}&redirect=#{REDIRECT}"
                .to_string(),
            first_run_page: "https://metacertprotocol.com/cryptonite-beta?via=cryptonite"
                .to_string(),
            max_history_items: 10,
            max_history_items_in_array: 20,
            default_favicon_path: "images/green/cryptonite-icon-48x48.png".to_string(),
            trial_days: DEFAULT_TRIAL_DAYS,
            api: ApiConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads a JSON config file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Applies credential overrides from the environment.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            self.api.api_key = key;
        }
        if let Ok(token) = std::env::var(SECURITY_TOKEN_ENV) {
            self.api.security_token = token;
        }
        self
    }
}

/// Default trial length.
pub const DEFAULT_TRIAL_DAYS: i64 = 7;

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Bundled list of domains that skip the remote lookup.
pub const KNOWN_DOMAINS: &[&str] = &[
    "360.cn",
    "abcnews.go.com",
    "accuweather.com",
    "adobe.com",
    "alexa.com",
    "alibaba.com",
    "aliexpress.com",
    "amazonaws.com",
    "aol.com",
    "apple.com",
    "archive.org",
    "ask.com",
    "avito.ru",
    "baidu.com",
    "bbc.co.uk",
    "bbc.com",
    "bbm.com",
    "bet365.com",
    "bing.com",
    "block.metacert.com",
    "bongacams.com",
    "booking.com",
    "box.com",
    "cnn.com",
    "cnzz.com",
    "coccoc.com",
    "dailymail.co.uk",
    "detail.tmall.com",
    "diply.com",
    "disk.yandex.com",
    "duckduckgo.com",
    "fc2.com",
    "flipdrive.com",
    "foxnews.com",
    "free-hidrive.com",
    "globo.com",
    "gmw.cn",
    "go2cloud.org",
    "googleusercontent",
    "hao123.com",
    "hidrive.com",
    "hubic.com",
    "huffingtonpost.com",
    "icloud.com",
    "idrive.com",
    "imdb.com",
    "imgur.com",
    "imo.im",
    "irc.com",
    "jd.com",
    "jumpshare.com",
    "kakao.com",
    "latimes.com",
    "line.me",
    "live.com",
    "livejasmin.com",
    "localhost",
    "mail.ru",
    "mediafire.com",
    "mega.nz",
    "messenger.com",
    "metacert-block.com",
    "microsoft.com",
    "microsoftonline.com",
    "msn.com",
    "mydrive.ch",
    "naver.com",
    "nextcloud.com",
    "nicovideo.jp",
    "nytimes.com",
    "office.com",
    "ok.ru",
    "onclckds.com",
    "paypal.com",
    "pcloud.com",
    "pinterest.com",
    "pixnet.net",
    "popads.net",
    "pornhub.com",
    "qq.com",
    "quora.com",
    "rakuten.co.jp",
    "redtube.com",
    "reuters.com",
    "reuters.tv",
    "samsung.com",
    "sina.com.cn",
    "skype.com",
    "slack.com",
    "snapchat.com",
    "sohu.com",
    "soso.com",
    "soundcloud.com",
    "spideroak.com",
    "stackoverflow.com",
    "sync.com",
    "taobao.com",
    "telegram.org",
    "theguardian.com",
    "tianya.cn",
    "tmall.com",
    "twitch.tv",
    "txxx.com",
    "uol.com.br",
    "usatoday.com",
    "vk.com",
    "walmart.com",
    "washingtonpost.com",
    "wechat.com",
    "weibo.com",
    "wikipedia.org",
    "wolframalpha",
    "wsj.com",
    "xhamster.com",
    "xnxx.com",
    "xvideos.com",
    "yandex.ru",
];

/// Legacy access-anyway entries that were added by a misclassification.
pub const ACCESS_ANYWAY_FIX_LIST: &[&str] = &[
    "https://twitter.com",
    "https://eosdac.io/airdrop/",
    "https://www.myetherwallet.com/",
    "https://myetherwallet.com/",
];
