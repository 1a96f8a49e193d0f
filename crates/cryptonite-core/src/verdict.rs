//! Verdicts and category policy.

use serde::{Deserialize, Serialize};

use crate::api::{CategoryHit, ClassificationResponse};
use crate::config::EngineConfig;

/// Which part of the response produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceFound {
    Urls,
    Folders,
    Domains,
}

impl PlaceFound {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urls => "urls",
            Self::Folders => "folders",
            Self::Domains => "domains",
        }
    }
}

impl std::fmt::Display for PlaceFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved classification of one URL.
///
/// `place_found` is set exactly when `kind` is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub place_found: Option<PlaceFound>,
}

impl Verdict {
    /// No classification.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(kind: impl Into<String>, place_found: PlaceFound) -> Self {
        Self {
            kind: Some(kind.into()),
            place_found: Some(place_found),
        }
    }

    /// Picks the verdict from a response.
    ///
    /// The first non-empty list among URLs, Folders and Domains wins and its
    /// first hit is used. A Domains hit equal to `social_marker` is ignored.
    pub fn from_response(response: Option<&ClassificationResponse>, social_marker: &str) -> Self {
        let Some(response) = response else {
            return Self::none();
        };

        fn first(hits: &Option<Vec<CategoryHit>>) -> Option<&CategoryHit> {
            hits.as_ref().and_then(|h| h.first())
        }

        if let Some(hit) = first(&response.urls) {
            return Self::new(hit.kind.clone(), PlaceFound::Urls);
        }
        if let Some(hit) = first(&response.folders) {
            return Self::new(hit.kind.clone(), PlaceFound::Folders);
        }
        match first(&response.domains) {
            Some(hit) if hit.kind != social_marker => Self::new(hit.kind.clone(), PlaceFound::Domains),
            _ => Self::none(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind.is_none()
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }
}

/// How a classification type is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryClass {
    /// Redirect to the block page.
    Flagged,
    /// Verified icon and history entry.
    CryptoGood,
    /// Default icon.
    Neutral,
}

/// Flagged and crypto-good category sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPolicy {
    flagged: Vec<String>,
    crypto_good: Vec<String>,
}

impl CategoryPolicy {
    pub fn new(flagged: Vec<String>, crypto_good: Vec<String>) -> Self {
        Self {
            flagged,
            crypto_good,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.flagged_categories.clone(),
            config.crypto_good_categories.clone(),
        )
    }

    /// Classifies a type. Flagged takes precedence when a type is in both sets.
    pub fn classify(&self, kind: Option<&str>) -> CategoryClass {
        match kind {
            Some(k) if self.flagged.iter().any(|f| f == k) => CategoryClass::Flagged,
            Some(k) if self.crypto_good.iter().any(|g| g == k) => CategoryClass::CryptoGood,
            _ => CategoryClass::Neutral,
        }
    }

    pub fn is_flagged(&self, kind: Option<&str>) -> bool {
        self.classify(kind) == CategoryClass::Flagged
    }

    /// The verified banner is shown only for crypto-good sites.
    pub fn should_display_website_banner(&self, kind: Option<&str>) -> bool {
        matches!(kind, Some(k) if self.crypto_good.iter().any(|g| g == k))
    }
}

impl Default for CategoryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOCIAL: &str = "social-networks";

    // ==================== Verdict Tests ====================

    #[test]
    fn no_response_no_verdict() {
        assert!(Verdict::from_response(None, SOCIAL).is_none());
        let empty = ClassificationResponse::default();
        assert!(Verdict::from_response(Some(&empty), SOCIAL).is_none());
    }

    #[test]
    fn urls_take_precedence() {
        let response = ClassificationResponse::default()
            .with_urls(&["crypto-phish"])
            .with_folders(&["cryptocurrency"])
            .with_domains(&["cryptocurrency"]);

        let verdict = Verdict::from_response(Some(&response), SOCIAL);
        assert_eq!(verdict, Verdict::new("crypto-phish", PlaceFound::Urls));
    }

    #[test]
    fn folders_beat_domains() {
        let response = ClassificationResponse::default()
            .with_urls(&[])
            .with_folders(&["cryptocurrency"])
            .with_domains(&["malware-phishing"]);

        let verdict = Verdict::from_response(Some(&response), SOCIAL);
        assert_eq!(verdict.kind(), Some("cryptocurrency"));
        assert_eq!(verdict.place_found, Some(PlaceFound::Folders));
    }

    #[test]
    fn first_domain_hit_is_used() {
        let response =
            ClassificationResponse::default().with_domains(&["malware-phishing", "cryptocurrency"]);
        let verdict = Verdict::from_response(Some(&response), SOCIAL);
        assert_eq!(verdict, Verdict::new("malware-phishing", PlaceFound::Domains));
    }

    #[test]
    fn social_network_domain_hit_is_ignored() {
        let response = ClassificationResponse::default().with_domains(&[SOCIAL, "cryptocurrency"]);
        assert!(Verdict::from_response(Some(&response), SOCIAL).is_none());

        // The marker only matters at domain level.
        let response = ClassificationResponse::default().with_folders(&[SOCIAL]);
        assert_eq!(
            Verdict::from_response(Some(&response), SOCIAL),
            Verdict::new(SOCIAL, PlaceFound::Folders)
        );
    }

    #[test]
    fn verdict_serializes_like_the_wire_format() {
        let json = serde_json::to_value(Verdict::new("cryptocurrency", PlaceFound::Domains)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "cryptocurrency", "placeFound": "domains"})
        );

        let json = serde_json::to_value(Verdict::none()).unwrap();
        assert_eq!(json, serde_json::json!({"type": null, "placeFound": null}));
    }

    // ==================== CategoryPolicy Tests ====================

    #[test]
    fn classify_categories() {
        let policy = CategoryPolicy::default();
        assert_eq!(policy.classify(Some("malware-phishing")), CategoryClass::Flagged);
        assert_eq!(policy.classify(Some("crypto-phish")), CategoryClass::Flagged);
        assert_eq!(policy.classify(Some("cryptocurrency")), CategoryClass::CryptoGood);
        assert_eq!(policy.classify(Some("fake-news")), CategoryClass::Neutral);
        assert_eq!(policy.classify(None), CategoryClass::Neutral);
    }

    #[test]
    fn flagged_wins_over_crypto_good() {
        let policy = CategoryPolicy::new(vec!["x".to_string()], vec!["x".to_string()]);
        assert_eq!(policy.classify(Some("x")), CategoryClass::Flagged);
    }

    #[test]
    fn website_banner_only_for_crypto_good() {
        let policy = CategoryPolicy::default();
        assert!(policy.should_display_website_banner(Some("cryptocurrency")));
        assert!(!policy.should_display_website_banner(Some("crypto-phish")));
        assert!(!policy.should_display_website_banner(None));
    }
}
