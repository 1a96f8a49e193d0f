//! Known-domain matcher.
//!
//! A single anchored alternation compiled from the configured domain list.
//! A listed domain matches itself and anything under a dot-separated suffix
//! (`wikipedia.org`, `wikipedia.org.mirror`), but never a longer label:
//! `google.com` does not match `google111.com`.

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

/// Compiled form of the known-domain list.
#[derive(Debug, Clone)]
pub enum KnownDomainsMatcher {
    /// A compiled alternation of every listed domain.
    Compiled(Regex),
    /// Matches nothing. Used for an empty list or a pattern that fails to compile.
    Never,
}

impl KnownDomainsMatcher {
    /// Compiles the matcher from a domain list.
    ///
    /// Only dots are escaped; other regex metacharacters in an entry pass
    /// through. A list that does not compile yields [`KnownDomainsMatcher::Never`].
    pub fn build<S: AsRef<str>>(domains: &[S]) -> Self {
        let alternatives: Vec<String> = domains
            .iter()
            .map(|d| d.as_ref().trim())
            .filter(|d| !d.is_empty())
            .map(|d| d.to_lowercase().replace('.', r"\."))
            .collect();

        if alternatives.is_empty() {
            debug!("Known domain list is empty, matcher rejects everything");
            return Self::Never;
        }

        let pattern = Self::pattern_for(&alternatives);
        match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(regex) => {
                debug!(entries = alternatives.len(), "Compiled known domain matcher");
                Self::Compiled(regex)
            }
            Err(e) => {
                warn!(error = %e, "Known domain list did not compile, every domain needs a lookup");
                Self::Never
            }
        }
    }

    /// Builds the anchored pattern.
    ///
    /// The trailing group requires the character after the listed domain to
    /// be something other than a label character, or the end of input.
    fn pattern_for(alternatives: &[String]) -> String {
        format!("^({})([^a-zA-Z0-9-]|$)", alternatives.join("|"))
    }

    /// Tests a bare domain against the list.
    pub fn is_match(&self, domain: &str) -> bool {
        match self {
            Self::Compiled(regex) => regex.is_match(domain),
            Self::Never => false,
        }
    }

    /// Returns true if this matcher rejects all input.
    pub fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KNOWN_DOMAINS;

    #[test]
    fn bundled_domains_match_themselves() {
        let matcher = KnownDomainsMatcher::build(KNOWN_DOMAINS);
        assert!(!matcher.is_never());

        for domain in KNOWN_DOMAINS {
            assert!(matcher.is_match(domain), "{domain} should be known");
        }
    }

    #[test]
    fn suffix_does_not_match() {
        let matcher = KnownDomainsMatcher::build(KNOWN_DOMAINS);

        for domain in KNOWN_DOMAINS {
            let spoof = format!("{domain}evil.com");
            assert!(!matcher.is_match(&spoof), "{spoof} should not be known");
        }
    }

    #[test]
    fn label_boundary() {
        let matcher = KnownDomainsMatcher::build(&["google.com"]);
        assert!(matcher.is_match("google.com"));
        assert!(matcher.is_match("google.com.au"));
        assert!(matcher.is_match("GOOGLE.COM"));
        assert!(!matcher.is_match("google111.com"));
        assert!(!matcher.is_match("google.com-evil.net"));
        assert!(!matcher.is_match("mail.google.com"));
    }

    #[test]
    fn dots_are_literal() {
        let matcher = KnownDomainsMatcher::build(&["bbc.com"]);
        assert!(!matcher.is_match("bbcxcom"));
    }

    #[test]
    fn overlapping_entries() {
        let matcher = KnownDomainsMatcher::build(&["bbc.co", "bbc.com"]);
        assert!(matcher.is_match("bbc.com"));
        assert!(matcher.is_match("bbc.co"));
        assert!(!matcher.is_match("bbc.cox"));
    }

    #[test]
    fn empty_list_rejects_everything() {
        let empty: [&str; 0] = [];
        let matcher = KnownDomainsMatcher::build(&empty);
        assert!(matcher.is_never());
        assert!(!matcher.is_match("example.com"));
        assert!(!matcher.is_match("a"));

        let blanks = KnownDomainsMatcher::build(&["", "  "]);
        assert!(blanks.is_never());
        assert!(!blanks.is_match("example.com"));
    }

    #[test]
    fn malformed_list_fails_closed() {
        let matcher = KnownDomainsMatcher::build(&["example.com", "bad(domain"]);
        assert!(matcher.is_never());
        assert!(!matcher.is_match("example.com"));
    }
}
