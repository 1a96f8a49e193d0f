//! URL filtering rules.
//!
//! Decides whether a URL is worth classifying at all: only plain web
//! traffic on default ports to named hosts ever reaches the caches or the
//! remote service.

use serde::{Deserialize, Serialize};

/// Protocol, host and port recovered from a raw URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainParts {
    pub protocol: Option<String>,
    pub domain: String,
    pub port: Option<String>,
}

impl DomainParts {
    /// Parses a raw URL. Never fails; malformed input yields partial parts.
    pub fn parse(url: &str) -> Self {
        extract_domain_parts(url)
    }

    /// Returns true if this URL may be looked up.
    pub fn can_process(&self) -> bool {
        can_process_domain(self.protocol.as_deref(), &self.domain, self.port.as_deref())
    }
}

/// Splits a URL into protocol, domain and port.
///
/// The URL is lowercased; a leading `www.` is dropped and anything from the
/// first `?` or `#` in the host segment is discarded.
pub fn extract_domain_parts(url: &str) -> DomainParts {
    let url = url.to_lowercase();

    let (protocol, host) = if url.contains("://") {
        let mut segments = url.split('/');
        let protocol = segments.next().unwrap_or_default().replacen(':', "", 1);
        // segments: [scheme:, "", host, ...]
        let host = segments.nth(1).unwrap_or_default().to_string();
        (Some(protocol), host)
    } else {
        let host = url.split('/').next().unwrap_or_default().to_string();
        (None, host)
    };

    let host = host
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_string();

    let mut host_parts = host.split(':');
    let domain = host_parts.next().unwrap_or_default();
    let port = host_parts.next().map(str::to_string);

    let domain = domain.strip_prefix("www.").unwrap_or(domain).to_string();

    DomainParts {
        protocol,
        domain,
        port,
    }
}

/// Only http and https are processed. A missing protocol is accepted.
pub fn is_valid_protocol(protocol: Option<&str>) -> bool {
    match protocol {
        None | Some("") => true,
        Some(p) => p == "http" || p == "https",
    }
}

/// Only the default web ports are processed. A missing port is accepted.
pub fn is_valid_port(port: Option<&str>) -> bool {
    match port {
        None | Some("") => true,
        Some(p) => p == "80" || p == "8080",
    }
}

/// Dotted-quad check. Octet ranges are not validated.
pub fn is_ip_address(domain: &str) -> bool {
    let groups: Vec<&str> = domain.split('.').collect();
    groups.len() == 4
        && groups
            .iter()
            .all(|g| !g.is_empty() && g.bytes().all(|b| b.is_ascii_digit()))
}

pub fn is_localhost_domain(domain: &str) -> bool {
    domain.contains("localhost")
}

/// The single gate in front of every cache lookup and remote call.
pub fn can_process_domain(protocol: Option<&str>, domain: &str, port: Option<&str>) -> bool {
    is_valid_protocol(protocol)
        && is_valid_port(port)
        && !is_ip_address(domain)
        && !is_localhost_domain(domain)
}

/// Returns true for browser-internal and extension pages.
///
/// Such pages cannot receive tab messages.
pub fn is_local_tab(url: &str, local_prefixes: &[String]) -> bool {
    !url.is_empty() && local_prefixes.iter().any(|p| url.starts_with(p.as_str()))
}

/// Returns true if the URL is the extension's own options page.
pub fn is_preferences_url(url: &str, options_url: &str, local_prefixes: &[String]) -> bool {
    if url.is_empty() {
        return false;
    }

    let url = match url.find('#') {
        Some(pos) if pos > 0 => &url[..pos],
        _ => url,
    };

    is_local_tab(url, local_prefixes) && url.contains(options_url)
}
