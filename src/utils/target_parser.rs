//! Target classification
//!
//! Turns the single token a user sends into a [`Target`]:
//! - literal IPv4 / IPv6 addresses
//! - CIDR blocks, reduced to their base address
//! - anything else is treated as a domain name
//!
//! Tokens delivered by chat front ends may arrive wrapped in link markup
//! (`<http://example.com|example.com>`); the wrapper is stripped first.

use ipnetwork::IpNetwork;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

static LINK_MARKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<([^|<>]*)(?:\|([^<>]*))?>$").expect("link markup pattern"));

/// A classified reconnaissance target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Target {
    Domain(String),
    Address(IpAddr),
    /// Base address of a CIDR block. The prefix is not retained.
    Network(IpAddr),
}

impl Target {
    /// The address to probe directly, if the target is not a name
    pub fn address(&self) -> Option<IpAddr> {
        match self {
            Target::Domain(_) => None,
            Target::Address(ip) | Target::Network(ip) => Some(*ip),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Target::Domain(_) => "domain",
            Target::Address(_) => "address",
            Target::Network(_) => "network",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Domain(name) => write!(f, "{}", name),
            Target::Address(ip) | Target::Network(ip) => write!(f, "{}", ip),
        }
    }
}

/// Classify a raw token.
///
/// Address literals win over CIDR parsing, so `10.0.0.1` is an `Address`
/// even though it would also parse as `10.0.0.1/32`.
pub fn classify(token: &str) -> Target {
    let literal = strip_link_markup(token.trim());

    if let Ok(ip) = IpAddr::from_str(literal) {
        return Target::Address(ip);
    }

    if literal.contains('/') {
        if let Ok(network) = IpNetwork::from_str(literal) {
            return Target::Network(network.network());
        }
    }

    Target::Domain(literal.to_string())
}

/// Recover the literal from chat link markup.
///
/// `<url|label>` yields the label, `<url>` yields the host part of the URL.
/// Tokens without markup are returned unchanged.
pub fn strip_link_markup(token: &str) -> &str {
    let Some(caps) = LINK_MARKUP.captures(token) else {
        return token;
    };

    if let Some(label) = caps.get(2).filter(|m| !m.as_str().is_empty()) {
        return label.as_str();
    }

    match caps.get(1) {
        Some(url) => url_host(url.as_str()),
        None => token,
    }
}

fn url_host(url: &str) -> &str {
    let without_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_ipv4_address() {
        assert_eq!(
            classify("203.0.113.5"),
            Target::Address(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5)))
        );
    }

    #[test]
    fn test_ipv6_address() {
        let expected: Ipv6Addr = "2001:db8::1".parse().unwrap();
        assert_eq!(classify("2001:db8::1"), Target::Address(IpAddr::V6(expected)));
    }

    #[test]
    fn test_cidr_reduces_to_base_address() {
        assert_eq!(
            classify("203.0.113.0/24"),
            Target::Network(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 0)))
        );
        // Host bits set in the literal are masked away
        assert_eq!(
            classify("203.0.113.77/24"),
            Target::Network(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 0)))
        );
    }

    #[test]
    fn test_ipv6_cidr() {
        let base: Ipv6Addr = "2001:db8::".parse().unwrap();
        assert_eq!(classify("2001:db8::42/64"), Target::Network(IpAddr::V6(base)));
    }

    #[test]
    fn test_bare_address_beats_cidr() {
        assert!(matches!(classify("10.0.0.1"), Target::Address(_)));
        assert!(matches!(classify("10.0.0.1/32"), Target::Network(_)));
    }

    #[test]
    fn test_domain_fallback() {
        assert_eq!(classify("example.com"), Target::Domain("example.com".to_string()));
        assert_eq!(classify("10.0.0.0/33"), Target::Domain("10.0.0.0/33".to_string()));
        assert_eq!(classify("localhost"), Target::Domain("localhost".to_string()));
    }

    #[test]
    fn test_link_markup_label() {
        assert_eq!(
            classify("<http://example.com|example.com>"),
            Target::Domain("example.com".to_string())
        );
        assert_eq!(
            classify("<http://198.51.100.7|198.51.100.7>"),
            Target::Address("198.51.100.7".parse().unwrap())
        );
    }

    #[test]
    fn test_link_markup_without_label() {
        assert_eq!(strip_link_markup("<https://example.org/path?q=1>"), "example.org");
        assert_eq!(
            classify("<http://example.org>"),
            Target::Domain("example.org".to_string())
        );
    }

    #[test]
    fn test_unwrapped_token_untouched() {
        assert_eq!(strip_link_markup("example.com"), "example.com");
        assert_eq!(strip_link_markup("<unterminated"), "<unterminated");
    }

    #[test]
    fn test_target_address_accessor() {
        assert_eq!(classify("example.com").address(), None);
        assert_eq!(
            classify("192.0.2.0/24").address(),
            Some("192.0.2.0".parse().unwrap())
        );
    }
}
