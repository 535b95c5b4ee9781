//! Target-URL validation (SSRF guard).
//!
//! The `url=` parameter is fully attacker-controlled, so before any outbound
//! fetch the target must be an http(s) URL whose host is not a private or
//! reserved address. Hostnames are accepted without DNS resolution; DNS
//! rebinding is a known limitation here.

use crate::error::ProxyError;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Validate a user-supplied target URL before fetching it.
///
/// # Errors
/// Returns [`ProxyError::InvalidTarget`] for relative or unparseable URLs,
/// non-http(s) schemes, and IP literals in private/reserved ranges.
pub fn validate_target_url(url: &str) -> Result<(), ProxyError> {
    let parsed =
        Url::parse(url).map_err(|_| ProxyError::InvalidTarget(format!("not a URL: {url}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ProxyError::InvalidTarget(format!(
                "scheme '{scheme}' not allowed, only http/https"
            )));
        }
    }

    match parsed.host() {
        Some(Host::Ipv4(ip)) if is_blocked_ipv4(ip) => Err(ProxyError::InvalidTarget(format!(
            "private or reserved IPv4 address: {ip}"
        ))),
        Some(Host::Ipv6(ip)) if is_blocked_ipv6(ip) => Err(ProxyError::InvalidTarget(format!(
            "private or reserved IPv6 address: {ip}"
        ))),
        Some(_) => Ok(()),
        None => Err(ProxyError::InvalidTarget(format!("no host in URL: {url}"))),
    }
}

/// RFC 1918 ranges, loopback, link-local (cloud metadata), and 0.0.0.0/8.
fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();

    a == 0
        || a == 10
        || a == 127
        || (a == 169 && b == 254)
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
}

/// Loopback, link-local (fe80::/10), unique-local (fc00::/7).
fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    let seg0 = ip.segments()[0];
    ip.is_loopback() || (seg0 & 0xffc0) == 0xfe80 || (seg0 & 0xfe00) == 0xfc00
}
