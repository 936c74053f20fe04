//! Domain extraction from blacklist bodies.

use regex::Regex;
use std::net::IpAddr;
use std::sync::LazyLock;

use crate::config::ListFormat;
use crate::dns::canonical_domain;

static DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9][a-z0-9-]{0,61}[a-z0-9]")
        .expect("domain pattern compiles")
});

/// Hosts-file entries that name the machine itself rather than a blocked domain.
const HOSTS_BOILERPLATE: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
];

/// Pull canonical domains out of a list body.
pub fn extract_domains(text: &str, format: ListFormat) -> Vec<String> {
    match format {
        ListFormat::Lines => extract_lines(text),
        ListFormat::Pattern => extract_pattern(text),
    }
}

/// Every name on a line counts, so a hosts entry such as
/// `0.0.0.0 a.example b.example` yields both domains.
fn extract_lines(text: &str) -> Vec<String> {
    text.lines()
        .flat_map(|line| line.split('#').next().unwrap_or_default().split_whitespace())
        .filter(|token| !is_address(token) && !HOSTS_BOILERPLATE.contains(token))
        .map(canonical_domain)
        .collect()
}

fn extract_pattern(text: &str) -> Vec<String> {
    let text = text.to_ascii_lowercase();
    DOMAIN_PATTERN
        .find_iter(&text)
        .map(|m| m.as_str())
        .filter(|token| !is_address(token))
        .map(canonical_domain)
        .collect()
}

fn is_address(token: &str) -> bool {
    token.parse::<IpAddr>().is_ok()
}
