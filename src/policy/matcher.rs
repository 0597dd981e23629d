//! Rule matching logic.
//!
//! # Responsibilities
//! - Exact rules: case-insensitive equality (or numeric equality within a family)
//! - CIDR rules: prefix comparison on `u32` (IPv4) or `[u8; 16]` (IPv6)
//!
//! # Design Decisions
//! - Never fails: an unparseable rule or client is a non-match for that rule
//! - The rule's base address picks the family; the client is never coerced
//!   across families
//! - No string prefix tricks, everything is compared numerically

use crate::address::parse::{parse_ipv4, parse_ipv6, ParsedAddress};

/// Returns true if `client` is covered by `rule`.
pub fn matches(client: &str, rule: &str) -> bool {
    match rule.split_once('/') {
        None => exact_match(client, rule),
        Some((base, prefix)) if base.contains(':') => {
            parse_prefix(prefix, 128).is_some_and(|n| ipv6_in_prefix(client, base, n))
        }
        Some((base, prefix)) => {
            parse_prefix(prefix, 32).is_some_and(|n| ipv4_in_prefix(client, base, n))
        }
    }
}

/// First rule that covers `client`, in rule order.
pub fn first_match<'a, I>(client: &str, rules: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    rules
        .into_iter()
        .map(String::as_str)
        .find(|rule| matches(client, rule))
}

fn exact_match(client: &str, rule: &str) -> bool {
    if client.is_empty() || rule.is_empty() {
        return false;
    }
    if client.eq_ignore_ascii_case(rule) {
        return true;
    }
    match (ParsedAddress::parse(client), ParsedAddress::parse(rule)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Decimal prefix length within `0..=max`.
fn parse_prefix(text: &str, max: u8) -> Option<u8> {
    if text.is_empty() || text.len() > 3 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<u8>().ok().filter(|n| *n <= max)
}

fn ipv4_in_prefix(client: &str, base: &str, prefix: u8) -> bool {
    let (Ok(client), Ok(base)) = (parse_ipv4(client), parse_ipv4(base)) else {
        return false;
    };
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    };
    client & mask == base & mask
}

fn ipv6_in_prefix(client: &str, base: &str, prefix: u8) -> bool {
    let (Ok(client), Ok(base)) = (parse_ipv6(client), parse_ipv6(base)) else {
        return false;
    };

    let whole = usize::from(prefix / 8);
    let rem = prefix % 8;

    if client[..whole] != base[..whole] {
        return false;
    }
    if rem == 0 {
        return true;
    }

    let mask = 0xFFu8 << (8 - rem);
    client[whole] & mask == base[whole] & mask
}
