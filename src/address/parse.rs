//! Textual address parsing into fixed-width numeric forms.
//!
//! # Responsibilities
//! - IPv4 dotted-quad → `u32` (big-endian)
//! - IPv6 colon form → `[u8; 16]`, with a single `::` zero run and an
//!   optional embedded dotted-quad in the low 32 bits
//!
//! # Design Decisions
//! - Strict: leading zeros in IPv4 octets are rejected, so a textual address
//!   has exactly one spelling per numeric value on the IPv4 side
//! - Every sub-step returns `Result`, failures short-circuit with `?`; a
//!   malformed input never yields a partially filled value

use thiserror::Error;

/// Reasons an address failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty address")]
    Empty,

    #[error("expected 4 dot-separated octets, found {0}")]
    Ipv4GroupCount(usize),

    #[error("invalid IPv4 octet '{0}'")]
    Ipv4Octet(String),

    #[error("IPv4 octet '{0}' has a leading zero")]
    Ipv4LeadingZero(String),

    #[error("more than one '::' in IPv6 address")]
    Ipv6MultipleCompression,

    #[error("IPv6 address resolves to {0} groups, expected 8")]
    Ipv6GroupCount(usize),

    #[error("invalid IPv6 group '{0}'")]
    Ipv6Group(String),

    #[error("embedded IPv4 is only allowed in the last 32 bits")]
    MisplacedIpv4,
}

/// A parsed address of either family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedAddress {
    V4(u32),
    V6([u8; 16]),
}

impl ParsedAddress {
    /// Parse IPv6 if the text contains a colon, IPv4 otherwise.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        if text.contains(':') {
            parse_ipv6(text).map(Self::V6)
        } else {
            parse_ipv4(text).map(Self::V4)
        }
    }
}

/// Parse a dotted-quad IPv4 address.
pub fn parse_ipv4(text: &str) -> Result<u32, ParseError> {
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let octets: Vec<&str> = text.split('.').collect();
    if octets.len() != 4 {
        return Err(ParseError::Ipv4GroupCount(octets.len()));
    }

    octets
        .into_iter()
        .try_fold(0u32, |acc, octet| Ok((acc << 8) | u32::from(parse_octet(octet)?)))
}

fn parse_octet(octet: &str) -> Result<u8, ParseError> {
    if octet.is_empty() || octet.len() > 3 || !octet.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::Ipv4Octet(octet.to_string()));
    }
    if octet.len() > 1 && octet.starts_with('0') {
        return Err(ParseError::Ipv4LeadingZero(octet.to_string()));
    }
    octet
        .parse::<u8>()
        .map_err(|_| ParseError::Ipv4Octet(octet.to_string()))
}

/// Parse an IPv6 address in full, compressed, or IPv4-embedded form.
pub fn parse_ipv6(text: &str) -> Result<[u8; 16], ParseError> {
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let groups = match split_compression(text)? {
        (head, Some(tail)) => {
            // Zero groups always follow the head, so it can never end in a dotted quad.
            let head = parse_groups(head, false)?;
            let tail = parse_groups(tail, true)?;
            expand(head, tail)?
        }
        (full, None) => parse_groups(full, true)?,
    };

    if groups.len() != 8 {
        return Err(ParseError::Ipv6GroupCount(groups.len()));
    }

    let mut bytes = [0u8; 16];
    for (chunk, group) in bytes.chunks_exact_mut(2).zip(groups) {
        chunk.copy_from_slice(&group.to_be_bytes());
    }
    Ok(bytes)
}

/// Split on the `::` zero run, rejecting a second occurrence.
fn split_compression(text: &str) -> Result<(&str, Option<&str>), ParseError> {
    match text.split_once("::") {
        Some((_, tail)) if tail.contains("::") => Err(ParseError::Ipv6MultipleCompression),
        Some((head, tail)) => Ok((head, Some(tail))),
        None => Ok((text, None)),
    }
}

/// Parse a colon-separated run of groups. An empty run yields no groups.
fn parse_groups(run: &str, allow_ipv4_tail: bool) -> Result<Vec<u16>, ParseError> {
    if run.is_empty() {
        return Ok(Vec::new());
    }

    let parts: Vec<&str> = run.split(':').collect();
    let last = parts.len() - 1;
    let mut groups = Vec::with_capacity(parts.len() + 1);

    for (i, part) in parts.into_iter().enumerate() {
        if part.contains('.') {
            if i != last || !allow_ipv4_tail {
                return Err(ParseError::MisplacedIpv4);
            }
            let v4 = parse_ipv4(part)?;
            groups.push((v4 >> 16) as u16);
            groups.push(v4 as u16);
        } else {
            groups.push(parse_hex_group(part)?);
        }
    }
    Ok(groups)
}

fn parse_hex_group(part: &str) -> Result<u16, ParseError> {
    if part.is_empty() || part.len() > 4 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ParseError::Ipv6Group(part.to_string()));
    }
    u16::from_str_radix(part, 16).map_err(|_| ParseError::Ipv6Group(part.to_string()))
}

/// Fill the `::` gap with zero groups. The gap must stand for at least one group.
fn expand(head: Vec<u16>, tail: Vec<u16>) -> Result<Vec<u16>, ParseError> {
    let explicit = head.len() + tail.len();
    if explicit > 7 {
        return Err(ParseError::Ipv6GroupCount(explicit + 1));
    }

    let mut groups = head;
    groups.resize(8 - tail.len(), 0);
    groups.extend(tail);
    Ok(groups)
}
