//! Client address extraction from proxy headers.
//!
//! # Responsibilities
//! - Pick the client address from the trusted single-hop header, or the
//!   leftmost entry of the forwarded chain
//! - Strip ports and `[...]` bracket syntax, lowercase everything else
//!
//! # Design Decisions
//! - The trusted header is authoritative when present; it is only ever set by
//!   the edge platform in front of the gateway
//! - No header, no address: the caller must fail closed

use axum::http::{HeaderMap, HeaderName};
use std::fmt;

use crate::config::schema::{ClientAddressConfig, DEFAULT_FORWARDED_HEADER, DEFAULT_TRUSTED_HEADER};

/// Canonical textual client address. Recomputed per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress(String);

impl ClientAddress {
    /// Normalize a single raw address, as an operator might type it.
    pub fn from_raw(raw: &str) -> Option<Self> {
        let normalized = normalize(raw);
        (!normalized.is_empty()).then_some(ClientAddress(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ClientAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extracts the client address from request headers.
#[derive(Debug, Clone)]
pub struct AddressNormalizer {
    trusted_header: HeaderName,
    forwarded_header: HeaderName,
}

impl AddressNormalizer {
    pub fn new(trusted_header: HeaderName, forwarded_header: HeaderName) -> Self {
        Self {
            trusted_header,
            forwarded_header,
        }
    }

    /// Build from configuration. Header names are checked during config validation,
    /// an invalid one here falls back to the default.
    pub fn from_config(config: &ClientAddressConfig) -> Self {
        let header = |name: &str, fallback: &'static str| {
            HeaderName::try_from(name.trim().to_ascii_lowercase())
                .unwrap_or_else(|_| HeaderName::from_static(fallback))
        };
        Self::new(
            header(&config.trusted_header, DEFAULT_TRUSTED_HEADER),
            header(&config.forwarded_header, DEFAULT_FORWARDED_HEADER),
        )
    }

    /// Best-effort client address, or `None` if no header yields one.
    pub fn client_address(&self, headers: &HeaderMap) -> Option<ClientAddress> {
        let raw = self
            .header_value(headers, &self.trusted_header)
            .map(str::to_string)
            .or_else(|| {
                self.header_value(headers, &self.forwarded_header)
                    .and_then(|chain| chain.split(',').next())
                    .map(|first| first.trim().to_string())
            })?;

        ClientAddress::from_raw(&raw)
    }

    fn header_value<'a>(&self, headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Canonicalize one raw header entry.
pub fn normalize(raw: &str) -> String {
    let value = raw.trim();

    if let Some(inner) = bracketed(value) {
        return inner.to_ascii_lowercase();
    }
    if let Some(host) = ipv4_without_port(value) {
        return host.to_string();
    }
    value.to_ascii_lowercase()
}

/// `[addr]` or `[addr]:port` → `addr`.
fn bracketed(value: &str) -> Option<&str> {
    let rest = value.strip_prefix('[')?;
    let (inner, after) = rest.split_once(']')?;
    let port_ok = after.is_empty()
        || after
            .strip_prefix(':')
            .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()));
    (port_ok && !inner.is_empty()).then_some(inner)
}

/// `ddd.ddd.ddd.ddd[:port]` → `ddd.ddd.ddd.ddd`.
fn ipv4_without_port(value: &str) -> Option<&str> {
    let (host, port) = match value.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (value, None),
    };

    let quad_shape = {
        let octets: Vec<&str> = host.split('.').collect();
        octets.len() == 4
            && octets
                .iter()
                .all(|o| (1..=3).contains(&o.len()) && o.bytes().all(|b| b.is_ascii_digit()))
    };
    let port_ok = port.map_or(true, |p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));

    (quad_shape && port_ok).then_some(host)
}
