//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::policy::cache::{clamp_ttl, DEFAULT_TTL_SECS};

pub const DEFAULT_TRUSTED_HEADER: &str = "cf-connecting-ip";
pub const DEFAULT_FORWARDED_HEADER: &str = "x-forwarded-for";

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single origin allowed requests are relayed to.
    pub upstream: UpstreamConfig,

    /// Which headers carry the client address.
    pub client_address: ClientAddressConfig,

    /// Allow-list source and caching.
    pub policy: PolicyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Operator API.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL, e.g. "http://127.0.0.1:3000". A path on it prefixes every request.
    pub origin: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:3000".to_string(),
        }
    }
}

/// Client address header configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientAddressConfig {
    /// Single-hop header set by the trusted edge in front of the gateway.
    pub trusted_header: String,

    /// Comma-separated proxy chain; the leftmost entry is used.
    pub forwarded_header: String,
}

impl Default for ClientAddressConfig {
    fn default() -> Self {
        Self {
            trusted_header: DEFAULT_TRUSTED_HEADER.to_string(),
            forwarded_header: DEFAULT_FORWARDED_HEADER.to_string(),
        }
    }
}

/// Allow-list policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Rule cache TTL in seconds, clamped to [0, 300].
    pub cache_ttl_secs: i64,

    /// Where rules are read from.
    pub store: StoreConfig,
}

impl PolicyConfig {
    pub fn cache_ttl(&self) -> Duration {
        clamp_ttl(self.cache_ttl_secs)
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_TTL_SECS as i64,
            store: StoreConfig::default(),
        }
    }
}

/// Policy store backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// SQLite table with `enabled` and ordering columns.
    Sqlite {
        database_url: String,

        #[serde(default = "default_table")]
        table: String,

        #[serde(default = "default_rule_column")]
        rule_column: String,

        #[serde(default = "default_order_column")]
        order_column: String,

        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },

    /// Rules listed inline, in order.
    Static {
        #[serde(default)]
        rules: Vec<StaticRule>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Static { rules: Vec::new() }
    }
}

impl StoreConfig {
    /// SQLite store with default table layout.
    pub fn sqlite(database_url: impl Into<String>) -> Self {
        StoreConfig::Sqlite {
            database_url: database_url.into(),
            table: default_table(),
            rule_column: default_rule_column(),
            order_column: default_order_column(),
            max_connections: default_max_connections(),
        }
    }
}

/// An inline allow rule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StaticRule {
    /// Exact address or `base/prefix`.
    pub rule: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_table() -> String {
    "ip_allowlist".to_string()
}

fn default_rule_column() -> String {
    "rule".to_string()
}

fn default_order_column() -> String {
    "id".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_enabled() -> bool {
    true
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or filter directive, used when RUST_LOG is unset.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
