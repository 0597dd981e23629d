//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, the upstream URL and header names
//! - Guard the SQL identifiers that are interpolated into the rule query
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::HeaderName;
use std::fmt;
use std::net::SocketAddr;
use url::Url;

use crate::config::schema::{GatewayConfig, StoreConfig};

/// A single semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check every semantic constraint, collecting all failures.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_upstream(&mut errors, &config.upstream.origin);
    check_header(&mut errors, "client_address.trusted_header", &config.client_address.trusted_header);
    check_header(&mut errors, "client_address.forwarded_header", &config.client_address.forwarded_header);

    if let StoreConfig::Sqlite {
        database_url,
        table,
        rule_column,
        order_column,
        max_connections,
    } = &config.policy.store
    {
        if database_url.trim().is_empty() {
            errors.push(ValidationError::new("policy.store.database_url", "must not be empty"));
        }
        check_identifier(&mut errors, "policy.store.table", table);
        check_identifier(&mut errors, "policy.store.rule_column", rule_column);
        check_identifier(&mut errors, "policy.store.order_column", order_column);
        if *max_connections == 0 {
            errors.push(ValidationError::new("policy.store.max_connections", "must be at least 1"));
        }
    }

    if config.observability.metrics_enabled {
        check_socket_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if config.admin.enabled {
        check_socket_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "required when admin is enabled"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("'{value}' is not a socket address")));
    }
}

fn check_upstream(errors: &mut Vec<ValidationError>, origin: &str) {
    const FIELD: &str = "upstream.origin";
    match Url::parse(origin) {
        Ok(url) => {
            if url.scheme() != "http" {
                errors.push(ValidationError::new(FIELD, format!("scheme '{}' is not supported, use http", url.scheme())));
            }
            if url.host_str().is_none() {
                errors.push(ValidationError::new(FIELD, "missing host"));
            }
            if url.query().is_some() || url.fragment().is_some() {
                errors.push(ValidationError::new(FIELD, "must not carry a query or fragment"));
            }
        }
        Err(e) => errors.push(ValidationError::new(FIELD, format!("'{origin}': {e}"))),
    }
}

fn check_header(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if HeaderName::try_from(value.trim()).is_err() {
        errors.push(ValidationError::new(field, format!("'{value}' is not a valid header name")));
    }
}

fn check_identifier(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    let mut chars = value.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        errors.push(ValidationError::new(field, format!("'{value}' is not a plain SQL identifier")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.upstream.origin = "https://origin.example.com/?a=1".into();
        config.client_address.trusted_header = "bad header".into();
        config.admin.enabled = true;

        let fields: Vec<&str> = validate_config(&config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "upstream.origin",
                "upstream.origin",
                "client_address.trusted_header",
                "admin.api_key",
            ]
        );
    }

    #[test]
    fn rejects_sql_injection_in_identifiers() {
        let mut config = GatewayConfig::default();
        config.policy.store = StoreConfig::Sqlite {
            database_url: "sqlite://rules.db".into(),
            table: "ip_allowlist; DROP TABLE users".into(),
            rule_column: "rule".into(),
            order_column: "1id".into(),
            max_connections: 0,
        };
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "policy.store.table",
                "policy.store.order_column",
                "policy.store.max_connections",
            ]
        );
    }

    #[test]
    fn upstream_must_parse() {
        let mut config = GatewayConfig::default();
        config.upstream.origin = "not a url".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "upstream.origin");
    }
}
