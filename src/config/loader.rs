//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::{GatewayConfig, StoreConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::policy::cache::ttl_from_setting;

/// Cache TTL override, in seconds.
pub const ENV_CACHE_TTL: &str = "ALLOWLIST_CACHE_TTL";
/// Upstream origin override.
pub const ENV_UPSTREAM_ORIGIN: &str = "UPSTREAM_ORIGIN";
/// Switches the policy store to SQLite at this URL.
pub const ENV_DATABASE_URL: &str = "ALLOWLIST_DATABASE_URL";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse configuration from TOML text without validating it.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}

/// Load configuration: file (or defaults), then environment overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            parse_config(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides through `lookup`, so tests need not touch the process env.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(ENV_CACHE_TTL) {
        let ttl = ttl_from_setting(Some(&raw));
        config.policy.cache_ttl_secs = ttl.as_secs() as i64;
    }

    if let Some(origin) = lookup(ENV_UPSTREAM_ORIGIN).filter(|v| !v.trim().is_empty()) {
        config.upstream.origin = origin.trim().to_string();
    }

    if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.trim().is_empty()) {
        config.policy.store = match std::mem::take(&mut config.policy.store) {
            StoreConfig::Sqlite {
                table,
                rule_column,
                order_column,
                max_connections,
                ..
            } => StoreConfig::Sqlite {
                database_url: url.trim().to_string(),
                table,
                rule_column,
                order_column,
                max_connections,
            },
            StoreConfig::Static { .. } => StoreConfig::sqlite(url.trim()),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.client_address.trusted_header, "cf-connecting-ip");
        assert_eq!(config.policy.cache_ttl(), Duration::from_secs(30));
        assert!(matches!(config.policy.store, StoreConfig::Static { ref rules } if rules.is_empty()));
    }

    #[test]
    fn parses_full_file() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [upstream]
            origin = "http://10.0.0.5:8080/api"

            [client_address]
            trusted_header = "x-real-ip"

            [policy]
            cache_ttl_secs = 900

            [policy.store]
            kind = "sqlite"
            database_url = "sqlite://rules.db"
            table = "allowed_ips"
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.origin, "http://10.0.0.5:8080/api");
        assert_eq!(config.client_address.trusted_header, "x-real-ip");
        assert_eq!(config.client_address.forwarded_header, "x-forwarded-for");
        assert_eq!(config.policy.cache_ttl(), Duration::from_secs(300));
        match config.policy.store {
            StoreConfig::Sqlite { table, rule_column, order_column, .. } => {
                assert_eq!(table, "allowed_ips");
                assert_eq!(rule_column, "rule");
                assert_eq!(order_column, "id");
            }
            other => panic!("unexpected store {other:?}"),
        }
    }

    #[test]
    fn parses_static_rules() {
        let config = parse_config(
            r#"
            [policy.store]
            kind = "static"
            rules = [
                { rule = "10.0.0.0/8" },
                { rule = "192.0.2.1", enabled = false },
            ]
            "#,
        )
        .unwrap();
        let StoreConfig::Static { rules } = config.policy.store else {
            panic!("expected static store");
        };
        assert_eq!(rules.len(), 2);
        assert!(rules[0].enabled);
        assert!(!rules[1].enabled);
    }

    #[test]
    fn unknown_store_kind_is_a_parse_error() {
        let err = parse_config("[policy.store]\nkind = \"redis\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                (ENV_CACHE_TTL, "-20"),
                (ENV_UPSTREAM_ORIGIN, " http://origin:81 "),
                (ENV_DATABASE_URL, "sqlite://allow.db"),
            ]),
        );
        assert_eq!(config.policy.cache_ttl(), Duration::ZERO);
        assert_eq!(config.upstream.origin, "http://origin:81");
        assert!(matches!(
            config.policy.store,
            StoreConfig::Sqlite { ref database_url, ref table, .. }
                if database_url == "sqlite://allow.db" && table == "ip_allowlist"
        ));
    }

    #[test]
    fn invalid_env_ttl_falls_back_to_default() {
        let mut config = GatewayConfig::default();
        config.policy.cache_ttl_secs = 120;
        apply_env_overrides(&mut config, env(&[(ENV_CACHE_TTL, "soon")]));
        assert_eq!(config.policy.cache_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Some(Path::new("/nonexistent/gateway.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
