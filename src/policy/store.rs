//! Durable allow-rule sources.
//!
//! The gateway only ever reads: every store answers one question, "which
//! rules are enabled, in insertion order".

use futures_util::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::config::schema::{StaticRule, StoreConfig};

/// Errors surfaced by a policy store read.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only source of enabled allow rules.
pub trait PolicyStore: Send + Sync {
    /// Raw rule strings of every enabled rule, ordered by the stable key.
    fn enabled_rules(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>>;

    /// Short label for logs and the admin API.
    fn describe(&self) -> String;
}

/// SQLite-backed store, issuing
/// `SELECT <rule> FROM <table> WHERE enabled = 1 ORDER BY <order> ASC`.
pub struct SqlitePolicyStore {
    pool: SqlitePool,
    query: String,
    table: String,
}

impl SqlitePolicyStore {
    /// Wrap an existing pool. Identifiers must already be validated.
    pub fn new(pool: SqlitePool, table: &str, rule_column: &str, order_column: &str) -> Self {
        Self {
            pool,
            query: format!(
                "SELECT {rule_column} FROM {table} WHERE enabled = 1 ORDER BY {order_column} ASC"
            ),
            table: table.to_string(),
        }
    }

    /// Create a lazily connecting, read-only pool. Nothing touches the database
    /// until the first refresh.
    pub fn connect_lazy(
        database_url: &str,
        max_connections: u32,
        table: &str,
        rule_column: &str,
        order_column: &str,
    ) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy_with(options);
        Ok(Self::new(pool, table, rule_column, order_column))
    }
}

impl PolicyStore for SqlitePolicyStore {
    fn enabled_rules(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>> {
        Box::pin(async move {
            let rows: Vec<Option<String>> = sqlx::query_scalar(&self.query)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().flatten().collect())
        })
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.table)
    }
}

/// In-memory store, seeded from configuration.
///
/// Entries keep their insertion order. The gateway only reads it; `insert` and
/// `set_enabled` are for the embedding program.
#[derive(Clone, Default)]
pub struct StaticPolicyStore {
    rules: Arc<RwLock<Vec<StaticRule>>>,
}

impl StaticPolicyStore {
    pub fn new(rules: Vec<StaticRule>) -> Self {
        Self {
            rules: Arc::new(RwLock::new(rules)),
        }
    }

    /// All given rules, enabled.
    pub fn from_rules<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            rules
                .into_iter()
                .map(|rule| StaticRule {
                    rule: rule.into(),
                    enabled: true,
                })
                .collect(),
        )
    }

    /// Append a rule at the end of the ordering.
    pub fn insert(&self, rule: impl Into<String>, enabled: bool) {
        if let Ok(mut rules) = self.rules.write() {
            rules.push(StaticRule {
                rule: rule.into(),
                enabled,
            });
        }
    }

    /// Enable or disable every entry with this rule text. Returns how many changed.
    pub fn set_enabled(&self, rule: &str, enabled: bool) -> usize {
        let Ok(mut rules) = self.rules.write() else {
            return 0;
        };
        let mut changed = 0;
        for entry in rules.iter_mut().filter(|r| r.rule == rule && r.enabled != enabled) {
            entry.enabled = enabled;
            changed += 1;
        }
        changed
    }
}

impl PolicyStore for StaticPolicyStore {
    fn enabled_rules(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>> {
        let result = self
            .rules
            .read()
            .map(|rules| {
                rules
                    .iter()
                    .filter(|r| r.enabled)
                    .map(|r| r.rule.clone())
                    .collect()
            })
            .map_err(|_| StoreError::Unavailable("static rule list lock poisoned".into()));
        Box::pin(async move { result })
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

/// Build the configured store.
pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn PolicyStore>, StoreError> {
    let store: Arc<dyn PolicyStore> = match config {
        StoreConfig::Sqlite {
            database_url,
            table,
            rule_column,
            order_column,
            max_connections,
        } => Arc::new(SqlitePolicyStore::connect_lazy(
            database_url,
            *max_connections,
            table,
            rule_column,
            order_column,
        )?),
        StoreConfig::Static { rules } => Arc::new(StaticPolicyStore::new(rules.clone())),
    };
    tracing::info!(store = %store.describe(), "Policy store configured");
    Ok(store)
}
