//! Startup orchestration.
//!
//! # Responsibilities
//! - Warm the policy cache before traffic arrives
//! - Bind listeners with errors that name the address
//!
//! # Design Decisions
//! - An unreachable policy store is not fatal: requests fail closed with 503
//!   until it recovers
//! - A listener that cannot bind is fatal

use std::io;
use tokio::net::TcpListener;

use crate::policy::PolicyCache;

/// Load the rule set once. Returns whether it succeeded.
pub async fn warm_policy_cache(cache: &PolicyCache) -> bool {
    match cache.force_refresh().await {
        Ok(rules) => {
            tracing::info!(
                rules = rules.len(),
                store = %cache.store_description(),
                ttl_secs = cache.ttl().as_secs(),
                "Allow list loaded"
            );
            true
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                store = %cache.store_description(),
                "Allow list not loaded at startup, requests will be denied until the store is reachable"
            );
            false
        }
    }
}

/// Bind a TCP listener, attaching the address to any error.
pub async fn bind(address: &str) -> io::Result<TcpListener> {
    TcpListener::bind(address)
        .await
        .map_err(|e| io::Error::new(e.kind(), format!("failed to bind {address}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::StaticPolicyStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn warm_up_populates_the_snapshot() {
        let cache = PolicyCache::new(
            Arc::new(StaticPolicyStore::from_rules(["10.0.0.0/8", "192.0.2.1"])),
            Duration::from_secs(30),
        );
        assert!(warm_policy_cache(&cache).await);
        assert_eq!(cache.snapshot().map(|s| s.len()), Some(2));
    }

    #[tokio::test]
    async fn bind_error_names_the_address() {
        let err = bind("not-an-address").await.unwrap_err();
        assert!(err.to_string().contains("not-an-address"));
    }
}
