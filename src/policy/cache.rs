//! Time-bounded cache of the enabled rule set.

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::policy::store::{PolicyStore, StoreError};

/// Default TTL when none (or garbage) is configured.
pub const DEFAULT_TTL_SECS: u64 = 30;

/// Upper bound on staleness.
pub const MAX_TTL_SECS: u64 = 300;

/// Clamp a configured TTL in seconds to `[0, MAX_TTL_SECS]`.
pub fn clamp_ttl(secs: i64) -> Duration {
    Duration::from_secs(secs.clamp(0, MAX_TTL_SECS as i64) as u64)
}

/// Parse a textual TTL setting. Unset or unparseable falls back to the default.
pub fn ttl_from_setting(value: Option<&str>) -> Duration {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(clamp_ttl)
        .unwrap_or(Duration::from_secs(DEFAULT_TTL_SECS))
}

#[derive(Debug, Clone, Error)]
pub enum PolicyError {
    #[error("policy store unavailable: {0}")]
    Unavailable(String),
}

/// One immutable snapshot of the allow list.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<String>,
    fetched_at: Instant,
    expires_at: Instant,
}

impl RuleSet {
    /// Trim and lowercase every rule, dropping empties. Order is preserved.
    fn from_raw(raw: Vec<String>, ttl: Duration) -> Self {
        let rules = raw
            .into_iter()
            .map(|r| r.trim().to_ascii_lowercase())
            .filter(|r| !r.is_empty())
            .collect();
        let fetched_at = Instant::now();
        Self {
            rules,
            fetched_at,
            expires_at: fetched_at + ttl,
        }
    }

    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }

    /// Time since this snapshot was fetched.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Time until expiry, zero once stale.
    pub fn expires_in(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Outcome of the most recent refresh attempt.
#[derive(Default)]
struct RefreshState {
    last_error: Option<PolicyError>,
}

/// Shared, lazily refreshed view of the policy store.
///
/// Readers load the current snapshot without locking. A stale snapshot is
/// replaced as a whole by a single in-flight refresh; callers that queued
/// behind it take its result instead of querying the store again.
pub struct PolicyCache {
    store: Arc<dyn PolicyStore>,
    ttl: Duration,
    snapshot: ArcSwapOption<RuleSet>,
    refresh: Mutex<RefreshState>,
    /// Bumped after every completed refresh attempt.
    generation: AtomicU64,
}

impl PolicyCache {
    pub fn new(store: Arc<dyn PolicyStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            snapshot: ArcSwapOption::empty(),
            refresh: Mutex::new(RefreshState::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store_description(&self) -> String {
        self.store.describe()
    }

    /// The current snapshot, fresh or not, without touching the store.
    pub fn snapshot(&self) -> Option<Arc<RuleSet>> {
        self.snapshot.load_full()
    }

    /// Current rules, refreshing from the store when stale.
    ///
    /// A failed refresh is an error, never an empty or stale rule set.
    pub async fn get(&self) -> Result<Arc<RuleSet>, PolicyError> {
        if let Some(current) = self.fresh_snapshot() {
            return Ok(current);
        }

        let seen = self.generation.load(Ordering::Acquire);
        let mut state = self.refresh.lock().await;

        if self.generation.load(Ordering::Acquire) != seen {
            // A refresh completed while we waited for the lock; share its outcome.
            if let Some(err) = &state.last_error {
                return Err(err.clone());
            }
            if let Some(current) = self.snapshot.load_full() {
                return Ok(current);
            }
        }

        if let Some(current) = self.fresh_snapshot() {
            return Ok(current);
        }
        self.refresh_locked(&mut state).await
    }

    /// Refresh now, regardless of expiry.
    pub async fn force_refresh(&self) -> Result<Arc<RuleSet>, PolicyError> {
        let mut state = self.refresh.lock().await;
        self.refresh_locked(&mut state).await
    }

    fn fresh_snapshot(&self) -> Option<Arc<RuleSet>> {
        self.snapshot.load_full().filter(|s| s.is_fresh())
    }

    async fn refresh_locked(&self, state: &mut RefreshState) -> Result<Arc<RuleSet>, PolicyError> {
        let outcome = self.store.enabled_rules().await;
        let result = self.apply(state, outcome);
        self.generation.fetch_add(1, Ordering::Release);
        result
    }

    fn apply(
        &self,
        state: &mut RefreshState,
        outcome: Result<Vec<String>, StoreError>,
    ) -> Result<Arc<RuleSet>, PolicyError> {
        match outcome {
            Ok(raw) => {
                let rules = Arc::new(RuleSet::from_raw(raw, self.ttl));
                self.snapshot.store(Some(Arc::clone(&rules)));
                state.last_error = None;

                metrics::record_policy_refresh(true, rules.len());
                tracing::debug!(
                    rules = rules.len(),
                    ttl_secs = self.ttl.as_secs(),
                    "Allow list refreshed"
                );
                Ok(rules)
            }
            Err(e) => {
                let err = PolicyError::Unavailable(e.to_string());
                state.last_error = Some(err.clone());

                metrics::record_policy_refresh(false, 0);
                tracing::error!(store = %self.store.describe(), error = %e, "Allow list refresh failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::store::StaticPolicyStore;
    use futures_util::future::BoxFuture;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Wraps a static store, counting reads and optionally failing or stalling.
    struct ProbeStore {
        inner: StaticPolicyStore,
        reads: AtomicUsize,
        failing: AtomicBool,
        delay: Duration,
    }

    impl ProbeStore {
        fn new(rules: &[&str], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                inner: StaticPolicyStore::from_rules(rules.iter().copied()),
                reads: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                delay,
            })
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl PolicyStore for ProbeStore {
        fn enabled_rules(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>> {
            Box::pin(async move {
                self.reads.fetch_add(1, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                if self.failing.load(Ordering::SeqCst) {
                    return Err(StoreError::Unavailable("injected".into()));
                }
                self.inner.enabled_rules().await
            })
        }

        fn describe(&self) -> String {
            "probe".into()
        }
    }

    #[test]
    fn ttl_clamping() {
        assert_eq!(clamp_ttl(-5), Duration::ZERO);
        assert_eq!(clamp_ttl(45), Duration::from_secs(45));
        assert_eq!(clamp_ttl(10_000), Duration::from_secs(300));
        assert_eq!(ttl_from_setting(None), Duration::from_secs(30));
        assert_eq!(ttl_from_setting(Some("abc")), Duration::from_secs(30));
        assert_eq!(ttl_from_setting(Some(" 60 ")), Duration::from_secs(60));
        assert_eq!(ttl_from_setting(Some("-1")), Duration::ZERO);
        assert_eq!(ttl_from_setting(Some("301")), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn rules_are_normalized() {
        let store = ProbeStore::new(&["  10.0.0.0/8 ", "", "2001:DB8::/32", "   "], Duration::ZERO);
        let cache = PolicyCache::new(store, Duration::from_secs(30));
        let rules = cache.get().await.unwrap();
        assert_eq!(rules.rules(), ["10.0.0.0/8", "2001:db8::/32"]);
    }

    #[tokio::test(start_paused = true)]
    async fn serves_from_cache_within_ttl() {
        let store = ProbeStore::new(&["10.0.0.0/8"], Duration::ZERO);
        let cache = PolicyCache::new(store.clone(), Duration::from_secs(30));

        assert!(cache.snapshot().is_none());
        cache.get().await.unwrap();
        tokio::time::advance(Duration::from_secs(29)).await;
        cache.get().await.unwrap();
        assert_eq!(store.reads(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        cache.get().await.unwrap();
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_rule_disappears_within_ttl() {
        let store = ProbeStore::new(&["10.0.0.0/8", "192.0.2.0/24"], Duration::ZERO);
        let cache = PolicyCache::new(store.clone(), Duration::from_secs(10));
        assert_eq!(cache.get().await.unwrap().len(), 2);

        store.inner.set_enabled("10.0.0.0/8", false);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get().await.unwrap().len(), 2, "still inside the window");

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get().await.unwrap().rules(), ["192.0.2.0/24"]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_always_refreshes() {
        let store = ProbeStore::new(&["10.0.0.0/8"], Duration::ZERO);
        let cache = PolicyCache::new(store.clone(), Duration::ZERO);
        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_not_masked_by_stale_rules() {
        let store = ProbeStore::new(&["10.0.0.0/8"], Duration::ZERO);
        let cache = PolicyCache::new(store.clone(), Duration::from_secs(30));
        cache.get().await.unwrap();

        store.failing.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(matches!(cache.get().await, Err(PolicyError::Unavailable(_))));

        // The stale snapshot stays visible for diagnostics only.
        assert!(!cache.snapshot().unwrap().is_fresh());

        store.failing.store(false, Ordering::SeqCst);
        assert_eq!(cache.get().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_refresh() {
        let store = ProbeStore::new(&["10.0.0.0/8"], Duration::from_millis(50));
        let cache = Arc::new(PolicyCache::new(store.clone(), Duration::from_secs(30)));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get().await.map(|r| r.len()) })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 1);
        }
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_failure() {
        let store = ProbeStore::new(&["10.0.0.0/8"], Duration::from_millis(50));
        store.failing.store(true, Ordering::SeqCst);
        let cache = Arc::new(PolicyCache::new(store.clone(), Duration::from_secs(30)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get().await.is_err() })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_ignores_expiry() {
        let store = ProbeStore::new(&["10.0.0.0/8"], Duration::ZERO);
        let cache = PolicyCache::new(store.clone(), Duration::from_secs(300));
        cache.get().await.unwrap();

        store.inner.insert("192.0.2.1", true);
        assert_eq!(cache.force_refresh().await.unwrap().len(), 2);
        assert_eq!(cache.get().await.unwrap().len(), 2);
        assert_eq!(store.reads(), 2);
    }
}
