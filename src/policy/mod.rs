//! Allow-list policy subsystem.
//!
//! # Data Flow
//! ```text
//! PolicyStore (store.rs: SQLite table or static list)
//!     → cache.rs (snapshot + expiry, single-flight refresh)
//!     → Arc<RuleSet> shared by every in-flight request
//!     → matcher.rs (client address vs. each rule, in order)
//!     → allowed / not allowed
//! ```
//!
//! # Design Decisions
//! - Only the rule set is cached, never a per-client verdict
//! - Snapshots are replaced whole, never edited in place
//! - Fail closed: a store failure is an error, not an empty allow list

pub mod cache;
pub mod matcher;
pub mod store;

pub use cache::{PolicyCache, PolicyError, RuleSet};
pub use matcher::{first_match, matches};
pub use store::{build_store, PolicyStore, SqlitePolicyStore, StaticPolicyStore, StoreError};
