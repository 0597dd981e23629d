//! Access-control gateway subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (any method, any path)
//!     → handler.rs: AddressNormalizer → ClientAddress?
//!         └─ none → Deny 403 (no rule evaluation)
//!     → PolicyCache::get()
//!         └─ store failure → Deny 503 (fail closed)
//!     → first_match(client, rules)
//!         ├─ match → forwarder.rs → upstream origin → response verbatim
//!         └─ none  → Deny 403 with the computed address
//!     → decision.rs renders denials as JSON
//! ```
//!
//! # Design Decisions
//! - Verdicts are recomputed per request, only the rule set is cached
//! - Denials never touch the upstream

pub mod decision;
pub mod forwarder;
pub mod handler;

pub use decision::{Decision, Denial, DenyReason};
pub use forwarder::{ForwardError, Forwarder};
pub use handler::{evaluate, Gateway};
