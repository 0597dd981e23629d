//! Client address subsystem.
//!
//! # Data Flow
//! ```text
//! Request headers
//!     → normalize.rs (trusted header, else leftmost forwarded entry;
//!                     strip port / brackets, lowercase)
//!     → ClientAddress (canonical text)
//!     → parse.rs (u32 for IPv4, [u8; 16] for IPv6) when a rule needs numbers
//! ```
//!
//! # Design Decisions
//! - Normalization is string-level and never fails; parsing is numeric and
//!   always returns a `Result`
//! - Both stages are pure and synchronous

pub mod normalize;
pub mod parse;

pub use normalize::{AddressNormalizer, ClientAddress};
pub use parse::{parse_ipv4, parse_ipv6, ParseError, ParsedAddress};
