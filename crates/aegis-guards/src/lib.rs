//! # Aegis Guards
//!
//! The guard chain for the Aegis Gateway:
//! - [`PatternGuard`]: deterministic regex/signature detection for injection
//!   and forbidden-content classes
//! - [`PiiGuard`]: confidence-threshold policy over an external
//!   entity-recognition capability
//! - [`ChainExecutor`]: priority-ordered, short-circuiting execution with
//!   fail-closed error handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chain;
pub mod pattern;
pub mod pii;

// Re-export main types
pub use chain::{ChainExecutor, RequestChainResult, ResponseChainResult};
pub use pattern::{PatternCategory, PatternGuard, PatternRule, PatternTable};
pub use pii::{
    EntityFinding, EntityRecognizer, PiiAction, PiiGuard, RegexEntityRecognizer,
};
