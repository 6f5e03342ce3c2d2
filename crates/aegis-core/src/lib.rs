//! # Aegis Core
//!
//! Core types, traits, and error handling for the Aegis Gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - The per-request [`RequestContext`] and its append-only verdict chain
//! - Guard verdicts and the [`Guard`] trait
//! - The [`CompletionBackend`] abstraction over LLM providers
//! - Error types and the request error taxonomy

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod counter;
pub mod error;
pub mod plugin;
pub mod profile;
pub mod verdict;

// Re-export commonly used types
pub use context::{RequestContext, RequestContextBuilder, RequestPhase, RouteOverride};
pub use counter::{AtomicRateCounter, RateCounter};
pub use error::{GatewayError, GatewayResult};
pub use plugin::{Guard, GuardCapability, GuardOutput, PluginDescriptor};
pub use profile::{
    BackoffPolicy, Completion, CompletionBackend, CompletionRequest, ProviderProfile, Usage,
};
pub use verdict::{GuardVerdict, VerdictDetail, VerdictOutcome};
