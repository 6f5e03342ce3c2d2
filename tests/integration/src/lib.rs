//! Integration tests for Aegis Gateway.
//!
//! These drive the full router in-process with mock backends: guard
//! blocking, masking, routing tiers, retry behavior, caching, rate
//! limiting, and the signed-webhook validator.

pub mod helpers;
pub mod mock_backend;

pub use helpers::*;
pub use mock_backend::*;

#[cfg(test)]
mod pipeline_tests;
#[cfg(test)]
mod routing_tests;
#[cfg(test)]
mod webhook_tests;
