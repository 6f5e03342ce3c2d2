//! Provider selection and resilient dispatch.
//!
//! Selection and dispatch are deliberately separate: [`RouteTable::select`]
//! is a pure function over configuration that can be tested without any
//! backend, and [`Dispatcher`] owns timeout, retry, and backoff for a call
//! against an already-selected profile.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatch;
pub mod selector;

pub use dispatch::{DispatchOutcome, Dispatcher};
pub use selector::{RouteDecision, RouteSource, RouteTable};
