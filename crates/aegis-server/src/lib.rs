//! HTTP surface and request orchestration.
//!
//! The server crate owns everything between the socket and the pipeline
//! crates: authentication, request validation, the response cache, the
//! per-request state machine, and the axum router.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cache;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use auth::{hash_api_key, Authenticator};
pub use cache::{cache_key, CachedCompletion, ResponseCache};
pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
