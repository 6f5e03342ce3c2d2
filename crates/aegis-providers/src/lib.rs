//! Backend integrations.
//!
//! Each integration implements [`aegis_core::CompletionBackend`] and
//! normalizes its wire format into a [`aegis_core::Completion`]. Backends
//! never own retry or timeout policy; the dispatcher does.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ollama;
pub mod openai;
pub mod registry;

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use registry::{build_backend, BackendRegistry, ProviderKind};
