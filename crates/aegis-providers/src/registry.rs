//! Backend registry and construction.
//!
//! The registry is built once at startup from configured profiles and is
//! immutable afterwards; request handling only ever reads it.

use crate::ollama::OllamaBackend;
use crate::openai::OpenAiBackend;
use aegis_core::{CompletionBackend, GatewayError, GatewayResult, ProviderProfile};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Known backend wire protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible `/chat/completions` API.
    OpenAi,
    /// Local Ollama daemon.
    Ollama,
}

impl FromStr for ProviderKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(GatewayError::config(format!(
                "unknown provider kind '{other}'"
            ))),
        }
    }
}

/// Build a backend for a profile.
///
/// The credential is resolved from the environment variable the profile
/// names. A missing variable is a startup error for `openai`-kind profiles
/// that declared one; profiles without `api_key_env` dispatch unauthenticated.
///
/// # Errors
/// Returns a configuration error for a declared-but-unset credential
/// variable, or an internal error if the HTTP client cannot be built.
pub fn build_backend(
    kind: ProviderKind,
    profile: &ProviderProfile,
) -> GatewayResult<Arc<dyn CompletionBackend>> {
    match kind {
        ProviderKind::OpenAi => {
            let api_key = profile
                .api_key_env
                .as_ref()
                .map(|var| {
                    std::env::var(var).map(SecretString::new).map_err(|_| {
                        GatewayError::config(format!(
                            "credential variable '{var}' for provider '{}' is not set",
                            profile.name
                        ))
                    })
                })
                .transpose()?;
            Ok(Arc::new(OpenAiBackend::new(
                &profile.name,
                &profile.endpoint,
                api_key,
                profile.timeout,
            )?))
        }
        ProviderKind::Ollama => Ok(Arc::new(OllamaBackend::new(
            &profile.name,
            &profile.endpoint,
            profile.timeout,
        )?)),
    }
}

/// Name-indexed set of constructed backends.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn CompletionBackend>>,
}

impl BackendRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own name. Re-registering a name
    /// replaces the previous backend.
    pub fn register(&mut self, backend: Arc<dyn CompletionBackend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    /// Look up a backend by profile name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn CompletionBackend>> {
        self.backends.get(name).cloned()
    }

    /// Registered backend names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    /// Number of registered backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
