//! API-key authentication.
//!
//! Keys are configured as SHA-256 hex digests; the inbound key is hashed
//! and compared against the set. Raw key material never reaches the
//! context, the logs, or the audit trail.

use aegis_core::{GatewayError, GatewayResult};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// SHA-256 hex digest of an API key.
#[must_use]
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Validates inbound API keys against the configured digest set.
#[derive(Debug, Clone)]
pub struct Authenticator {
    hashes: HashSet<String>,
}

impl Authenticator {
    /// Build from configured digests. Digests are compared lowercased.
    #[must_use]
    pub fn new(hashes: impl IntoIterator<Item = String>) -> Self {
        Self {
            hashes: hashes.into_iter().map(|h| h.to_lowercase()).collect(),
        }
    }

    /// Authenticate a request.
    ///
    /// Returns the key's digest for the request context on success.
    ///
    /// # Errors
    /// An auth error for a missing or unknown key. The message never
    /// distinguishes the two beyond what the caller already knows.
    pub fn authenticate(&self, key: Option<&str>) -> GatewayResult<String> {
        let key = key.ok_or_else(|| GatewayError::auth("missing x-api-key header"))?;
        if key.is_empty() {
            return Err(GatewayError::auth("missing x-api-key header"));
        }
        let digest = hash_api_key(key);
        if self.hashes.contains(&digest) {
            Ok(digest)
        } else {
            Err(GatewayError::auth("invalid API key"))
        }
    }
}
