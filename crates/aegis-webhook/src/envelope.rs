//! Envelope construction and HMAC-SHA256 signing.

use aegis_core::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded signature.
pub const SIGNATURE_HEADER: &str = "X-Aegis-Signature";

/// Payload sent to the external validator.
///
/// Field order is fixed by this struct; the canonical bytes are its
/// serde_json serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Correlation id of the originating request.
    pub correlation_id: Uuid,
    /// The prompt under evaluation (post-masking).
    pub prompt: String,
    /// Client address as seen by the gateway.
    pub client_ip: String,
    /// SHA-256 hash of the caller's API key. Raw keys never leave the
    /// gateway.
    pub api_key_hash: String,
    /// When the originating request was received.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata (verdict summaries, provider decision).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// A sealed envelope: the exact wire bytes and their signature.
#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    /// Canonical JSON body bytes. Sent verbatim.
    pub body: Vec<u8>,
    /// Hex-encoded HMAC-SHA256 over `body`.
    pub signature: String,
    /// Correlation id, echoed for the audit trail.
    pub correlation_id: Uuid,
}

/// Signs payloads with a shared secret.
#[derive(Clone)]
pub struct EnvelopeSigner {
    secret: SecretString,
}

impl EnvelopeSigner {
    /// Create a signer over the shared secret.
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Serialize and sign a payload.
    ///
    /// # Errors
    /// Returns a webhook error if serialization fails.
    pub fn seal(&self, payload: &WebhookPayload) -> GatewayResult<WebhookEnvelope> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| GatewayError::webhook(format!("payload serialization failed: {e}")))?;
        let signature = self.sign_bytes(&body);
        Ok(WebhookEnvelope {
            body,
            signature,
            correlation_id: payload.correlation_id,
        })
    }

    /// Hex HMAC-SHA256 over arbitrary bytes.
    #[must_use]
    pub fn sign_bytes(&self, bytes: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(bytes);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for EnvelopeSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeSigner")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Receiver-side verification against the raw body bytes.
///
/// Comparison happens inside the HMAC implementation and is constant-time.
#[must_use]
pub fn verify_signature(secret: &SecretString, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac = match HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
