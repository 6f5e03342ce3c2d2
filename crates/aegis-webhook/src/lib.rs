//! Signed webhook envelopes and the external validator notifier.
//!
//! Outbound payloads are serialized once; the HMAC-SHA256 signature covers
//! the exact bytes put on the wire, so receivers verify against the raw
//! body before any JSON parsing.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod notifier;

pub use envelope::{verify_signature, EnvelopeSigner, WebhookEnvelope, WebhookPayload, SIGNATURE_HEADER};
pub use notifier::{NotifierMode, WebhookDecision, WebhookNotifier, WebhookOutcome};
