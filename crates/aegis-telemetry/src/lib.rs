//! Logging setup and the audit trail.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod tracing_setup;

pub use audit::{mask_api_key, prompt_preview, AuditRecord, StageTimer, StageTiming};
pub use tracing_setup::{init_logging, LoggingSetupError};
