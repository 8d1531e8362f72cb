//! Tracing and log-safety helpers shared by the workspace.

/// Tracing configuration (filters, output format).
pub mod tracing;

/// Rendering secrets so they are safe to log or echo back.
pub mod redact;

pub use redact::token_preview;
pub use tracing::{LogFormat, init};
