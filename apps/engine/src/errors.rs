use thiserror::Error;

use crate::llm_client::LlmError;

/// Engine-level error type returned across the workflow surface.
///
/// Validation failures are local and non-fatal: phase and artifact are left
/// unchanged and the condition is reported for user-facing display. Backend
/// failures abort only the in-flight operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cover letter generation failed: {0}")]
    Generation(#[source] LlmError),

    #[error("Chat exchange failed: {0}")]
    Backend(#[source] LlmError),

    #[error("A generation or chat exchange is already in flight")]
    Busy,

    #[error("Settings persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
