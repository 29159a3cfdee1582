//! Error types for the lookup orchestrator
//!
//! Only control-level failures live here. A data source that times out or
//! does not know the subject is recorded as data in the fact store instead.

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Synthesis error: {0}")]
    SynthesisError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Source not registered: {0}")]
    SourceNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// True for failures caused by the caller's input rather than by the system
    pub fn is_client_error(&self) -> bool {
        matches!(self, OrchestrationError::MalformedRequest(_))
    }

    /// True when the result-formatting backend failed or misbehaved
    pub fn is_synthesis_failure(&self) -> bool {
        matches!(
            self,
            OrchestrationError::SynthesisError(_) | OrchestrationError::LlmError(_)
        )
    }
}
