//! Error types for generation.

use thiserror::Error;

/// Errors that can abort a generation call.
///
/// Cache inconsistencies are deliberately not represented here: mismatched
/// cache tensors from the engine are logged as warnings and generation
/// proceeds without them.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The forward pass failed. Fatal; the auto-regressive state is not
    /// safely resumable mid-sequence, so there is no retry.
    #[error("engine invocation failed: {source}")]
    EngineInvocation {
        #[source]
        source: anyhow::Error,
    },

    /// Invalid generation parameters, surfaced before the loop starts.
    #[error("invalid generation config: {0}")]
    InvalidConfig(String),

    /// The streaming callback returned an error. The original error is
    /// carried as the source.
    #[error("streaming callback failed: {source}")]
    Callback {
        #[source]
        source: anyhow::Error,
    },

    /// Tokenizer encode/decode failed.
    #[error("tokenizer error: {source}")]
    Tokenizer {
        #[source]
        source: anyhow::Error,
    },
}

impl GenerationError {
    pub(crate) fn engine(source: anyhow::Error) -> Self {
        Self::EngineInvocation { source }
    }

    pub(crate) fn tokenizer(source: anyhow::Error) -> Self {
        Self::Tokenizer { source }
    }
}

/// Result type for generation operations.
pub type GenerationResult<T> = Result<T, GenerationError>;
