//! Error types for this crate.
//!
//! All fallible operations return [`Result<T>`] which uses [`PipelineError`] as the error type.
//!
//! Errors fall into two phases. Construction errors ([`PipelineError::Config`],
//! [`PipelineError::ArtifactUnavailable`], [`PipelineError::ArtifactCorrupt`]) are fatal to
//! the pipeline being built. Per-call errors ([`PipelineError::InputValidation`],
//! [`PipelineError::Inference`], [`PipelineError::Postprocess`]) leave a ready pipeline
//! usable for the next call.

use thiserror::Error;

/// A [`Result`](std::result::Result) alias using [`PipelineError`] as the error type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// The unified error type for all crate errors.
///
/// # Example
///
/// ```rust,no_run
/// use sgnlp::error::PipelineError;
///
/// fn handle_error(e: PipelineError) {
///     match &e {
///         PipelineError::Config { field, .. } => {
///             // Fix the config document and rebuild
///             eprintln!("bad field `{field}`");
///         }
///         PipelineError::ArtifactUnavailable { .. } => {
///             // Network or path issue - retry with backoff
///         }
///         PipelineError::InputValidation(_) => {
///             // Bad input - fix and call `run` again
///         }
///         PipelineError::Postprocess(_) => {
///             // Internal error - report bug
///             eprintln!("Internal error: {e}");
///         }
///         _ => {
///             // Future error variants
///         }
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    /// Config document is missing a field or has a field of the wrong kind. Fix the config.
    #[error("invalid config field `{field}`: {reason}")]
    Config {
        /// Dotted path of the offending field, e.g. `hyperparameters.embed_dim`.
        field: String,
        /// What was expected and what was found.
        reason: String,
    },

    /// An artifact could not be located or fetched. Retry may help for hub artifacts.
    #[error("artifact `{artifact}` unavailable: {reason}")]
    ArtifactUnavailable {
        /// Artifact name as declared in the config.
        artifact: String,
        /// Underlying cause.
        reason: String,
    },

    /// An artifact failed integrity verification or does not match the declared shape.
    #[error("artifact `{artifact}` is corrupt: expected {expected}, found {actual}")]
    ArtifactCorrupt {
        /// Artifact name as declared in the config.
        artifact: String,
        /// Expected checksum, size or tensor layout.
        expected: String,
        /// What was actually found.
        actual: String,
    },

    /// Raw input rejected by the preprocessor. Fix the input and retry.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// Forward pass failed, usually a shape mismatch between batch and model.
    #[error("inference failed: {0}")]
    Inference(String),

    /// Raw output could not be decoded into a result.
    #[error("postprocessing failed: {0}")]
    Postprocess(String),

    /// `run` (or a later transition) was called before the pipeline reached the needed state.
    #[error("pipeline is not ready (state: {state})")]
    NotReady {
        /// The state the pipeline was in.
        state: String,
    },

    /// Device initialization failure. Fall back to CPU.
    #[error("{0}")]
    Device(String),

    /// Internal error. Report if seen.
    #[error("{0}")]
    Unexpected(String),
}

impl PipelineError {
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(artifact: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::ArtifactUnavailable {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn corrupt(
        artifact: impl Into<String>,
        expected: impl Into<String>,
        actual: impl ToString,
    ) -> Self {
        PipelineError::ArtifactCorrupt {
            artifact: artifact.into(),
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }

    /// True for errors raised while resolving config or loading artifacts.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            PipelineError::Config { .. }
                | PipelineError::ArtifactUnavailable { .. }
                | PipelineError::ArtifactCorrupt { .. }
                | PipelineError::Device(_)
        )
    }

    /// True for errors raised by a single `run` call; the pipeline stays ready.
    pub fn is_per_call(&self) -> bool {
        matches!(
            self,
            PipelineError::InputValidation(_)
                | PipelineError::Inference(_)
                | PipelineError::Postprocess(_)
        )
    }
}

impl From<hf_hub::api::sync::ApiError> for PipelineError {
    fn from(value: hf_hub::api::sync::ApiError) -> Self {
        PipelineError::ArtifactUnavailable {
            artifact: "<hub>".to_string(),
            reason: format!("HuggingFace API error: {value}"),
        }
    }
}

impl From<candle_core::Error> for PipelineError {
    fn from(value: candle_core::Error) -> Self {
        PipelineError::Inference(value.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(value: std::io::Error) -> Self {
        PipelineError::Unexpected(value.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(value: serde_json::Error) -> Self {
        PipelineError::Unexpected(value.to_string())
    }
}
