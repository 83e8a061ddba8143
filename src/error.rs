//! Error types for the log anomaly detection engine.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for feature extraction, training, scoring and persistence
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input record (not a mapping, or a field that cannot be defaulted)
    #[error("Extraction error (record {index}, field '{field}'): {reason}")]
    Extraction {
        index: usize,
        field: String,
        reason: String,
    },

    /// Too few training samples, or every detector failed to fit
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Predict/score called before a successful training run
    #[error("Not trained: {0}")]
    NotTrained(String),

    /// Persisted model state is incompatible with the current schema
    #[error("Load error: {0}")]
    Load(String),

    /// Feature vector dimensionality differs from the trained layout
    #[error("Feature dimension mismatch in {stage}: expected {expected}, got {actual}")]
    DimensionMismatch {
        stage: String,
        expected: usize,
        actual: usize,
    },

    /// A single detector failed while fitting
    #[error("Model '{model}' failed: {reason}")]
    Model { model: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Verdict storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an extraction error for one record field
    pub fn extraction(index: usize, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Extraction {
            index,
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Build a model fitting error
    pub fn model(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Model {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error represents caller misuse or environment mismatch
    /// (propagated as-is rather than recovered locally)
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::NotTrained(_) | Error::InsufficientData(_) | Error::Load(_)
        )
    }
}
