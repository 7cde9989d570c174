//! Error taxonomy shared by the gateway, the import pipeline, and the
//! HTTP layer.
//!
//! Functions return `anyhow::Result` and raise a [`FamilyError`] when the
//! caller needs to tell the failure kinds apart. The server downcasts the
//! `anyhow::Error` to pick a status code; anything that is not a
//! `FamilyError` is treated as a datastore failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FamilyError {
    /// A required field is missing or a value is not acceptable.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// The requested identifier does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The hosted completion API (or another upstream) failed.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Completion output was not valid JSON, even after fence stripping.
    /// `raw` is the untouched text for diagnosis.
    #[error("invalid JSON: {message}")]
    Parse { message: String, raw: String },

    /// Two representations of the same relationship disagree.
    #[error("data integrity: {0}")]
    Integrity(String),
}

impl FamilyError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        FamilyError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        FamilyError::NotFound(what.into())
    }
}
