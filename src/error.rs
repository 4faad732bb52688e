//! Error taxonomy.
//!
//! Each concern owns its own enum; [`Error`] folds them together for the
//! controller, and [`Aborted`] records which run state a failure interrupted.
//! Conversion failures are recoverable inside the page-count oracle and only
//! surface here when wrapped into a [`MeasurementError`].

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::RunState;

/// Malformed or missing input. Raised before any render happens.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("input is not a valid request record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("unknown applicant type `{0}` (expected ORGANIZATION or INDIVIDUAL)")]
    UnknownApplicantType(String),
}

/// Template loading or rendering failed.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid template syntax in {template}: {message}")]
    Syntax { template: String, message: String },

    #[error("template {template} references unknown field `{field}`")]
    UnknownField { template: String, field: String },

    #[error("render context is missing required field `{field}`")]
    MissingField { field: String },

    #[error("template engine failed: {0}")]
    Engine(String),
}

/// The external conversion call failed. Always recoverable by the oracle.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("no conversion service configured")]
    NotConfigured,

    #[error("conversion timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("conversion transport failed: {0}")]
    Transport(String),

    #[error("conversion service answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("conversion output is not a readable PDF: {0}")]
    InvalidDocument(String),
}

/// Every page-count strategy failed.
#[derive(Debug, Error)]
#[error("every page-count strategy failed: {}", summarize(.failures))]
pub struct MeasurementError {
    pub failures: Vec<(crate::pagination::PageCountSource, String)>,
}

fn summarize(failures: &[(crate::pagination::PageCountSource, String)]) -> String {
    if failures.is_empty() {
        return "no strategies configured".to_string();
    }
    failures
        .iter()
        .map(|(source, reason)| format!("{source}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Measurement(#[from] MeasurementError),

    #[error("failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("failed to set up the generator: {0}")]
    Setup(String),

    #[error("more than one job writes {0}")]
    DuplicateOutput(PathBuf),
}

/// A reconciliation run that stopped before reaching `Persisted`.
#[derive(Debug, Error)]
#[error("run aborted in state {from}: {error}")]
pub struct Aborted {
    pub from: RunState,
    #[source]
    pub error: Error,
}
