//! # Design
//!
//! - Constant-message errors for the prediction pipeline.
//! - Context (paths, exit codes, captured stderr) lives in fields, never in the message.
//! - `detail()` exposes the raw text callers surface to clients.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for prediction operations.
pub type PredictionResult<T> = Result<T, PredictionError>;

/// Errors produced while guarding, running, or scanning a prediction.
#[derive(Debug, Error)]
pub enum PredictionError {
    /// Another prediction already holds the run slot.
    #[error("prediction already in progress")]
    Busy,
    /// Patient identifier failed validation.
    #[error("invalid patient identifier")]
    InvalidPatientKey {
        /// Static reason for the rejection.
        reason: &'static str,
        /// Offending identifier.
        value: String,
    },
    /// The patient has no input data to predict from.
    #[error("patient input data missing")]
    MissingInput {
        /// Patient the request targeted.
        patient: String,
        /// Directory that was expected to hold input files.
        path: PathBuf,
    },
    /// The external process could not be started.
    #[error("failed to spawn prediction process")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The external process reported failure.
    #[error("prediction process failed")]
    ProcessFailed {
        /// Exit code, absent when the process was terminated by a signal.
        exit_code: Option<i32>,
        /// Raw diagnostic text captured from the process.
        stderr: String,
    },
    /// The external process exceeded its time budget and was killed.
    #[error("prediction process timed out")]
    TimedOut {
        /// Budget that elapsed.
        after: Duration,
    },
    /// The run was cancelled during shutdown and the process was killed.
    #[error("prediction process cancelled")]
    Cancelled,
    /// No artifacts exist for the patient.
    #[error("no prediction artifacts found")]
    NoArtifacts {
        /// Patient whose output directory was scanned.
        patient: String,
    },
    /// Filesystem failures while inspecting inputs or outputs.
    #[error("prediction io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A blocking task panicked or was aborted.
    #[error("prediction task join failure")]
    Join {
        /// Operation that was running on the blocking pool.
        operation: &'static str,
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
}

impl PredictionError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Human-readable detail suitable for a problem document.
    ///
    /// Process failures return the captured stderr verbatim so operators see
    /// exactly what the model printed.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Busy => "a prediction is already running; retry once it completes".to_string(),
            Self::InvalidPatientKey { reason, value } => {
                format!("patient identifier {value:?} rejected: {reason}")
            }
            Self::MissingInput { patient, .. } => {
                format!("no input data found for patient {patient}")
            }
            Self::Spawn { program, source } => format!("failed to start {program}: {source}"),
            Self::ProcessFailed { stderr, .. } => stderr.clone(),
            Self::TimedOut { after } => {
                format!("prediction process killed after {}s", after.as_secs())
            }
            Self::Cancelled => "prediction process cancelled by server shutdown".to_string(),
            Self::NoArtifacts { patient } => format!("no images found for patient {patient}"),
            Self::Io {
                operation, source, ..
            } => format!("{operation}: {source}"),
            Self::Join { operation, source } => format!("{operation}: {source}"),
        }
    }

    /// Outcome label recorded in `prediction_runs_total`.
    #[must_use]
    pub const fn outcome_label(&self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::InvalidPatientKey { .. } => "invalid",
            Self::MissingInput { .. } => "missing_input",
            Self::Spawn { .. } | Self::ProcessFailed { .. } => "failed",
            Self::TimedOut { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::NoArtifacts { .. } => "no_artifacts",
            Self::Io { .. } | Self::Join { .. } => "error",
        }
    }
}
