#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
//! Shared HTTP DTOs for the Dosecast API.
//!
//! The server renders these and the CLI decodes them, so the JSON contract has
//! a single definition. Conversions from the prediction domain live here too.

use dosecast_predict::{ArtifactSet, PredictionOutcome, RunState, RunStatus};
use serde::{Deserialize, Serialize};

/// Problem type URIs shared by server and client.
pub mod problem {
    /// A prediction is already running.
    pub const PREDICTION_BUSY: &str = "https://dosecast.dev/problems/prediction-busy";
    /// The patient has no input data.
    pub const MISSING_INPUT: &str = "https://dosecast.dev/problems/missing-input";
    /// The external process failed, timed out or was cancelled.
    pub const PREDICTION_FAILED: &str = "https://dosecast.dev/problems/prediction-failed";
    /// Malformed or missing request parameters.
    pub const BAD_REQUEST: &str = "https://dosecast.dev/problems/bad-request";
    /// No artifacts exist for the patient.
    pub const NOT_FOUND: &str = "https://dosecast.dev/problems/not-found";
    /// Unexpected server failure.
    pub const INTERNAL: &str = "https://dosecast.dev/problems/internal";
}

/// RFC9457-compatible problem document surfaced on validation/runtime errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    /// URI reference identifying the problem type.
    pub kind: String,
    /// Short, human-readable summary of the issue.
    pub title: String,
    /// HTTP status code associated with the error.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Detailed diagnostic message when available.
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Parameters that failed validation, if applicable.
    pub invalid_params: Option<Vec<ProblemInvalidParam>>,
}

impl ProblemDetails {
    /// `true` when the problem reports a run already in progress.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.kind == problem::PREDICTION_BUSY
    }
}

/// Invalid parameter pointer surfaced alongside a [`ProblemDetails`] payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemInvalidParam {
    /// JSON Pointer to the offending field.
    pub pointer: String,
    /// Human-readable description of the validation failure.
    pub message: String,
}

/// Image URLs per category, each ordered by slice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactListing {
    /// CT slice URLs.
    #[serde(default)]
    pub ct: Vec<String>,
    /// Reference dose slice URLs.
    #[serde(default)]
    pub dose: Vec<String>,
    /// Predicted dose slice URLs.
    #[serde(default)]
    pub prediction: Vec<String>,
}

impl ArtifactListing {
    /// `true` when every category is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ct.is_empty() && self.dose.is_empty() && self.prediction.is_empty()
    }

    /// Length of the shortest non-empty category; zero when all are empty.
    #[must_use]
    pub fn slice_count(&self) -> usize {
        [&self.ct, &self.dose, &self.prediction]
            .into_iter()
            .map(Vec::len)
            .filter(|len| *len > 0)
            .min()
            .unwrap_or(0)
    }
}

impl From<&ArtifactSet> for ArtifactListing {
    fn from(set: &ArtifactSet) -> Self {
        let urls = |artifacts: &[dosecast_predict::Artifact]| {
            artifacts
                .iter()
                .map(|artifact| artifact.url.clone())
                .collect()
        };
        Self {
            ct: urls(&set.ct),
            dose: urls(&set.dose),
            prediction: urls(&set.prediction),
        }
    }
}

/// How a prediction request was satisfied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    /// The model ran and produced images.
    Success,
    /// Predicted images already existed; the model was not run.
    Exists,
}

impl From<RunStatus> for PredictionStatus {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Success => Self::Success,
            RunStatus::Exists => Self::Exists,
        }
    }
}

/// Body returned by the prediction endpoints on success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictionResponse {
    /// Whether the model ran.
    pub status: PredictionStatus,
    /// Human-readable summary.
    pub message: String,
    /// Patient the prediction belongs to.
    pub patient_id: String,
    /// Image URLs scanned after the run.
    pub artifacts: ArtifactListing,
    /// Time spent in the external process, in milliseconds.
    pub elapsed_ms: u64,
}

impl From<&PredictionOutcome> for PredictionResponse {
    fn from(outcome: &PredictionOutcome) -> Self {
        let message = match outcome.status {
            RunStatus::Success => "Prediction completed successfully",
            RunStatus::Exists => "Prediction already exists",
        };
        Self {
            status: outcome.status.into(),
            message: message.to_string(),
            patient_id: outcome.patient.to_string(),
            artifacts: ArtifactListing::from(&outcome.artifacts),
            elapsed_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Chat intents recognised by the classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Start a dose prediction.
    PredictDose,
    /// Explain what the assistant can do.
    Help,
}

/// Body accepted by `POST /api/classify`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifyRequest {
    /// Free-text message typed by the user.
    #[serde(default)]
    pub message: String,
    /// Patient currently in view, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
}

/// Body returned by `POST /api/classify`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifyResponse {
    /// Best-matching intent, absent below the match threshold.
    pub intent: Option<Intent>,
    /// Match score in `[0, 1]`; `0` when no intent matched.
    pub score: f64,
    /// Canned reply for intents that answer directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_response: Option<String>,
}

/// Whether the prediction slot is held.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStateKind {
    /// No prediction running.
    Idle,
    /// A prediction is running.
    Running,
}

impl From<RunState> for RunStateKind {
    fn from(state: RunState) -> Self {
        match state {
            RunState::Idle => Self::Idle,
            RunState::Running => Self::Running,
        }
    }
}

/// Body returned by `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Always `ok` while the server answers.
    pub status: String,
    /// Build identifier baked in at compile time.
    pub build_sha: String,
    /// Current state of the prediction slot.
    pub prediction: RunStateKind,
    /// Duration of the most recent run, in milliseconds.
    pub last_run_ms: i64,
    /// Requests rejected because a run was in progress.
    pub busy_rejections: u64,
}
