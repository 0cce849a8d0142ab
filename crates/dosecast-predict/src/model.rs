//! Domain types shared by the guard, runner, scanner and service.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use crate::error::{PredictionError, PredictionResult};

const MAX_PATIENT_KEY_LEN: usize = 128;

/// Validated patient identifier.
///
/// Only ASCII alphanumerics plus `-`, `_` and `.` are accepted and the key may
/// not start with `.`, so it can never escape the input or output roots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatientKey(String);

impl PatientKey {
    /// Validate and wrap a raw identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PredictionError::InvalidPatientKey`] when the identifier is
    /// empty, too long, starts with `.`, or contains other characters.
    pub fn parse(raw: &str) -> PredictionResult<Self> {
        let reject = |reason| PredictionError::InvalidPatientKey {
            reason,
            value: raw.to_string(),
        };
        if raw.is_empty() {
            return Err(reject("empty"));
        }
        if raw.len() > MAX_PATIENT_KEY_LEN {
            return Err(reject("too_long"));
        }
        if raw.starts_with('.') {
            return Err(reject("leading_dot"));
        }
        if !raw
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        {
            return Err(reject("invalid_characters"));
        }
        Ok(Self(raw.to_string()))
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PatientKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Image category produced by the prediction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactCategory {
    /// CT input slices.
    Ct,
    /// Reference dose slices.
    Dose,
    /// Predicted dose slices.
    Prediction,
}

impl ArtifactCategory {
    /// All categories in presentation order.
    pub const ALL: [Self; 3] = [Self::Ct, Self::Dose, Self::Prediction];

    /// Directory name of the category under a patient's output directory.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ct => "ct",
            Self::Dose => "dose",
            Self::Prediction => "prediction",
        }
    }
}

impl Display for ArtifactCategory {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One image file discovered in an output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Category directory the file was found in.
    pub category: ArtifactCategory,
    /// File name, including extension.
    pub file_name: String,
    /// Slice number parsed from the file stem, if any.
    pub slice: Option<u64>,
    /// Public URL the file is served from.
    pub url: String,
}

/// Ordered artifacts for every category of one patient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    /// CT slices.
    pub ct: Vec<Artifact>,
    /// Reference dose slices.
    pub dose: Vec<Artifact>,
    /// Predicted dose slices.
    pub prediction: Vec<Artifact>,
}

impl ArtifactSet {
    /// Artifacts of one category.
    #[must_use]
    pub fn category(&self, category: ArtifactCategory) -> &[Artifact] {
        match category {
            ArtifactCategory::Ct => &self.ct,
            ArtifactCategory::Dose => &self.dose,
            ArtifactCategory::Prediction => &self.prediction,
        }
    }

    pub(crate) fn category_mut(&mut self, category: ArtifactCategory) -> &mut Vec<Artifact> {
        match category {
            ArtifactCategory::Ct => &mut self.ct,
            ArtifactCategory::Dose => &mut self.dose,
            ArtifactCategory::Prediction => &mut self.prediction,
        }
    }

    /// `true` when no category holds any artifact.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        ArtifactCategory::ALL
            .iter()
            .all(|category| self.category(*category).is_empty())
    }

    /// Total artifact count across categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ct.len() + self.dose.len() + self.prediction.len()
    }
}

/// Whether the process-wide run slot is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No prediction is running.
    Idle,
    /// A prediction holds the run slot.
    Running,
}

impl RunState {
    /// Lowercase label used in health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
        }
    }
}

/// How a successful prediction request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The external process ran and produced artifacts.
    Success,
    /// Predicted images already existed, so the process was skipped.
    Exists,
}

impl RunStatus {
    /// Lowercase label used on the wire and in metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Exists => "exists",
        }
    }
}

/// Result of a prediction request that completed without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionOutcome {
    /// Patient the run targeted.
    pub patient: PatientKey,
    /// Whether the process ran or was skipped.
    pub status: RunStatus,
    /// Artifacts scanned after the run.
    pub artifacts: ArtifactSet,
    /// Time spent in the external process; zero when skipped.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection(raw: &str) -> Option<&'static str> {
        match PatientKey::parse(raw) {
            Err(PredictionError::InvalidPatientKey { reason, .. }) => Some(reason),
            _ => None,
        }
    }

    #[test]
    fn patient_keys_accept_typical_identifiers() -> PredictionResult<()> {
        for raw in ["pt_201", "HN-CHUM-001", "case.7", "A"] {
            assert_eq!(PatientKey::parse(raw)?.as_str(), raw);
        }
        Ok(())
    }

    #[test]
    fn patient_keys_reject_traversal_and_junk() {
        assert_eq!(rejection(""), Some("empty"));
        assert_eq!(rejection(".hidden"), Some("leading_dot"));
        assert_eq!(rejection(".."), Some("leading_dot"));
        assert_eq!(rejection("../etc"), Some("leading_dot"));
        assert_eq!(rejection("a/b"), Some("invalid_characters"));
        assert_eq!(rejection("pt 1"), Some("invalid_characters"));
        assert_eq!(rejection(&"x".repeat(129)), Some("too_long"));
    }

    #[test]
    fn empty_set_reports_empty() {
        let set = ArtifactSet::default();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert!(set.category(ArtifactCategory::Dose).is_empty());
    }

    #[test]
    fn category_order_is_ct_dose_prediction() {
        let names: Vec<_> = ArtifactCategory::ALL
            .iter()
            .map(|category| category.as_str())
            .collect();
        assert_eq!(names, ["ct", "dose", "prediction"]);
    }
}
