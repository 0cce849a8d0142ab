//! RFC9457-style API error wrapper.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dosecast_api_models::{ProblemDetails, ProblemInvalidParam, problem};
use dosecast_predict::PredictionError;
use dosecast_telemetry::RequestContext;
use tracing::warn;

/// Structured API error with optional RFC9457 fields.
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) kind: &'static str,
    title: &'static str,
    detail: Option<String>,
    invalid_params: Option<Vec<ProblemInvalidParam>>,
}

impl ApiError {
    const fn new(status: StatusCode, kind: &'static str, title: &'static str) -> Self {
        Self {
            status,
            kind,
            title,
            detail: None,
            invalid_params: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub(crate) fn with_invalid_param(
        mut self,
        pointer: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.invalid_params
            .get_or_insert_with(Vec::new)
            .push(ProblemInvalidParam {
                pointer: pointer.into(),
                message: message.into(),
            });
        self
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            problem::INTERNAL,
            "internal server error",
        )
        .with_detail(message)
    }

    pub(crate) fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, problem::BAD_REQUEST, "bad request").with_detail(detail)
    }

    pub(crate) fn busy(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            problem::PREDICTION_BUSY,
            "prediction already in progress",
        )
        .with_detail(detail)
    }

    pub(crate) fn missing_input(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            problem::MISSING_INPUT,
            "patient input data missing",
        )
        .with_detail(detail)
    }

    pub(crate) fn prediction_failed(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            problem::PREDICTION_FAILED,
            "prediction failed",
        )
        .with_detail(detail)
    }

    pub(crate) fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, problem::NOT_FOUND, "resource not found")
            .with_detail(detail)
    }
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        let detail = err.detail();
        match err {
            PredictionError::Busy => Self::busy(detail),
            PredictionError::InvalidPatientKey { reason, .. } => {
                Self::bad_request(detail).with_invalid_param("/patient_id", reason)
            }
            PredictionError::MissingInput { .. } => Self::missing_input(detail),
            PredictionError::Spawn { .. }
            | PredictionError::ProcessFailed { .. }
            | PredictionError::TimedOut { .. }
            | PredictionError::Cancelled => Self::prediction_failed(detail),
            PredictionError::NoArtifacts { .. } => Self::not_found(detail),
            PredictionError::Io { .. } | PredictionError::Join { .. } => Self::internal(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            let context = RequestContext::current();
            warn!(
                request_id = context.as_ref().map_or("", RequestContext::request_id),
                route = context.as_ref().map_or("", RequestContext::route),
                status = self.status.as_u16(),
                problem = self.kind,
                detail = self.detail.as_deref().unwrap_or_default(),
                "request failed"
            );
        }
        let body = ProblemDetails {
            kind: self.kind.to_string(),
            title: self.title.to_string(),
            status: self.status.as_u16(),
            detail: self.detail,
            invalid_params: self.invalid_params,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn prediction_errors_map_to_documented_statuses() {
        let cases = [
            (PredictionError::Busy, StatusCode::BAD_REQUEST, problem::PREDICTION_BUSY),
            (
                PredictionError::MissingInput {
                    patient: "p".into(),
                    path: "/in/p".into(),
                },
                StatusCode::BAD_REQUEST,
                problem::MISSING_INPUT,
            ),
            (
                PredictionError::NoArtifacts { patient: "p".into() },
                StatusCode::NOT_FOUND,
                problem::NOT_FOUND,
            ),
            (
                PredictionError::TimedOut {
                    after: Duration::from_secs(1),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                problem::PREDICTION_FAILED,
            ),
            (
                PredictionError::Cancelled,
                StatusCode::INTERNAL_SERVER_ERROR,
                problem::PREDICTION_FAILED,
            ),
        ];
        for (err, status, kind) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status, status);
            assert_eq!(api.kind, kind);
        }
    }

    #[test]
    fn process_failure_detail_is_raw_stderr() {
        let api = ApiError::from(PredictionError::ProcessFailed {
            exit_code: Some(1),
            stderr: "ModuleNotFoundError: torch".into(),
        });
        assert_eq!(api.detail.as_deref(), Some("ModuleNotFoundError: torch"));
    }

    #[test]
    fn invalid_key_points_at_patient_id() {
        let api = ApiError::from(PredictionError::InvalidPatientKey {
            reason: "leading_dot",
            value: "..".into(),
        });
        let params = api.invalid_params.unwrap_or_default();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].pointer, "/patient_id");
        assert_eq!(params[0].message, "leading_dot");
    }
}
