//! Prediction trigger and artifact listing handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use dosecast_api_models::{ArtifactListing, PredictionResponse};
use dosecast_predict::PatientKey;
use serde::Deserialize;
use tracing::info;

use crate::http::errors::ApiError;
use crate::state::ApiState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PredictionQuery {
    #[serde(default)]
    patient_id: Option<String>,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ForceQuery {
    #[serde(default)]
    force: bool,
}

/// `GET /api/prediction?patient_id=<id>[&force=true]`
pub(crate) async fn predict_by_query(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PredictionQuery>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let patient_id = query
        .patient_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            ApiError::bad_request("Missing patient ID")
                .with_invalid_param("/patient_id", "required")
        })?;
    run_prediction(&state, &patient_id, query.force).await
}

/// `GET /api/prediction/{patient_id}[?force=true]`
pub(crate) async fn predict_by_path(
    State(state): State<Arc<ApiState>>,
    Path(patient_id): Path<String>,
    Query(query): Query<ForceQuery>,
) -> Result<Json<PredictionResponse>, ApiError> {
    run_prediction(&state, &patient_id, query.force).await
}

async fn run_prediction(
    state: &ApiState,
    patient_id: &str,
    force: bool,
) -> Result<Json<PredictionResponse>, ApiError> {
    let patient = PatientKey::parse(patient_id)?;
    let outcome = state.prediction.predict(&patient, force).await?;
    info!(
        patient = %patient,
        status = outcome.status.as_str(),
        images = outcome.artifacts.len(),
        "prediction request served"
    );
    Ok(Json(PredictionResponse::from(&outcome)))
}

/// `GET /api/images/{patient_id}`: scan only, never runs the model.
pub(crate) async fn list_images(
    State(state): State<Arc<ApiState>>,
    Path(patient_id): Path<String>,
) -> Result<Json<ArtifactListing>, ApiError> {
    let patient = PatientKey::parse(&patient_id)?;
    let artifacts = state.prediction.artifacts(&patient).await?;
    Ok(Json(ArtifactListing::from(&artifacts)))
}
