use std::sync::Arc;

use axum::{Json, extract::State};
use dosecast_api_models::{ClassifyRequest, ClassifyResponse};
use tracing::debug;

use crate::http::errors::ApiError;
use crate::intent::MAX_MESSAGE_CHARS;
use crate::state::ApiState;

pub(crate) async fn classify(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let length = request.message.chars().count();
    if length > MAX_MESSAGE_CHARS {
        return Err(ApiError::bad_request(format!(
            "message is {length} characters; the limit is {MAX_MESSAGE_CHARS}"
        ))
        .with_invalid_param("/message", "message too long"));
    }

    let response = state
        .classifier
        .respond(&request.message, request.patient_id.as_deref());
    debug!(intent = ?response.intent, score = response.score, "message classified");
    Ok(Json(response))
}
