//! Shared handler state.

use dosecast_predict::PredictionService;
use dosecast_telemetry::Metrics;

use crate::intent::IntentClassifier;

/// Dependencies every handler can reach through `State<Arc<ApiState>>`.
pub struct ApiState {
    pub(crate) prediction: PredictionService,
    pub(crate) telemetry: Metrics,
    pub(crate) classifier: IntentClassifier,
}

impl ApiState {
    /// Bundle the prediction service and metrics handle.
    #[must_use]
    pub fn new(prediction: PredictionService, telemetry: Metrics) -> Self {
        Self {
            prediction,
            telemetry,
            classifier: IntentClassifier::default(),
        }
    }
}
