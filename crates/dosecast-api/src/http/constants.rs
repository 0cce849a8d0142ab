//! Route paths and header names shared by the router and middleware.

pub(crate) use dosecast_telemetry::REQUEST_ID_HEADER as HEADER_REQUEST_ID;

pub(crate) const ROUTE_HEALTH: &str = "/health";
pub(crate) const ROUTE_METRICS: &str = "/metrics";
pub(crate) const ROUTE_PREDICTION: &str = "/api/prediction";
pub(crate) const ROUTE_PREDICTION_BY_PATIENT: &str = "/api/prediction/{patient_id}";
pub(crate) const ROUTE_IMAGES: &str = "/api/images/{patient_id}";
pub(crate) const ROUTE_CLASSIFY: &str = "/api/classify";
