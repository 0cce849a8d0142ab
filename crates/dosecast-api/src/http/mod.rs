//! HTTP surface modules (router, handlers, middleware).

/// Chat intent classification handler.
pub(crate) mod classify;
/// Shared constants and header names for HTTP surfaces.
pub(crate) mod constants;
/// Problem response helpers and error types.
pub(crate) mod errors;
/// Health and diagnostics endpoints.
pub(crate) mod health;
/// Prediction trigger and artifact listing handlers.
pub(crate) mod predictions;
/// Router construction and server host.
pub(crate) mod router;
/// Metrics middleware for HTTP requests.
pub(crate) mod telemetry;
