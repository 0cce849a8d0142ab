//! Error types for telemetry operations.

use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised while installing logging or maintaining the metrics registry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber was already installed, or installing one failed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// A collector could not be constructed or added to the registry.
    #[error("failed to set up metric collector")]
    Collector {
        /// Metric name tied to the failure.
        name: &'static str,
        /// `build` or `register`.
        stage: &'static str,
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// The registry could not be encoded in the text exposition format.
    #[error("failed to render metrics")]
    Render {
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// The encoder produced bytes that are not UTF-8.
    #[error("rendered metrics were not valid utf-8")]
    RenderUtf8 {
        /// Underlying conversion error.
        source: std::string::FromUtf8Error,
    },
}
