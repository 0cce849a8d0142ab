//! Prometheus registry for HTTP traffic and prediction runs.
//!
//! # Design
//! - One registry per [`Metrics`] value; clones share it.
//! - Collector names are the public contract scraped from `/metrics`.

use std::sync::Arc;
use std::time::Duration;

use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Buckets (seconds) sized for model runs that take from seconds to many minutes.
const RUN_SECONDS_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0];

/// Shared metrics handle.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<Collectors>,
}

struct Collectors {
    registry: Registry,
    http_requests: IntCounterVec,
    prediction_runs: IntCounterVec,
    busy_rejections: IntCounter,
    running: IntGauge,
    last_duration_ms: IntGauge,
    run_seconds: Histogram,
}

/// Values surfaced by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// `1` while an external prediction process is running, otherwise `0`.
    pub prediction_running: i64,
    /// Duration of the most recent run in milliseconds.
    pub prediction_last_duration_ms: i64,
    /// Requests rejected because a run was already in progress.
    pub prediction_busy_rejections_total: u64,
}

impl Metrics {
    /// Build the registry with every collector registered.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Collector`] if a collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let inner = Collectors {
            http_requests: registered(
                &registry,
                "http_requests_total",
                IntCounterVec::new(
                    Opts::new("http_requests_total", "HTTP requests by matched route and status"),
                    &["route", "code"],
                ),
            )?,
            prediction_runs: registered(
                &registry,
                "prediction_runs_total",
                IntCounterVec::new(
                    Opts::new(
                        "prediction_runs_total",
                        "Prediction requests that held the run slot, by outcome",
                    ),
                    &["outcome"],
                ),
            )?,
            busy_rejections: registered(
                &registry,
                "prediction_busy_rejections_total",
                IntCounter::new(
                    "prediction_busy_rejections_total",
                    "Prediction requests rejected because a run was in progress",
                ),
            )?,
            running: registered(
                &registry,
                "prediction_running",
                IntGauge::new(
                    "prediction_running",
                    "1 while an external prediction process is running",
                ),
            )?,
            last_duration_ms: registered(
                &registry,
                "prediction_last_duration_ms",
                IntGauge::new(
                    "prediction_last_duration_ms",
                    "Duration of the most recent prediction process (ms)",
                ),
            )?,
            run_seconds: registered(
                &registry,
                "prediction_duration_seconds",
                Histogram::with_opts(
                    HistogramOpts::new(
                        "prediction_duration_seconds",
                        "Distribution of prediction process durations",
                    )
                    .buckets(RUN_SECONDS_BUCKETS.to_vec()),
                ),
            )?,
            registry,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Count one served request.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        let code = status.to_string();
        self.inner
            .http_requests
            .with_label_values(&[route, code.as_str()])
            .inc();
    }

    /// Count a run that held the slot, labelled by outcome.
    pub fn inc_prediction_run(&self, outcome: &str) {
        self.inner
            .prediction_runs
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count a request turned away by the single-flight guard.
    pub fn inc_prediction_busy(&self) {
        self.inner.busy_rejections.inc();
    }

    /// Set the running gauge.
    pub fn set_prediction_running(&self, running: bool) {
        self.inner.running.set(i64::from(running));
    }

    /// Record how long the last external process took.
    pub fn observe_prediction_duration(&self, duration: Duration) {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.inner.last_duration_ms.set(millis);
        self.inner.run_seconds.observe(duration.as_secs_f64());
    }

    /// Encode every collector in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or yields non-UTF-8 bytes.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(|source| TelemetryError::Render { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::RenderUtf8 { source })
    }

    /// Current values for health reporting.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            prediction_running: self.inner.running.get(),
            prediction_last_duration_ms: self.inner.last_duration_ms.get(),
            prediction_busy_rejections_total: self.inner.busy_rejections.get(),
        }
    }
}

fn registered<C>(
    registry: &Registry,
    name: &'static str,
    built: prometheus::Result<C>,
) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    let collector = built.map_err(|source| TelemetryError::Collector {
        name,
        stage: "build",
        source,
    })?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::Collector {
            name,
            stage: "register",
            source,
        })?;
    Ok(collector)
}
