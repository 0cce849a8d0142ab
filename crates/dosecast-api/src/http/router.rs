//! Router construction and server host for the API.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderName, Method, Request, header::CONTENT_TYPE},
    routing::{get, post},
};
use dosecast_predict::PUBLIC_PREFIX;
use dosecast_telemetry::build_sha;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{Span, info};

use crate::error::{ApiServerError, ApiServerResult};
use crate::http::classify::classify;
use crate::http::constants::{
    HEADER_REQUEST_ID, ROUTE_CLASSIFY, ROUTE_HEALTH, ROUTE_IMAGES, ROUTE_METRICS,
    ROUTE_PREDICTION, ROUTE_PREDICTION_BY_PATIENT,
};
use crate::http::health::{health, metrics};
use crate::http::predictions::{list_images, predict_by_path, predict_by_query};
use crate::http::telemetry::HttpMetricsLayer;
use crate::state::ApiState;

/// Axum router wrapper that hosts the Dosecast API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Build the router over shared state.
    ///
    /// Prediction artifacts under the layout's output root are served read-only
    /// at `/predictions`.
    #[must_use]
    pub fn new(state: ApiState) -> Self {
        let static_root = state.prediction.layout().static_root().to_path_buf();
        let telemetry = state.telemetry.clone();
        let state = Arc::new(state);

        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE, HeaderName::from_static(HEADER_REQUEST_ID)]);
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(HEADER_REQUEST_ID)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    request_id = %request_id,
                    build_sha = %build_sha(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_request(|_request: &Request<_>, _span: &Span| {})
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                },
            );
        let layered = ServiceBuilder::new()
            .layer(dosecast_telemetry::set_request_id_layer())
            .layer(dosecast_telemetry::propagate_request_id_layer())
            .layer(trace_layer)
            .layer(HttpMetricsLayer::new(telemetry));

        let router = Self::routes()
            .nest_service(PUBLIC_PREFIX, ServeDir::new(static_root))
            .layer(cors_layer)
            .route_layer(layered)
            .with_state(state);

        Self { router }
    }

    fn routes() -> Router<Arc<ApiState>> {
        Router::new()
            .route(ROUTE_HEALTH, get(health))
            .route(ROUTE_METRICS, get(metrics))
            .route(ROUTE_PREDICTION, get(predict_by_query))
            .route(ROUTE_PREDICTION_BY_PATIENT, get(predict_by_path))
            .route(ROUTE_IMAGES, get(list_images))
            .route(ROUTE_CLASSIFY, post(classify))
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server terminates unexpectedly.
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> ApiServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        info!(%addr, "starting api");
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|source| ApiServerError::Serve { source })
    }

    #[cfg(test)]
    pub(crate) fn router(&self) -> Router {
        self.router.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::StatusCode;
    use dosecast_api_models::{
        ArtifactListing, ClassifyResponse, HealthResponse, Intent, PredictionResponse,
        PredictionStatus, ProblemDetails, RunStateKind, problem,
    };
    use dosecast_config::{ArtifactLayout, PredictionPolicy};
    use dosecast_predict::{
        Invocation, PredictionError, PredictionResult, PredictionRunner, PredictionService,
        ProcessReport,
    };
    use dosecast_telemetry::Metrics;
    use serde::de::DeserializeOwned;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    /// Writes three slices per category, optionally waiting on `gate` first.
    struct SliceWriter {
        gate: Option<Arc<Notify>>,
        stderr: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PredictionRunner for SliceWriter {
        async fn run(
            &self,
            invocation: &Invocation,
            _cancel: &CancellationToken,
        ) -> PredictionResult<ProcessReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(stderr) = self.stderr {
                return Ok(ProcessReport {
                    exit_code: Some(1),
                    success: false,
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                    elapsed: Duration::ZERO,
                });
            }
            write_slices(&invocation.output_dir)
                .map_err(|err| PredictionError::Io {
                    operation: "test.write",
                    path: invocation.output_dir.clone(),
                    source: err,
                })?;
            Ok(ProcessReport {
                exit_code: Some(0),
                success: true,
                stdout: String::new(),
                stderr: String::new(),
                elapsed: Duration::from_millis(3),
            })
        }
    }

    fn write_slices(output_dir: &Path) -> std::io::Result<()> {
        for category in ["ct", "dose", "prediction"] {
            let dir = output_dir.join(category);
            fs::create_dir_all(&dir)?;
            for slice in 1..=3 {
                fs::write(dir.join(format!("{category}_slice_{slice:03}.png")), b"png")?;
            }
        }
        Ok(())
    }

    struct Harness {
        _root: TempDir,
        server: ApiServer,
        runner: Arc<SliceWriter>,
    }

    fn harness(gate: Option<Arc<Notify>>, stderr: Option<&'static str>) -> Result<Harness> {
        let root = tempfile::tempdir()?;
        let layout = ArtifactLayout {
            input_root: root.path().join("patients"),
            output_root: root.path().join("predictions"),
            public_base_url: "http://localhost:5000".to_string(),
            image_extension: "png".to_string(),
        };
        let input = layout.input_dir("pt1");
        fs::create_dir_all(&input)?;
        fs::write(input.join("ct.npy"), b"volume")?;

        let metrics = Metrics::new()?;
        let runner = Arc::new(SliceWriter {
            gate,
            stderr,
            calls: AtomicUsize::new(0),
        });
        let service = PredictionService::new(
            layout,
            PredictionPolicy::default(),
            Arc::clone(&runner) as Arc<dyn PredictionRunner>,
            metrics.clone(),
        );
        let server = ApiServer::new(ApiState::new(service, metrics));
        Ok(Harness {
            _root: root,
            server,
            runner,
        })
    }

    async fn send(router: Router, request: Request<Body>) -> Result<(StatusCode, Vec<u8>)> {
        let response = router.oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, bytes.to_vec()))
    }

    async fn get_json<T: DeserializeOwned>(router: Router, uri: &str) -> Result<(StatusCode, T)> {
        let (status, body) = send(router, Request::get(uri).body(Body::empty())?).await?;
        Ok((status, serde_json::from_slice(&body)?))
    }

    #[tokio::test]
    async fn prediction_runs_and_returns_sorted_urls() -> Result<()> {
        let harness = harness(None, None)?;
        let (status, body): (_, PredictionResponse) =
            get_json(harness.server.router(), "/api/prediction?patient_id=pt1").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, PredictionStatus::Success);
        assert_eq!(body.artifacts.ct.len(), 3);
        assert_eq!(
            body.artifacts.prediction[0],
            "http://localhost:5000/predictions/pt1-images/prediction/prediction_slice_001.png"
        );

        let (status, again): (_, PredictionResponse) =
            get_json(harness.server.router(), "/api/prediction/pt1").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again.status, PredictionStatus::Exists);
        assert_eq!(harness.runner.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn busy_request_gets_400_with_busy_problem() -> Result<()> {
        let gate = Arc::new(Notify::new());
        let harness = harness(Some(Arc::clone(&gate)), None)?;

        let in_flight = tokio::spawn(get_json::<PredictionResponse>(
            harness.server.router(),
            "/api/prediction?patient_id=pt1",
        ));
        while harness.runner.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let (status, doc): (_, ProblemDetails) =
            get_json(harness.server.router(), "/api/prediction?patient_id=pt1").await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(doc.is_busy());

        let (_, health): (_, HealthResponse) =
            get_json(harness.server.router(), "/health").await?;
        assert_eq!(health.prediction, RunStateKind::Running);
        assert_eq!(health.busy_rejections, 1);

        gate.notify_one();
        let (status, _) = in_flight.await??;
        assert_eq!(status, StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn missing_and_invalid_patient_ids_are_bad_requests() -> Result<()> {
        let harness = harness(None, None)?;
        for uri in [
            "/api/prediction",
            "/api/prediction?patient_id=",
            "/api/prediction?patient_id=..%2Fetc",
            "/api/prediction/.hidden",
        ] {
            let (status, doc): (_, ProblemDetails) =
                get_json(harness.server.router(), uri).await?;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(doc.kind, problem::BAD_REQUEST, "{uri}");
        }

        let (status, doc): (_, ProblemDetails) =
            get_json(harness.server.router(), "/api/prediction?patient_id=ghost").await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(doc.kind, problem::MISSING_INPUT);
        assert_eq!(harness.runner.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn process_failure_is_500_with_raw_stderr() -> Result<()> {
        let harness = harness(None, Some("RuntimeError: checkpoint not found"))?;
        let (status, doc): (_, ProblemDetails) =
            get_json(harness.server.router(), "/api/prediction/pt1").await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(doc.kind, problem::PREDICTION_FAILED);
        assert_eq!(
            doc.detail.as_deref(),
            Some("RuntimeError: checkpoint not found")
        );
        Ok(())
    }

    #[tokio::test]
    async fn images_endpoint_scans_without_running() -> Result<()> {
        let harness = harness(None, None)?;
        let (status, _): (_, ProblemDetails) =
            get_json(harness.server.router(), "/api/images/pt1").await?;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, _): (_, PredictionResponse) =
            get_json(harness.server.router(), "/api/prediction/pt1").await?;
        let (status, listing): (_, ArtifactListing) =
            get_json(harness.server.router(), "/api/images/pt1").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing.slice_count(), 3);
        assert_eq!(harness.runner.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn artifacts_are_served_statically() -> Result<()> {
        let harness = harness(None, None)?;
        let (_, _): (_, PredictionResponse) =
            get_json(harness.server.router(), "/api/prediction/pt1").await?;
        let (status, body) = send(
            harness.server.router(),
            Request::get("/predictions/pt1-images/ct/ct_slice_002.png").body(Body::empty())?,
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"png");
        Ok(())
    }

    #[tokio::test]
    async fn classify_endpoint_reports_intent() -> Result<()> {
        let harness = harness(None, None)?;
        let request = Request::post("/api/classify")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"message":"please start prediction","patient_id":"pt1"}"#))?;
        let (status, body) = send(harness.server.router(), request).await?;
        assert_eq!(status, StatusCode::OK);
        let response: ClassifyResponse = serde_json::from_slice(&body)?;
        assert_eq!(response.intent, Some(Intent::PredictDose));
        assert!(response.score >= 0.7);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_classify_message_is_rejected() -> Result<()> {
        let harness = harness(None, None)?;
        let message = "a".repeat(crate::intent::MAX_MESSAGE_CHARS + 1);
        let request = Request::post("/api/classify")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(
                &serde_json::json!({ "message": message, "patient_id": "pt1" }),
            )?))?;
        let (status, body) = send(harness.server.router(), request).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let doc: ProblemDetails = serde_json::from_slice(&body)?;
        assert_eq!(doc.kind, problem::BAD_REQUEST);
        let params = doc.invalid_params.unwrap_or_default();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].pointer, "/message");
        Ok(())
    }

    #[tokio::test]
    async fn responses_carry_request_id_and_metrics_count_routes() -> Result<()> {
        let harness = harness(None, None)?;
        let response = harness
            .server
            .router()
            .oneshot(Request::get("/health").body(Body::empty())?)
            .await?;
        assert!(response.headers().contains_key(HEADER_REQUEST_ID));

        let (status, body) = send(
            harness.server.router(),
            Request::get("/metrics").body(Body::empty())?,
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body)?;
        assert!(text.contains("http_requests_total{code=\"200\",route=\"/health\"} 1"));
        Ok(())
    }
}
