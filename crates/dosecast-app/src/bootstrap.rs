use std::future::Future;
use std::sync::Arc;

use dosecast_api::{ApiServer, ApiState};
use dosecast_config::ServerConfig;
use dosecast_predict::{CommandRunner, PredictionRunner, PredictionService};
use dosecast_telemetry::{LogFormat, LoggingConfig, Metrics, ServiceSpan};
use tracing::{error, info};

use crate::error::{AppError, AppResult};

/// Dependencies required to bootstrap the Dosecast server.
pub(crate) struct BootstrapDependencies {
    config: ServerConfig,
    telemetry: Metrics,
    runner: Arc<dyn PredictionRunner>,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment for the binary entrypoint.
    pub(crate) fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Construct dependencies from an arbitrary variable source.
    pub(crate) fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = dosecast_config::load_from_lookup(lookup)
            .map_err(|err| AppError::config("config.load", err))?;
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self {
            config,
            telemetry,
            runner: Arc::new(CommandRunner),
        })
    }
}

/// Entry point for the Dosecast boot sequence.
///
/// # Errors
///
/// Returns an error if configuration is invalid, logging cannot be installed,
/// or the API server fails to bind or serve.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    run_app_with(dependencies).await
}

/// Boot sequence that relies entirely on injected dependencies.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    dosecast_telemetry::init_logging(&logging_config(&dependencies.config))
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _service_span = ServiceSpan::enter("dosecast");

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Dosecast server bootstrap starting"
    );

    serve_until(dependencies, shutdown_signal).await
}

/// Wire the prediction service into the API and serve until the future built
/// by `shutdown` resolves.
async fn serve_until<S, F>(dependencies: BootstrapDependencies, shutdown: S) -> AppResult<()>
where
    S: FnOnce(PredictionService) -> F,
    F: Future<Output = ()> + Send + 'static,
{
    let BootstrapDependencies {
        config,
        telemetry,
        runner,
    } = dependencies;

    let addr = config.socket_addr();
    info!(
        input_root = %config.layout.input_root.display(),
        output_root = %config.layout.output_root.display(),
        program = %config.prediction.program,
        timeout_secs = config.prediction.timeout.as_secs(),
        stderr_policy = config.prediction.stderr_policy.as_str(),
        "prediction service configured"
    );

    let service = PredictionService::new(
        config.layout,
        config.prediction,
        runner,
        telemetry.clone(),
    );
    let api = ApiServer::new(ApiState::new(service.clone(), telemetry));

    api.serve(addr, shutdown(service))
        .await
        .map_err(|err| AppError::api_server("api_server.serve", err))?;

    info!("Dosecast server stopped");
    Ok(())
}

fn logging_config(config: &ServerConfig) -> LoggingConfig {
    LoggingConfig::new(
        config.logging.level.as_str(),
        LogFormat::from_name(&config.logging.format),
    )
}

async fn shutdown_signal(service: PredictionService) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received; cancelling in-flight prediction");
    service.shutdown();
}
