use std::time::Duration;

use anyhow::anyhow;
use dosecast_api_models::{ArtifactListing, PredictionResponse};

use crate::cli::{OutputFormat, PatientArgs, PredictArgs};
use crate::client::{
    AppContext, CliError, CliResult, ProblemResponse, classify_problem, decode_json,
};
use crate::output::{render_listing, render_prediction};

pub(crate) async fn handle_predict(
    ctx: &AppContext,
    args: PredictArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let response = request_prediction(ctx, &args).await?;
    render_prediction(&response, format)
}

pub(crate) async fn handle_images(
    ctx: &AppContext,
    args: PatientArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let listing = fetch_images(ctx, &args.patient).await?;
    render_listing(&args.patient, &listing, format)
}

/// Trigger a prediction, retrying on `prediction-busy` when `--wait` is set.
pub(crate) async fn request_prediction(
    ctx: &AppContext,
    args: &PredictArgs,
) -> CliResult<PredictionResponse> {
    let mut url = ctx.endpoint(&["api", "prediction", &args.patient])?;
    if args.force {
        url.query_pairs_mut().append_pair("force", "true");
    }

    let mut attempt = 1;
    loop {
        let response = ctx
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| CliError::failure(anyhow!("request to {url} failed: {err}")))?;

        if response.status().is_success() {
            return decode_json(response, "prediction").await;
        }

        let problem = ProblemResponse::read(response).await;
        if args.wait && problem.is_busy() && attempt < args.max_attempts {
            eprintln!(
                "prediction already running (attempt {attempt}/{}); retrying in {}s",
                args.max_attempts, args.retry_secs
            );
            tokio::time::sleep(Duration::from_secs(args.retry_secs)).await;
            attempt += 1;
            continue;
        }
        return Err(problem.into_error());
    }
}

/// Fetch the artifact listing for `patient` without running the model.
pub(crate) async fn fetch_images(ctx: &AppContext, patient: &str) -> CliResult<ArtifactListing> {
    let url = ctx.endpoint(&["api", "images", patient])?;
    let response = ctx
        .client
        .get(url.clone())
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request to {url} failed: {err}")))?;

    if response.status().is_success() {
        decode_json(response, "image listing").await
    } else {
        Err(classify_problem(response).await)
    }
}
