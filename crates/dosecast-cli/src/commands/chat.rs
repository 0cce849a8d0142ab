use anyhow::anyhow;
use dosecast_api_models::{ClassifyRequest, ClassifyResponse, Intent};

use crate::cli::{ChatArgs, OutputFormat, PredictArgs};
use crate::client::{AppContext, CliError, CliResult, classify_problem, decode_json};
use crate::commands::predict::request_prediction;
use crate::output::{render_classification, render_prediction};

/// Minimum score, exclusive, at which a prediction intent starts a run.
const PREDICT_TRIGGER_SCORE: f64 = 0.7;

pub(crate) async fn handle_chat(
    ctx: &AppContext,
    args: ChatArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let message = args.message.join(" ");
    let message = message.trim();
    if message.is_empty() {
        return Err(CliError::validation("message must not be empty"));
    }

    let classified = classify(ctx, message, &args.patient).await?;
    render_classification(&classified, format)?;

    match ChatAction::from_response(&classified) {
        ChatAction::Predict => {
            eprintln!("Generating predicted dose...");
            let predict = PredictArgs {
                patient: args.patient,
                force: false,
                wait: false,
                retry_secs: 0,
                max_attempts: 1,
            };
            let response = request_prediction(ctx, &predict).await?;
            render_prediction(&response, format)
        }
        ChatAction::Reply(reply) => {
            println!("{reply}");
            Ok(())
        }
        ChatAction::NotUnderstood => {
            println!("I didn't understand that. Try again.");
            Ok(())
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ChatAction<'a> {
    Predict,
    Reply(&'a str),
    NotUnderstood,
}

impl<'a> ChatAction<'a> {
    fn from_response(response: &'a ClassifyResponse) -> Self {
        match (response.intent, response.bot_response.as_deref()) {
            (Some(Intent::PredictDose), _) if response.score > PREDICT_TRIGGER_SCORE => {
                Self::Predict
            }
            (Some(Intent::Help), Some(reply)) => Self::Reply(reply),
            _ => Self::NotUnderstood,
        }
    }
}

async fn classify(ctx: &AppContext, message: &str, patient: &str) -> CliResult<ClassifyResponse> {
    let url = ctx.endpoint(&["api", "classify"])?;
    let request = ClassifyRequest {
        message: message.to_string(),
        patient_id: Some(patient.to_string()),
    };
    let response = ctx
        .client
        .post(url.clone())
        .json(&request)
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request to {url} failed: {err}")))?;

    if response.status().is_success() {
        decode_json(response, "classification").await
    } else {
        Err(classify_problem(response).await)
    }
}
