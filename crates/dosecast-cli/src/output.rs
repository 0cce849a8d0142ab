//! Output renderers and formatting helpers for CLI commands.

use anyhow::anyhow;
use dosecast_api_models::{ArtifactListing, ClassifyResponse, Intent, PredictionResponse};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};
use crate::navigator::SliceView;

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

pub(crate) fn render_prediction(response: &PredictionResponse, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(response)?,
        OutputFormat::Table => {
            println!("patient: {}", response.patient_id);
            println!("status: {}", response.message);
            if response.elapsed_ms > 0 {
                println!("elapsed: {}", format_elapsed(response.elapsed_ms));
            }
            print_listing_table(&response.artifacts);
        }
    }
    Ok(())
}

pub(crate) fn render_listing(
    patient: &str,
    listing: &ArtifactListing,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(listing)?,
        OutputFormat::Table => {
            println!("patient: {patient}");
            print_listing_table(listing);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct SliceJson<'a> {
    patient: &'a str,
    index: usize,
    count: usize,
    ct: Option<&'a str>,
    dose: Option<&'a str>,
    prediction: Option<&'a str>,
}

pub(crate) fn render_slice(patient: &str, view: &SliceView<'_>, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(&SliceJson {
            patient,
            index: view.index,
            count: view.count,
            ct: view.ct,
            dose: view.dose,
            prediction: view.prediction,
        })?,
        OutputFormat::Table => {
            println!("patient: {patient}");
            println!("slice: {} / {}", view.index + 1, view.count);
            println!("{:<11} {}", "ct", view.ct.unwrap_or("-"));
            println!("{:<11} {}", "dose", view.dose.unwrap_or("-"));
            println!("{:<11} {}", "prediction", view.prediction.unwrap_or("-"));
        }
    }
    Ok(())
}

pub(crate) fn render_classification(
    response: &ClassifyResponse,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(response)?,
        OutputFormat::Table => {
            let intent = response.intent.map_or("none", intent_label);
            println!("intent: {intent} (score {:.2})", response.score);
        }
    }
    Ok(())
}

fn print_listing_table(listing: &ArtifactListing) {
    println!("{:<11} {:>6}  FIRST", "CATEGORY", "COUNT");
    for (name, urls) in [
        ("ct", &listing.ct),
        ("dose", &listing.dose),
        ("prediction", &listing.prediction),
    ] {
        println!(
            "{:<11} {:>6}  {}",
            name,
            urls.len(),
            urls.first().map_or("-", String::as_str)
        );
    }
}

#[must_use]
pub(crate) const fn intent_label(intent: Intent) -> &'static str {
    match intent {
        Intent::PredictDose => "predict_dose",
        Intent::Help => "help",
    }
}

#[must_use]
pub(crate) fn format_elapsed(millis: u64) -> String {
    if millis < 1_000 {
        return format!("{millis} ms");
    }
    let secs = millis / 1_000;
    let tenths = (millis % 1_000) / 100;
    if secs < 60 {
        format!("{secs}.{tenths} s")
    } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}
