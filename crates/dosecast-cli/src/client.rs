//! Shared client utilities, error types, and problem classification for the CLI.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use anyhow::anyhow;
use dosecast_api_models::ProblemDetails;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::cli::Cli;

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";

/// Exit status for bad input, including `400` answers such as a busy server.
pub(crate) const EXIT_VALIDATION: i32 = 2;
/// Exit status for transport errors and server-side failures.
pub(crate) const EXIT_FAILURE: i32 = 3;

/// Either the user can fix it (`Validation`) or something went wrong on the
/// way to or inside the server (`Failure`).
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        if matches!(self, Self::Validation(_)) {
            EXIT_VALIDATION
        } else {
            EXIT_FAILURE
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(message) => formatter.write_str(message),
            Self::Failure(error) => write!(formatter, "{error:#}"),
        }
    }
}

impl std::error::Error for CliError {}

/// Application context passed to command handlers.
#[derive(Clone)]
pub(crate) struct AppContext {
    pub(crate) client: Client,
    pub(crate) base_url: Url,
}

impl AppContext {
    /// Build a context whose client tags every request with `request_id`.
    pub(crate) fn from_cli(cli: &Cli, request_id: &str) -> CliResult<Self> {
        let mut default_headers = HeaderMap::new();
        let request_id = HeaderValue::from_str(request_id).map_err(|_| {
            CliError::failure(anyhow!("request identifier contains invalid characters"))
        })?;
        default_headers.insert(HEADER_REQUEST_ID, request_id);

        let client = Client::builder()
            .timeout(Duration::from_secs(cli.timeout))
            .default_headers(default_headers)
            .build()
            .map_err(|err| CliError::failure(anyhow!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: cli.api_url.clone(),
        })
    }

    /// Append percent-encoded path segments to the base URL.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> CliResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                CliError::validation(format!("API URL '{}' cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Parse the API URL provided to the CLI.
pub(crate) fn parse_url(input: &str) -> Result<Url, String> {
    input
        .parse::<Url>()
        .map_err(|err| format!("invalid URL '{input}': {err}"))
}

/// Non-success response captured for classification.
#[derive(Debug)]
pub(crate) struct ProblemResponse {
    status: StatusCode,
    problem: Option<ProblemDetails>,
    body: String,
}

impl ProblemResponse {
    pub(crate) async fn read(response: reqwest::Response) -> Self {
        let status = response.status();
        let bytes = response.bytes().await.unwrap_or_default();
        Self {
            status,
            problem: serde_json::from_slice::<ProblemDetails>(&bytes).ok(),
            body: String::from_utf8_lossy(&bytes).trim().to_string(),
        }
    }

    /// `true` when the server rejected the request because a run is in progress.
    pub(crate) fn is_busy(&self) -> bool {
        self.problem.as_ref().is_some_and(ProblemDetails::is_busy)
    }

    /// Convert into a CLI error: `400` is a validation error, everything else
    /// is an operational failure carrying the server's detail text.
    pub(crate) fn into_error(self) -> CliError {
        let message = self
            .problem
            .as_ref()
            .and_then(|p| p.detail.clone())
            .unwrap_or_else(|| {
                self.problem
                    .as_ref()
                    .map_or_else(|| self.body.clone(), |p| p.title.clone())
            });

        if self.status == StatusCode::BAD_REQUEST {
            CliError::validation(message)
        } else {
            let detail = if self.problem.is_some() || !self.body.is_empty() {
                format!("{message} (status {})", self.status)
            } else {
                format!("request failed with status {}", self.status)
            };
            CliError::failure(anyhow!(detail))
        }
    }
}

/// Classify an HTTP response into a CLI error.
pub(crate) async fn classify_problem(response: reqwest::Response) -> CliError {
    ProblemResponse::read(response).await.into_error()
}

/// Decode a successful JSON body, naming `what` on failure.
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> CliResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode {what} response: {err}")))
}
