//! Environment-variable loading.
//!
//! Every setting is read through a lookup closure so tests can feed a map
//! instead of mutating the process environment.

use std::path::PathBuf;

use tracing::debug;

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    ArtifactLayout, LoggingSettings, PredictionPolicy, ServerConfig, StderrPolicy,
};
use crate::validate::{
    parse_bind_addr, parse_command, parse_extension, parse_flag, parse_port,
    parse_positive_secs, parse_public_base_url,
};

/// Prefix shared by every environment variable the server reads.
pub const ENV_PREFIX: &str = "DOSECAST_";

const BIND_ADDR: &str = "DOSECAST_BIND_ADDR";
const HTTP_PORT: &str = "DOSECAST_HTTP_PORT";
const INPUT_ROOT: &str = "DOSECAST_INPUT_ROOT";
const OUTPUT_ROOT: &str = "DOSECAST_OUTPUT_ROOT";
const PUBLIC_URL: &str = "DOSECAST_PUBLIC_URL";
const PREDICT_COMMAND: &str = "DOSECAST_PREDICT_COMMAND";
const PROCESS_TIMEOUT_SECS: &str = "DOSECAST_PROCESS_TIMEOUT_SECS";
const STDERR_POLICY: &str = "DOSECAST_STDERR_POLICY";
const RERUN_EXISTING: &str = "DOSECAST_RERUN_EXISTING";
const IMAGE_EXTENSION: &str = "DOSECAST_IMAGE_EXTENSION";
const LOG_LEVEL: &str = "DOSECAST_LOG_LEVEL";
const LOG_FORMAT: &str = "DOSECAST_LOG_FORMAT";

/// Load configuration from the process environment.
///
/// # Errors
///
/// Returns [`ConfigError`] when any present variable fails validation.
pub fn load_from_env() -> ConfigResult<ServerConfig> {
    load_from_lookup(|name| std::env::var(name).ok())
}

/// Load configuration from an arbitrary key lookup.
///
/// Missing or blank keys fall back to defaults.
///
/// # Errors
///
/// Returns [`ConfigError`] when any present value fails validation.
pub fn load_from_lookup<F>(lookup: F) -> ConfigResult<ServerConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    let bind_addr = parse_bind_addr(&read(BIND_ADDR).unwrap_or_else(|| defaults::BIND_ADDR.into()))?;
    let http_port = read(HTTP_PORT)
        .map(|value| parse_port(HTTP_PORT, &value))
        .transpose()?
        .unwrap_or(defaults::HTTP_PORT);

    let layout = ArtifactLayout {
        input_root: read(INPUT_ROOT).map_or_else(|| PathBuf::from(defaults::INPUT_ROOT), PathBuf::from),
        output_root: read(OUTPUT_ROOT)
            .map_or_else(|| PathBuf::from(defaults::OUTPUT_ROOT), PathBuf::from),
        public_base_url: read(PUBLIC_URL)
            .map(|value| parse_public_base_url(PUBLIC_URL, &value))
            .transpose()?
            .unwrap_or_default(),
        image_extension: read(IMAGE_EXTENSION)
            .map(|value| parse_extension(IMAGE_EXTENSION, &value))
            .transpose()?
            .unwrap_or_else(|| defaults::IMAGE_EXTENSION.to_string()),
    };

    let (program, args) = parse_command(
        PREDICT_COMMAND,
        &read(PREDICT_COMMAND).unwrap_or_else(|| defaults::PREDICT_COMMAND.into()),
    )?;
    let prediction = PredictionPolicy {
        program,
        args,
        timeout: parse_positive_secs(
            PROCESS_TIMEOUT_SECS,
            &read(PROCESS_TIMEOUT_SECS)
                .unwrap_or_else(|| defaults::PROCESS_TIMEOUT_SECS.to_string()),
        )?,
        stderr_policy: read(STDERR_POLICY)
            .map(|value| value.parse::<StderrPolicy>())
            .transpose()?
            .unwrap_or_default(),
        rerun_existing: read(RERUN_EXISTING)
            .map(|value| parse_flag(RERUN_EXISTING, &value))
            .transpose()?
            .unwrap_or(false),
    };

    let format = read(LOG_FORMAT)
        .unwrap_or_else(|| defaults::LOG_FORMAT.into())
        .to_ascii_lowercase();
    if !matches!(format.as_str(), "json" | "pretty") {
        return Err(ConfigError::invalid(
            LOG_FORMAT,
            "unsupported_format",
            Some(&format),
        ));
    }
    let logging = LoggingSettings {
        level: read(LOG_LEVEL).unwrap_or_else(|| defaults::LOG_LEVEL.into()),
        format,
    };

    debug!(
        bind_addr = %bind_addr,
        http_port,
        stderr_policy = %prediction.stderr_policy,
        "configuration resolved"
    );

    Ok(ServerConfig {
        bind_addr,
        http_port,
        layout,
        prediction,
        logging,
    })
}
