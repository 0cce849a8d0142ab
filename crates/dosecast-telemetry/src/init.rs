//! Subscriber installation and log format selection.

use once_cell::sync::OnceCell;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::error::{Result, TelemetryError};

/// Level used when neither `RUST_LOG` nor configuration supplies one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const UNKNOWN_BUILD: &str = "dev";

static BUILD_SHA: OnceCell<&'static str> = OnceCell::new();

/// Output flavour for the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, current span fields flattened in.
    Json,
    /// Compact human-readable lines.
    Pretty,
}

impl LogFormat {
    /// Pretty for debug builds, JSON for release builds.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    /// Parse a configured name; anything unrecognised falls back to [`LogFormat::infer`].
    #[must_use]
    pub fn from_name(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else if ["pretty", "text"]
            .iter()
            .any(|name| value.trim().eq_ignore_ascii_case(name))
        {
            Self::Pretty
        } else {
            Self::infer()
        }
    }

    /// Configuration name of the format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

/// Inputs for [`init_logging`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive applied when `RUST_LOG` is unset.
    pub level: String,
    /// Output flavour.
    pub format: LogFormat,
    /// Build identifier exposed through [`build_sha`].
    pub build_sha: &'static str,
}

impl LoggingConfig {
    /// Config for `level` and `format`, stamped with the compile-time build SHA.
    #[must_use]
    pub fn new(level: impl Into<String>, format: LogFormat) -> Self {
        Self {
            level: level.into(),
            format,
            build_sha: option_env!("DOSECAST_BUILD_SHA").unwrap_or(UNKNOWN_BUILD),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_LEVEL, LogFormat::infer())
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `config.level`.
///
/// # Errors
///
/// Returns [`TelemetryError::SubscriberInstall`] when a global subscriber is
/// already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    // First caller wins; later calls keep the recorded value.
    let _ = BUILD_SHA.set(config.build_sha);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let output = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(|source| TelemetryError::SubscriberInstall { source })
}

/// Build SHA recorded by [`init_logging`], or `dev` before logging is set up.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA.get().copied().unwrap_or(UNKNOWN_BUILD)
}
