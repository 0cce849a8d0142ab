//! Typed configuration models.
//!
//! # Design
//! - Pure data carriers consumed by the prediction service, API and bootstrap.
//! - Parsing lives in `validate.rs`, environment access in `loader.rs`.

use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::ConfigError;

/// Fully resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// IP address (and interface) the API server binds to.
    pub bind_addr: IpAddr,
    /// HTTP port the API server binds to.
    pub http_port: u16,
    /// Where patient inputs and prediction artifacts live.
    pub layout: ArtifactLayout,
    /// How the external prediction process is invoked.
    pub prediction: PredictionPolicy,
    /// Logging level and output format.
    pub logging: LoggingSettings,
}

impl ServerConfig {
    /// Socket address derived from the bind address and port.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.http_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::from([127, 0, 0, 1]),
            http_port: defaults::HTTP_PORT,
            layout: ArtifactLayout::default(),
            prediction: PredictionPolicy::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Directory conventions shared by the prediction runner and artifact scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    /// Root holding one input directory per patient.
    pub input_root: PathBuf,
    /// Root the external process writes `<patient>-images/` trees into.
    pub output_root: PathBuf,
    /// Absolute origin prepended to artifact URLs; empty for root-relative URLs.
    pub public_base_url: String,
    /// File extension (without the dot) that marks an artifact image.
    pub image_extension: String,
}

impl ArtifactLayout {
    /// Input directory for one patient: `<input_root>/<patient>`.
    #[must_use]
    pub fn input_dir(&self, patient: &str) -> PathBuf {
        self.input_root.join(patient)
    }

    /// Output directory for one patient: `<output_root>/<patient>-images`.
    #[must_use]
    pub fn output_dir(&self, patient: &str) -> PathBuf {
        self.output_root.join(Self::output_dir_name(patient))
    }

    /// Name of a patient's output directory relative to the output root.
    #[must_use]
    pub fn output_dir_name(patient: &str) -> String {
        format!("{patient}-images")
    }

    /// Root served read-only under `/predictions`.
    #[must_use]
    pub fn static_root(&self) -> &Path {
        &self.output_root
    }
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from(defaults::INPUT_ROOT),
            output_root: PathBuf::from(defaults::OUTPUT_ROOT),
            public_base_url: String::new(),
            image_extension: defaults::IMAGE_EXTENSION.to_string(),
        }
    }
}

/// How the external prediction process is invoked and judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionPolicy {
    /// Executable to spawn.
    pub program: String,
    /// Leading arguments placed before the input and output directories.
    pub args: Vec<String>,
    /// Upper bound on a single run before the child is killed.
    pub timeout: Duration,
    /// Whether stderr output alone marks a run as failed.
    pub stderr_policy: StderrPolicy,
    /// Re-run even when prediction images already exist for the patient.
    pub rerun_existing: bool,
}

impl Default for PredictionPolicy {
    fn default() -> Self {
        let mut words = defaults::PREDICT_COMMAND.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_default();
        Self {
            program,
            args: words.collect(),
            timeout: Duration::from_secs(defaults::PROCESS_TIMEOUT_SECS),
            stderr_policy: StderrPolicy::default(),
            rerun_existing: false,
        }
    }
}

/// Treatment of diagnostic output written to stderr by a successful process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StderrPolicy {
    /// Exit status alone decides success; stderr is logged.
    #[default]
    Ignore,
    /// Any stderr output fails the run, even with a zero exit status.
    Fail,
}

impl StderrPolicy {
    /// Render the policy as its lowercase configuration name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Fail => "fail",
        }
    }
}

impl FromStr for StderrPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ignore" | "exit-code" | "exit_code" => Ok(Self::Ignore),
            "fail" | "strict" => Ok(Self::Fail),
            _ => Err(ConfigError::InvalidStderrPolicy {
                value: value.to_string(),
            }),
        }
    }
}

impl Display for StderrPolicy {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Logging level and output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Level passed to the env filter when `RUST_LOG` is unset.
    pub level: String,
    /// `json` or `pretty`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: defaults::LOG_FORMAT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_derives_patient_directories() {
        let layout = ArtifactLayout {
            input_root: PathBuf::from("/data/in"),
            output_root: PathBuf::from("/data/out"),
            ..ArtifactLayout::default()
        };
        assert_eq!(layout.input_dir("pt_1"), PathBuf::from("/data/in/pt_1"));
        assert_eq!(
            layout.output_dir("pt_1"),
            PathBuf::from("/data/out/pt_1-images")
        );
        assert_eq!(layout.static_root(), Path::new("/data/out"));
    }

    #[test]
    fn stderr_policy_parses_aliases() -> Result<(), ConfigError> {
        assert_eq!("ignore".parse::<StderrPolicy>()?, StderrPolicy::Ignore);
        assert_eq!("EXIT-CODE".parse::<StderrPolicy>()?, StderrPolicy::Ignore);
        assert_eq!("strict".parse::<StderrPolicy>()?, StderrPolicy::Fail);
        assert!(matches!(
            "sometimes".parse::<StderrPolicy>(),
            Err(ConfigError::InvalidStderrPolicy { .. })
        ));
        assert_eq!(StderrPolicy::Fail.to_string(), "fail");
        Ok(())
    }

    #[test]
    fn stderr_policy_serialises_lowercase() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&StderrPolicy::Fail)?, "\"fail\"");
        Ok(())
    }

    #[test]
    fn default_policy_splits_command() {
        let policy = PredictionPolicy::default();
        assert_eq!(policy.program, "python3");
        assert_eq!(policy.args, vec!["predict.py".to_string()]);
        assert_eq!(policy.stderr_policy, StderrPolicy::Ignore);
        assert!(!policy.rerun_existing);
    }

    #[test]
    fn default_server_listens_on_loopback() {
        let config = ServerConfig::default();
        assert!(config.socket_addr().ip().is_loopback());
        assert_eq!(config.socket_addr().port(), 5000);
    }
}
