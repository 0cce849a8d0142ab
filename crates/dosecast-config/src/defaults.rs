//! Fallback values applied when an environment variable is absent.

pub(crate) const BIND_ADDR: &str = "127.0.0.1";
pub(crate) const HTTP_PORT: u16 = 5000;
pub(crate) const INPUT_ROOT: &str = "new-data/patients";
pub(crate) const OUTPUT_ROOT: &str = "predictions";
pub(crate) const PREDICT_COMMAND: &str = "python3 predict.py";
/// Generous ceiling; dose models on CPU routinely take several minutes.
pub(crate) const PROCESS_TIMEOUT_SECS: u64 = 900;
pub(crate) const IMAGE_EXTENSION: &str = "png";
pub(crate) const LOG_LEVEL: &str = "info";
pub(crate) const LOG_FORMAT: &str = "json";
