#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Environment-backed configuration for the Dosecast server.
//!
//! Layout: `model.rs` (typed config models), `validate.rs` (parsing and
//! validation helpers), `loader.rs` (environment lookup), `defaults.rs`
//! (fallback values), `error.rs` (`ConfigError`).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ENV_PREFIX, load_from_env, load_from_lookup};
pub use model::{ArtifactLayout, LoggingSettings, PredictionPolicy, ServerConfig, StderrPolicy};
