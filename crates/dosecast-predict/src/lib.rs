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

//! Single-flight dose prediction.
//!
//! Layout: `guard.rs` (process-wide run slot), `runner.rs` (external process
//! invocation), `scanner.rs` (artifact listing and URL mapping), `service.rs`
//! (orchestration), `model.rs` (domain types), `error.rs` (`PredictionError`).

pub mod error;
pub mod guard;
pub mod model;
pub mod runner;
pub mod scanner;
pub mod service;

pub use error::{PredictionError, PredictionResult};
pub use guard::{RunPermit, SingleFlight};
pub use model::{
    Artifact, ArtifactCategory, ArtifactSet, PatientKey, PredictionOutcome, RunState, RunStatus,
};
pub use runner::{CommandRunner, Invocation, PredictionRunner, ProcessReport};
pub use scanner::{ArtifactScanner, PUBLIC_PREFIX, artifact_url, slice_number};
pub use service::PredictionService;
