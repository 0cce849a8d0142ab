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

//! HTTP API for Dosecast.
//!
//! Layout: `http/router.rs` (router, middleware stack, serve loop),
//! `http/predictions.rs` and `http/classify.rs` (handlers), `http/errors.rs`
//! (problem documents), `intent.rs` (chat intent classifier), `state.rs`
//! (shared handler state), `error.rs` (server errors).

pub mod error;
mod http;
pub mod intent;
pub mod state;

pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
pub use intent::{IntentClassifier, MATCH_THRESHOLD, MAX_MESSAGE_CHARS, partial_ratio};
pub use state::ApiState;
