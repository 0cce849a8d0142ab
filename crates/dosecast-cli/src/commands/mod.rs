//! Command handlers grouped by concern.

pub(crate) mod chat;
pub(crate) mod predict;
pub(crate) mod view;
