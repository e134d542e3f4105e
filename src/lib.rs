// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod extract;
pub mod keywords;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod source;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::extract::{extract, Extraction};
pub use crate::pipeline::{AutoEventPipeline, PipelineError};
