//! Lernia turns uploaded learning material into a curriculum.
//!
//! An upload (PDF, Word document, HTML or plain text) flows through an
//! asynchronous three-stage agent chain: extraction distills the file
//! to analyzed text, curriculum design turns the text into a module
//! outline, and assessment generation produces questions and a scoring
//! rubric for that outline. Each stage runs as a tracked job on a
//! bounded worker pool with cooperative cancellation, progress
//! reporting and post-hoc quota accounting. A process-wide dry-run
//! mode replaces every stage with deterministic canned output for
//! zero-cost integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod telemetry;

pub use api::{ActiveJobView, JobStatusView, PipelineHandle, PipelineService};
pub use config::{PipelineConfig, QuotaPolicy};
pub use error::PipelineError;
pub use pipeline::orchestrator::{PipelineRequest, PipelineResult};
