//! Pipeline configuration consumed once at process start.
//!
//! The dry-run switch and the static quota table are injected into the
//! ledger and orchestrator at construction rather than read ad hoc from
//! the environment, so both behaviors are testable by dependency
//! injection.

use serde::{Deserialize, Serialize};

use crate::pipeline::quota::QuotaTable;

/// What the orchestrator does when a completed stage carries quota
/// violations. The source system validated after the fact and never
/// resolved whether violations should gate future stages, so the
/// policy stays configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPolicy {
    /// Annotate the job, log a warning, continue the chain.
    Advisory,
    /// Stop the chain after the annotated stage.
    Abort,
}

/// Static configuration for one pipeline process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// When true, every stage routes through the dry-run simulator and
    /// incurs zero cost.
    pub dry_run: bool,
    /// Fixed worker pool size; pipeline depth never adds parallelism.
    pub workers: usize,
    /// Soft per-stage limit: logged, handler urged to finish.
    pub soft_timeout_ms: u64,
    /// Hard per-stage limit: handler forcibly stopped, job fails.
    pub hard_timeout_ms: u64,
    pub quota_policy: QuotaPolicy,
    pub quotas: QuotaTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            workers: 4,
            soft_timeout_ms: 30_000,
            hard_timeout_ms: 120_000,
            quota_policy: QuotaPolicy::Advisory,
            quotas: QuotaTable::default(),
        }
    }
}
