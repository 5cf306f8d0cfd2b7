//! Content-to-curriculum pipeline.
//!
//! ## Architecture
//!
//! ```text
//! PipelineService (api)
//!        │
//!        ▼
//! PipelineOrchestrator ── extract ─> curriculum ─> assessment
//!        │                  (each stage is one queue job)
//!        ▼
//!     JobQueue ──── fair semaphore, fixed worker count
//!        │
//!        ▼
//!  StageHandler ──── ExtractHandler | CurriculumHandler | AssessmentHandler
//!        │
//!        ├─ extract::extract()      format dispatch + content analysis
//!        ├─ GeneratorClient         AI seam (TemplateGenerator fallback)
//!        └─ QuotaLedger             post-hoc usage validation
//! ```
//!
//! When the process-wide dry-run flag is set, the queue routes every
//! stage through [`dry_run::simulate`] instead of its handler: fixed
//! canned artifacts, zero resource usage, no external calls.

pub mod dry_run;
pub mod extract;
pub mod handlers;
pub mod orchestrator;
pub mod queue;
pub mod quota;
pub mod types;

pub use handlers::{GeneratorClient, StageHandler, TemplateGenerator};
pub use orchestrator::{PipelineOrchestrator, PipelineRequest, PipelineResult, PipelineState};
pub use queue::{JobContext, JobQueue};
pub use quota::{QuotaLedger, QuotaTable, UsageSample, ValidationReport};
pub use types::{
    AgentKind, AssessmentSet, CancelToken, ContentAnalysis, CurriculumOutline, ExtractionResult,
    Job, JobFailure, JobState, StageInput, StageOutput,
};
