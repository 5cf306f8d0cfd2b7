//! Core types for the content-to-curriculum pipeline.
//!
//! These types model the full lifecycle:
//! Upload → Extraction → Curriculum Architecture → Assessment Generation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ═══════════════════════════════════════════
// Agent Kind
// ═══════════════════════════════════════════

/// The three agent roles a job can run as, in fixed chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Extract,
    Curriculum,
    Assessment,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Curriculum => "curriculum",
            Self::Assessment => "assessment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "extract" => Some(Self::Extract),
            "curriculum" => Some(Self::Curriculum),
            "assessment" => Some(Self::Assessment),
            _ => None,
        }
    }

    pub fn all() -> &'static [AgentKind] {
        &[Self::Extract, Self::Curriculum, Self::Assessment]
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Job State Machine
// ═══════════════════════════════════════════

/// Lifecycle state of a job. `Succeeded`, `Failed` and `Cancelled` are
/// terminal; no transition leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Structured Failure
// ═══════════════════════════════════════════

/// Classification of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Payload unreadable at all; extraction could not even degrade.
    ExtractionFatal,
    /// Generic handler error (generation call failure, bad input shape).
    StageFailure,
    /// Hard time limit exceeded; the handler was forcibly stopped.
    StageTimeout,
    /// A quota violation escalated under the abort policy.
    QuotaViolation,
    /// The handler observed a cancellation request at a checkpoint.
    Cancelled,
}

/// Structured cause attached to a failed job. Serializable so status
/// polling can surface it to external collaborators as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn extraction_fatal(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::ExtractionFatal, message: message.into() }
    }

    pub fn stage(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::StageFailure, message: message.into() }
    }

    pub fn timeout(limit_ms: u64) -> Self {
        Self {
            kind: FailureKind::StageTimeout,
            message: format!("stage exceeded hard time limit of {limit_ms}ms"),
        }
    }

    pub fn quota(violations: &[String]) -> Self {
        Self {
            kind: FailureKind::QuotaViolation,
            message: violations.join("; "),
        }
    }

    pub fn cancelled() -> Self {
        Self { kind: FailureKind::Cancelled, message: "cancelled by caller".to_string() }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

// ═══════════════════════════════════════════
// Cancellation Token
// ═══════════════════════════════════════════

/// Cooperative cancellation signal shared between the queue and a
/// running handler. Handlers check it at safe points; the extractor
/// checks it at page/paragraph loop boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

// ═══════════════════════════════════════════
// Content Analysis
// ═══════════════════════════════════════════

/// Detected subject domain of extracted content. Closed set; detection
/// scans keyword sets in this declaration order, first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentDomain {
    ComputerScience,
    Mathematics,
    Science,
    History,
    General,
}

impl ContentDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComputerScience => "computer-science",
            Self::Mathematics => "mathematics",
            Self::Science => "science",
            Self::History => "history",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for ContentDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Complexity tier derived from mean word length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Elementary,
    Intermediate,
    Advanced,
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Elementary => "elementary",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

/// Lightweight analysis of extracted text. Produced once per extract
/// job, never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub word_count: usize,
    pub char_count: usize,
    /// Estimated reading time in whole minutes.
    pub reading_minutes: u32,
    pub domain: ContentDomain,
    pub complexity: ComplexityTier,
    /// The 5 most frequent content words, first-encountered order breaks ties.
    pub key_topics: Vec<String>,
}

// ═══════════════════════════════════════════
// Stage Artifacts
// ═══════════════════════════════════════════

/// Output of the extract stage: plain text plus its analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Original file name, kept for fallback placeholders and auditing.
    pub source_name: String,
    pub text: String,
    /// Pages for PDF, paragraphs for structured documents, 1 for plain text.
    pub page_count: usize,
    pub analysis: ContentAnalysis,
    /// True when fallback or placeholder text was substituted for real
    /// content. Degraded extraction still succeeds.
    pub degraded: bool,
    pub dry_run: bool,
}

/// A single module of a generated curriculum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleOutline {
    /// Stable id of the form `module_N`.
    pub id: String,
    pub title: String,
    pub objectives: Vec<String>,
    pub key_topics: Vec<String>,
}

/// Output of the curriculum stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumOutline {
    pub subject: String,
    pub grade_level: String,
    pub modules: Vec<ModuleOutline>,
    pub estimated_minutes: u32,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    ShortAnswer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentQuestion {
    pub module_id: String,
    pub prompt: String,
    pub question_type: QuestionType,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRubric {
    pub total_points: u32,
    /// Percentage of total points required to pass.
    pub pass_threshold_pct: u8,
}

/// Output of the assessment stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSet {
    pub questions: Vec<AssessmentQuestion>,
    pub rubric: ScoringRubric,
    pub dry_run: bool,
}

// ═══════════════════════════════════════════
// Stage Inputs & Outputs
// ═══════════════════════════════════════════

/// Input for an extract job: the raw upload plus pipeline metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRequest {
    pub payload: Vec<u8>,
    pub media_type: String,
    pub file_name: String,
}

/// Input for a curriculum job: extracted text plus subject metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumRequest {
    pub text: String,
    pub analysis: ContentAnalysis,
    pub subject: String,
    pub grade_level: String,
}

/// Input for an assessment job: the generated outline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentRequest {
    pub outline: CurriculumOutline,
}

/// Kind-specific job input. The closed variant set makes adding a stage
/// a compile-time-checked change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageInput {
    Extract(ExtractRequest),
    Curriculum(CurriculumRequest),
    Assessment(AssessmentRequest),
}

impl StageInput {
    pub fn kind(&self) -> AgentKind {
        match self {
            Self::Extract(_) => AgentKind::Extract,
            Self::Curriculum(_) => AgentKind::Curriculum,
            Self::Assessment(_) => AgentKind::Assessment,
        }
    }
}

/// Kind-specific job result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutput {
    Extract(ExtractionResult),
    Curriculum(CurriculumOutline),
    Assessment(AssessmentSet),
}

impl StageOutput {
    pub fn kind(&self) -> AgentKind {
        match self {
            Self::Extract(_) => AgentKind::Extract,
            Self::Curriculum(_) => AgentKind::Curriculum,
            Self::Assessment(_) => AgentKind::Assessment,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        match self {
            Self::Extract(r) => r.dry_run,
            Self::Curriculum(o) => o.dry_run,
            Self::Assessment(a) => a.dry_run,
        }
    }
}

// ═══════════════════════════════════════════
// Job
// ═══════════════════════════════════════════

/// The unit of work scheduled by the queue. The queue exclusively owns
/// mutation of `state`, `progress`, `result` and `error`; everyone else
/// sees cloned snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: AgentKind,
    pub input: StageInput,
    pub state: JobState,
    /// 0..=100, monotonically non-decreasing while running.
    pub progress: u8,
    pub result: Option<StageOutput>,
    pub error: Option<JobFailure>,
    /// Quota violations observed after the handler ran. Advisory by
    /// default; the orchestrator decides whether they stop the chain.
    pub violations: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: Uuid, input: StageInput) -> Self {
        Self {
            id,
            kind: input.kind(),
            input,
            state: JobState::Pending,
            progress: 0,
            result: None,
            error: None,
            violations: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}
