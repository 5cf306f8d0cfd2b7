//! Stage handlers — one per agent kind, dispatched by the job queue.
//!
//! Handlers are the only place real work happens. Each one checks the
//! cancellation signal at its major steps, reports progress through the
//! job context, and returns a [`StageOutcome`] carrying the resources it
//! consumed so the queue can validate them against the quota ledger.
//!
//! The AI generation call is an external capability behind the
//! [`GeneratorClient`] trait; [`TemplateGenerator`] is the built-in
//! deterministic fallback implementation.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;

use super::extract;
use super::queue::JobContext;
use super::quota::UsageSample;
use super::types::{
    AgentKind, AssessmentQuestion, AssessmentRequest, AssessmentSet, CurriculumOutline,
    CurriculumRequest, JobFailure, ModuleOutline, QuestionType, ScoringRubric, StageInput,
    StageOutput,
};

/// A handler's successful result: the stage output plus observed usage.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub output: StageOutput,
    pub usage: UsageSample,
}

/// One pipeline stage's execution logic.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Which agent kind this handler serves.
    fn kind(&self) -> AgentKind;

    /// Execute the stage. Errors become the job's structured failure;
    /// a returned `FailureKind::Cancelled` moves the job to `cancelled`.
    async fn run(&self, input: StageInput, ctx: JobContext) -> Result<StageOutcome, JobFailure>;
}

/// Rough chars-per-token estimate used for generation accounting.
fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

fn wrong_input(expected: AgentKind, got: AgentKind) -> JobFailure {
    JobFailure::stage(format!("{expected} handler received {got} input"))
}

// ═══════════════════════════════════════════
// Extract
// ═══════════════════════════════════════════

/// Runs the content extractor on the uploaded payload.
pub struct ExtractHandler;

#[async_trait]
impl StageHandler for ExtractHandler {
    fn kind(&self) -> AgentKind {
        AgentKind::Extract
    }

    async fn run(&self, input: StageInput, ctx: JobContext) -> Result<StageOutcome, JobFailure> {
        let StageInput::Extract(request) = input else {
            return Err(wrong_input(AgentKind::Extract, input.kind()));
        };
        if ctx.is_cancelled() {
            return Err(JobFailure::cancelled());
        }

        let start = Instant::now();
        ctx.report_progress(10);

        let download_bytes = request.payload.len() as u64;
        let cancel = ctx.cancel_token().clone();
        let extraction = tokio::task::spawn_blocking(move || {
            extract::extract(&request.payload, &request.media_type, &request.file_name, &cancel)
        })
        .await
        .map_err(|e| JobFailure::stage(format!("extraction task failed: {e}")))?
        .map_err(|e| match e {
            extract::ExtractError::Cancelled => JobFailure::cancelled(),
            extract::ExtractError::EmptyPayload => JobFailure::extraction_fatal(e.to_string()),
        })?;

        ctx.report_progress(80);

        let usage = UsageSample {
            pages: extraction.page_count as u64,
            download_bytes,
            runtime_ms: start.elapsed().as_millis() as u64,
            ..Default::default()
        };

        Ok(StageOutcome { output: StageOutput::Extract(extraction), usage })
    }
}

// ═══════════════════════════════════════════
// Generation Seam
// ═══════════════════════════════════════════

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("generation backend error: {0}")]
    Backend(String),
}

/// External AI generation capability. Real backends live with the
/// embedding application; the pipeline only depends on this seam.
#[async_trait]
pub trait GeneratorClient: Send + Sync {
    async fn generate_outline(
        &self,
        request: &CurriculumRequest,
    ) -> Result<CurriculumOutline, GeneratorError>;

    async fn generate_assessment(
        &self,
        request: &AssessmentRequest,
    ) -> Result<AssessmentSet, GeneratorError>;
}

/// Deterministic template-driven generator: modules come from the
/// extraction's key topics, questions from the modules. Serves as the
/// fallback contract when no AI backend is wired in.
pub struct TemplateGenerator;

/// Cap on modules derived from key topics.
const MAX_TEMPLATE_MODULES: usize = 4;
const MINUTES_PER_MODULE: u32 = 30;
const PASS_THRESHOLD_PCT: u8 = 70;

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[async_trait]
impl GeneratorClient for TemplateGenerator {
    async fn generate_outline(
        &self,
        request: &CurriculumRequest,
    ) -> Result<CurriculumOutline, GeneratorError> {
        let topics: Vec<String> = if request.analysis.key_topics.is_empty() {
            vec![request.subject.to_lowercase()]
        } else {
            request
                .analysis
                .key_topics
                .iter()
                .take(MAX_TEMPLATE_MODULES)
                .cloned()
                .collect()
        };

        let modules: Vec<ModuleOutline> = topics
            .iter()
            .enumerate()
            .map(|(i, topic)| ModuleOutline {
                id: format!("module_{i}"),
                title: format!("{}: Core Concepts", title_case(topic)),
                objectives: vec![
                    format!("Explain {topic} in their own words"),
                    format!("Apply {topic} to a worked example"),
                ],
                key_topics: vec![topic.clone()],
            })
            .collect();

        let estimated_minutes =
            modules.len() as u32 * MINUTES_PER_MODULE + request.analysis.reading_minutes;

        Ok(CurriculumOutline {
            subject: request.subject.clone(),
            grade_level: request.grade_level.clone(),
            modules,
            estimated_minutes,
            dry_run: false,
        })
    }

    async fn generate_assessment(
        &self,
        request: &AssessmentRequest,
    ) -> Result<AssessmentSet, GeneratorError> {
        let mut questions = Vec::new();
        for module in &request.outline.modules {
            let topic = module
                .key_topics
                .first()
                .cloned()
                .unwrap_or_else(|| module.title.clone());
            questions.push(AssessmentQuestion {
                module_id: module.id.clone(),
                prompt: format!("Which statement about {topic} is accurate?"),
                question_type: QuestionType::MultipleChoice,
                points: 10,
            });
            questions.push(AssessmentQuestion {
                module_id: module.id.clone(),
                prompt: format!("In your own words, describe {topic}."),
                question_type: QuestionType::ShortAnswer,
                points: 15,
            });
        }
        let total_points = questions.iter().map(|q| q.points).sum();

        Ok(AssessmentSet {
            questions,
            rubric: ScoringRubric { total_points, pass_threshold_pct: PASS_THRESHOLD_PCT },
            dry_run: false,
        })
    }
}

// ═══════════════════════════════════════════
// Curriculum
// ═══════════════════════════════════════════

/// Architects a curriculum outline from extracted text.
pub struct CurriculumHandler {
    generator: Arc<dyn GeneratorClient>,
}

impl CurriculumHandler {
    pub fn new(generator: Arc<dyn GeneratorClient>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl StageHandler for CurriculumHandler {
    fn kind(&self) -> AgentKind {
        AgentKind::Curriculum
    }

    async fn run(&self, input: StageInput, ctx: JobContext) -> Result<StageOutcome, JobFailure> {
        let StageInput::Curriculum(request) = input else {
            return Err(wrong_input(AgentKind::Curriculum, input.kind()));
        };
        if ctx.is_cancelled() {
            return Err(JobFailure::cancelled());
        }

        let start = Instant::now();
        ctx.report_progress(10);

        let prompt_tokens = estimate_tokens(&request.text);
        let outline = self
            .generator
            .generate_outline(&request)
            .await
            .map_err(|e| JobFailure::stage(e.to_string()))?;

        if ctx.is_cancelled() {
            return Err(JobFailure::cancelled());
        }
        ctx.report_progress(90);

        let output_tokens = serde_json::to_string(&outline)
            .map(|s| estimate_tokens(&s))
            .unwrap_or(0);

        let usage = UsageSample {
            tokens: prompt_tokens + output_tokens,
            runtime_ms: start.elapsed().as_millis() as u64,
            ..Default::default()
        };

        Ok(StageOutcome { output: StageOutput::Curriculum(outline), usage })
    }
}

// ═══════════════════════════════════════════
// Assessment
// ═══════════════════════════════════════════

/// Generates an assessment set from a curriculum outline.
pub struct AssessmentHandler {
    generator: Arc<dyn GeneratorClient>,
}

impl AssessmentHandler {
    pub fn new(generator: Arc<dyn GeneratorClient>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl StageHandler for AssessmentHandler {
    fn kind(&self) -> AgentKind {
        AgentKind::Assessment
    }

    async fn run(&self, input: StageInput, ctx: JobContext) -> Result<StageOutcome, JobFailure> {
        let StageInput::Assessment(request) = input else {
            return Err(wrong_input(AgentKind::Assessment, input.kind()));
        };
        if ctx.is_cancelled() {
            return Err(JobFailure::cancelled());
        }

        let start = Instant::now();
        ctx.report_progress(10);

        let prompt_tokens = serde_json::to_string(&request.outline)
            .map(|s| estimate_tokens(&s))
            .unwrap_or(0);
        let assessment = self
            .generator
            .generate_assessment(&request)
            .await
            .map_err(|e| JobFailure::stage(e.to_string()))?;

        if ctx.is_cancelled() {
            return Err(JobFailure::cancelled());
        }
        ctx.report_progress(90);

        let output_tokens = serde_json::to_string(&assessment)
            .map(|s| estimate_tokens(&s))
            .unwrap_or(0);

        let usage = UsageSample {
            tokens: prompt_tokens + output_tokens,
            runtime_ms: start.elapsed().as_millis() as u64,
            ..Default::default()
        };

        Ok(StageOutcome { output: StageOutput::Assessment(assessment), usage })
    }
}
