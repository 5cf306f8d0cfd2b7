//! Pipeline orchestrator: chains extract, curriculum and assessment.
//!
//! Each stage is an ordinary queue job; the orchestrator submits one,
//! waits for it to reach a terminal state, projects its artifact into
//! the next stage's input and repeats. Depth never adds parallelism:
//! one pipeline occupies at most one worker at a time.
//!
//! Stage artifacts survive downstream failure. A pipeline that fails
//! at curriculum still hands back the extraction, so callers can retry
//! generation without re-uploading.

use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::config::QuotaPolicy;

use super::queue::JobQueue;
use super::types::{
    AgentKind, AssessmentRequest, AssessmentSet, CancelToken, CurriculumOutline,
    CurriculumRequest, ExtractRequest, ExtractionResult, Job, JobFailure, JobState, StageInput,
    StageOutput,
};

/// Everything needed to run the full chain for one upload.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub payload: Vec<u8>,
    pub media_type: String,
    pub file_name: String,
    pub subject: String,
    pub grade_level: String,
}

/// Final record of a pipeline run. Artifacts are filled in as stages
/// complete; a partial result means the chain stopped early and the
/// `failed_stage`/`cancelled` fields say why.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub pipeline_id: Uuid,
    pub extraction: Option<ExtractionResult>,
    pub outline: Option<CurriculumOutline>,
    pub assessment: Option<AssessmentSet>,
    /// Queue job ids in submission order, for audit and status lookup.
    pub job_ids: Vec<Uuid>,
    /// Quota violations accumulated across all stages.
    pub violations: Vec<String>,
    pub failed_stage: Option<AgentKind>,
    pub error: Option<JobFailure>,
    pub cancelled: bool,
}

impl PipelineResult {
    pub(crate) fn new(pipeline_id: Uuid) -> Self {
        Self {
            pipeline_id,
            extraction: None,
            outline: None,
            assessment: None,
            job_ids: Vec::new(),
            violations: Vec::new(),
            failed_stage: None,
            error: None,
            cancelled: false,
        }
    }

    /// True when every stage produced its artifact.
    pub fn is_complete(&self) -> bool {
        self.assessment.is_some() && self.error.is_none() && !self.cancelled
    }
}

/// Live view of a pipeline run, shared between the orchestrator and
/// the caller's handle. Cancelling here stops the chain between stages
/// and forwards to whichever job is currently in flight.
pub struct PipelineState {
    pipeline_id: Uuid,
    cancel: CancelToken,
    job_ids: RwLock<Vec<Uuid>>,
    current: RwLock<Option<Uuid>>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            pipeline_id: Uuid::new_v4(),
            cancel: CancelToken::new(),
            job_ids: RwLock::new(Vec::new()),
            current: RwLock::new(None),
        }
    }

    pub fn pipeline_id(&self) -> Uuid {
        self.pipeline_id
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Job ids submitted so far, oldest first.
    pub fn job_ids(&self) -> Vec<Uuid> {
        self.job_ids.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The stage job currently in flight, if any.
    pub fn current_job(&self) -> Option<Uuid> {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn record_job(&self, id: Uuid) {
        self.job_ids.write().unwrap_or_else(|e| e.into_inner()).push(id);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(id);
    }

    fn clear_current(&self) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the three-stage chain over the shared job queue.
pub struct PipelineOrchestrator {
    queue: JobQueue,
    quota_policy: QuotaPolicy,
}

enum StageStep {
    Continue(StageOutput),
    Stop,
}

impl PipelineOrchestrator {
    pub fn new(queue: JobQueue, quota_policy: QuotaPolicy) -> Self {
        Self { queue, quota_policy }
    }

    /// Run the full chain. Never returns an `Err`: every failure mode
    /// is folded into the result so partial artifacts are not lost.
    pub async fn run(&self, request: PipelineRequest, state: Arc<PipelineState>) -> PipelineResult {
        let pipeline_id = state.pipeline_id();
        let mut result = PipelineResult::new(pipeline_id);
        tracing::info!(
            %pipeline_id,
            file_name = %request.file_name,
            subject = %request.subject,
            "Pipeline started"
        );

        if self.stopped_between_stages(&state, &mut result) {
            return self.finish(result);
        }

        // Stage 1: extract.
        let input = StageInput::Extract(ExtractRequest {
            payload: request.payload,
            media_type: request.media_type,
            file_name: request.file_name,
        });
        let extraction = match self.run_stage(input, &state, &mut result).await {
            StageStep::Continue(StageOutput::Extract(extraction)) => extraction,
            StageStep::Continue(other) => return self.wrong_output(result, other),
            StageStep::Stop => return self.finish(result),
        };
        result.extraction = Some(extraction.clone());

        if self.stopped_between_stages(&state, &mut result) {
            return self.finish(result);
        }

        // Stage 2: curriculum.
        let input = StageInput::Curriculum(CurriculumRequest {
            text: extraction.text,
            analysis: extraction.analysis,
            subject: request.subject,
            grade_level: request.grade_level,
        });
        let outline = match self.run_stage(input, &state, &mut result).await {
            StageStep::Continue(StageOutput::Curriculum(outline)) => outline,
            StageStep::Continue(other) => return self.wrong_output(result, other),
            StageStep::Stop => return self.finish(result),
        };
        result.outline = Some(outline.clone());

        if self.stopped_between_stages(&state, &mut result) {
            return self.finish(result);
        }

        // Stage 3: assessment.
        let input = StageInput::Assessment(AssessmentRequest { outline });
        match self.run_stage(input, &state, &mut result).await {
            StageStep::Continue(StageOutput::Assessment(assessment)) => {
                result.assessment = Some(assessment);
            }
            StageStep::Continue(other) => return self.wrong_output(result, other),
            StageStep::Stop => return self.finish(result),
        }

        self.finish(result)
    }

    /// Submit one stage, wait for it and fold its terminal record into
    /// the pipeline result.
    async fn run_stage(
        &self,
        input: StageInput,
        state: &PipelineState,
        result: &mut PipelineResult,
    ) -> StageStep {
        let kind = input.kind();
        let job_id = match self.queue.submit(input) {
            Ok(id) => id,
            Err(e) => {
                result.failed_stage = Some(kind);
                result.error = Some(JobFailure::stage(e.to_string()));
                return StageStep::Stop;
            }
        };
        state.record_job(job_id);
        result.job_ids.push(job_id);

        let job = match self.queue.wait_terminal(job_id).await {
            Ok(job) => job,
            Err(e) => {
                state.clear_current();
                result.failed_stage = Some(kind);
                result.error = Some(JobFailure::stage(e.to_string()));
                return StageStep::Stop;
            }
        };
        state.clear_current();
        result.violations.extend(job.violations.iter().cloned());

        match job.state {
            JobState::Succeeded => self.apply_quota_policy(kind, job, result),
            JobState::Cancelled => {
                result.cancelled = true;
                result.error = job.error;
                StageStep::Stop
            }
            _ => {
                result.failed_stage = Some(kind);
                result.error = job.error;
                StageStep::Stop
            }
        }
    }

    /// A succeeded stage still stops the chain under the abort policy
    /// when it came back annotated. The stage's own artifact is kept.
    fn apply_quota_policy(
        &self,
        kind: AgentKind,
        job: Job,
        result: &mut PipelineResult,
    ) -> StageStep {
        let Some(output) = job.result else {
            result.failed_stage = Some(kind);
            result.error = Some(JobFailure::stage("succeeded job carried no output"));
            return StageStep::Stop;
        };

        if !job.violations.is_empty() && self.quota_policy == QuotaPolicy::Abort {
            tracing::warn!(
                pipeline_id = %result.pipeline_id,
                stage = %kind,
                "Stopping pipeline on quota violations"
            );
            keep_artifact(output, result);
            result.failed_stage = Some(kind);
            result.error = Some(JobFailure::quota(&job.violations));
            return StageStep::Stop;
        }

        StageStep::Continue(output)
    }

    /// Observe a pipeline-level cancel between stages. Downstream
    /// stages are never submitted after the token is set.
    fn stopped_between_stages(
        &self,
        state: &PipelineState,
        result: &mut PipelineResult,
    ) -> bool {
        if state.cancel_token().is_cancelled() {
            result.cancelled = true;
            result.error = Some(JobFailure::cancelled());
            true
        } else {
            false
        }
    }

    fn finish(&self, result: PipelineResult) -> PipelineResult {
        tracing::info!(
            pipeline_id = %result.pipeline_id,
            complete = result.is_complete(),
            cancelled = result.cancelled,
            failed_stage = ?result.failed_stage,
            violations = result.violations.len(),
            "Pipeline finished"
        );
        result
    }

    fn wrong_output(&self, mut result: PipelineResult, output: StageOutput) -> PipelineResult {
        // Unreachable when the queue dispatches by kind, but kept as a
        // structured failure rather than a panic.
        result.failed_stage = Some(output.kind());
        result.error = Some(JobFailure::stage(format!(
            "stage returned unexpected {} output",
            output.kind()
        )));
        self.finish(result)
    }
}

fn keep_artifact(output: StageOutput, result: &mut PipelineResult) {
    match output {
        StageOutput::Extract(e) => result.extraction = Some(e),
        StageOutput::Curriculum(o) => result.outline = Some(o),
        StageOutput::Assessment(a) => result.assessment = Some(a),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::config::PipelineConfig;
    use crate::pipeline::handlers::{
        AssessmentHandler, CurriculumHandler, ExtractHandler, GeneratorClient, GeneratorError,
        StageHandler, TemplateGenerator,
    };
    use crate::pipeline::quota::{ExtractLimits, QuotaLedger, QuotaTable};
    use crate::pipeline::types::FailureKind;

    fn handlers(generator: Arc<dyn GeneratorClient>) -> Vec<Arc<dyn StageHandler>> {
        vec![
            Arc::new(ExtractHandler),
            Arc::new(CurriculumHandler::new(Arc::clone(&generator))),
            Arc::new(AssessmentHandler::new(generator)),
        ]
    }

    fn make_orchestrator(config: PipelineConfig) -> PipelineOrchestrator {
        let ledger = Arc::new(QuotaLedger::new(config.quotas.clone(), config.dry_run));
        let queue = JobQueue::new(&config, ledger, handlers(Arc::new(TemplateGenerator)));
        PipelineOrchestrator::new(queue, config.quota_policy)
    }

    fn sample_request() -> PipelineRequest {
        PipelineRequest {
            payload: b"The photosynthesis experiment confirmed the hypothesis about \
                       photosynthesis in green plants."
                .to_vec(),
            media_type: "text/plain".to_string(),
            file_name: "biology.txt".to_string(),
            subject: "Biology".to_string(),
            grade_level: "8".to_string(),
        }
    }

    #[tokio::test]
    async fn full_chain_produces_all_three_artifacts() {
        let orchestrator = make_orchestrator(PipelineConfig::default());
        let state = Arc::new(PipelineState::new());
        let result = orchestrator.run(sample_request(), Arc::clone(&state)).await;

        assert!(result.is_complete());
        assert_eq!(result.job_ids.len(), 3);
        assert!(result.violations.is_empty());

        let extraction = result.extraction.unwrap();
        assert!(extraction.text.contains("photosynthesis"));
        let outline = result.outline.unwrap();
        assert!(!outline.modules.is_empty());
        let assessment = result.assessment.unwrap();
        assert_eq!(assessment.questions.len(), outline.modules.len() * 2);

        assert_eq!(state.job_ids().len(), 3);
        assert!(state.current_job().is_none());
    }

    #[tokio::test]
    async fn dry_run_chain_returns_canned_artifacts() {
        let config = PipelineConfig { dry_run: true, ..Default::default() };
        let orchestrator = make_orchestrator(config);
        let result = orchestrator
            .run(sample_request(), Arc::new(PipelineState::new()))
            .await;

        assert!(result.is_complete());
        assert!(result.extraction.unwrap().dry_run);
        let outline = result.outline.unwrap();
        assert!(outline.dry_run);
        assert_eq!(outline.modules.len(), 3);
        assert!(result.assessment.unwrap().dry_run);
    }

    #[tokio::test]
    async fn generation_failure_keeps_extraction_artifact() {
        struct FailingGenerator;

        #[async_trait]
        impl GeneratorClient for FailingGenerator {
            async fn generate_outline(
                &self,
                _request: &CurriculumRequest,
            ) -> Result<CurriculumOutline, GeneratorError> {
                Err(GeneratorError::Backend("model unavailable".to_string()))
            }

            async fn generate_assessment(
                &self,
                _request: &AssessmentRequest,
            ) -> Result<AssessmentSet, GeneratorError> {
                Err(GeneratorError::Backend("model unavailable".to_string()))
            }
        }

        let config = PipelineConfig::default();
        let ledger = Arc::new(QuotaLedger::new(config.quotas.clone(), false));
        let queue = JobQueue::new(&config, ledger, handlers(Arc::new(FailingGenerator)));
        let orchestrator = PipelineOrchestrator::new(queue, config.quota_policy);

        let result = orchestrator
            .run(sample_request(), Arc::new(PipelineState::new()))
            .await;

        assert!(!result.is_complete());
        assert!(result.extraction.is_some());
        assert!(result.outline.is_none());
        assert!(result.assessment.is_none());
        assert_eq!(result.failed_stage, Some(AgentKind::Curriculum));
        let error = result.error.unwrap();
        assert_eq!(error.kind, FailureKind::StageFailure);
        assert!(error.message.contains("model unavailable"));
        assert_eq!(result.job_ids.len(), 2);
    }

    fn tight_download_config(policy: QuotaPolicy) -> PipelineConfig {
        PipelineConfig {
            quota_policy: policy,
            quotas: QuotaTable {
                extract: ExtractLimits { max_download_bytes: 10, ..Default::default() },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn advisory_policy_continues_past_violations() {
        let orchestrator = make_orchestrator(tight_download_config(QuotaPolicy::Advisory));
        let result = orchestrator
            .run(sample_request(), Arc::new(PipelineState::new()))
            .await;

        assert!(result.is_complete());
        assert_eq!(result.violations.len(), 1);
        assert!(result.violations[0].starts_with("download_bytes:"));
    }

    #[tokio::test]
    async fn abort_policy_stops_after_annotated_stage() {
        let orchestrator = make_orchestrator(tight_download_config(QuotaPolicy::Abort));
        let result = orchestrator
            .run(sample_request(), Arc::new(PipelineState::new()))
            .await;

        assert!(!result.is_complete());
        // The violating stage's own artifact survives.
        assert!(result.extraction.is_some());
        assert!(result.outline.is_none());
        assert_eq!(result.failed_stage, Some(AgentKind::Extract));
        assert_eq!(result.error.unwrap().kind, FailureKind::QuotaViolation);
        assert_eq!(result.job_ids.len(), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_pipeline_submits_nothing() {
        let orchestrator = make_orchestrator(PipelineConfig::default());
        let state = Arc::new(PipelineState::new());
        state.cancel_token().cancel();

        let result = orchestrator.run(sample_request(), Arc::clone(&state)).await;

        assert!(result.cancelled);
        assert!(result.extraction.is_none());
        assert!(result.outline.is_none());
        assert!(result.assessment.is_none());
        assert!(result.job_ids.is_empty());
    }
}
