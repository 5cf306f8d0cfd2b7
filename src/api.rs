//! Service façade wiring configuration, quota ledger, handlers, queue
//! and orchestrator together behind one constructor.
//!
//! Status calls return serializable view types rather than the full
//! internal job record, so the polling surface stays stable while the
//! job model evolves.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::handlers::{
    AssessmentHandler, CurriculumHandler, ExtractHandler, GeneratorClient, StageHandler,
    TemplateGenerator,
};
use crate::pipeline::orchestrator::{
    PipelineOrchestrator, PipelineRequest, PipelineResult, PipelineState,
};
use crate::pipeline::queue::JobQueue;
use crate::pipeline::quota::QuotaLedger;
use crate::pipeline::types::{
    AgentKind, JobFailure, JobState, StageInput, StageOutput,
};

// ═══════════════════════════════════════════
// Views
// ═══════════════════════════════════════════

/// Poll response for one job. `result` and `error` are mutually
/// exclusive; both absent until the job is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusView {
    pub id: Uuid,
    pub kind: AgentKind,
    pub state: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StageOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub violations: Vec<String>,
}

/// Compact listing entry for jobs not yet terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveJobView {
    pub id: Uuid,
    pub kind: AgentKind,
    pub state: JobState,
    pub progress: u8,
}

// ═══════════════════════════════════════════
// Service
// ═══════════════════════════════════════════

/// Entry point for embedding applications. Holds the process-wide
/// queue; in-memory only, nothing survives the process.
pub struct PipelineService {
    queue: JobQueue,
    orchestrator: Arc<PipelineOrchestrator>,
    ledger: Arc<QuotaLedger>,
}

impl PipelineService {
    /// Wire up the full pipeline with the given generation backend.
    pub fn new(config: PipelineConfig, generator: Arc<dyn GeneratorClient>) -> Self {
        let ledger = Arc::new(QuotaLedger::new(config.quotas.clone(), config.dry_run));
        let handlers: Vec<Arc<dyn StageHandler>> = vec![
            Arc::new(ExtractHandler),
            Arc::new(CurriculumHandler::new(Arc::clone(&generator))),
            Arc::new(AssessmentHandler::new(generator)),
        ];
        let queue = JobQueue::new(&config, Arc::clone(&ledger), handlers);
        let orchestrator =
            Arc::new(PipelineOrchestrator::new(queue.clone(), config.quota_policy));
        tracing::info!(
            dry_run = config.dry_run,
            workers = config.workers,
            policy = ?config.quota_policy,
            "Pipeline service ready"
        );
        Self { queue, orchestrator, ledger }
    }

    /// Convenience constructor using the built-in template generator.
    pub fn with_template_generator(config: PipelineConfig) -> Self {
        Self::new(config, Arc::new(TemplateGenerator))
    }

    pub fn is_dry_run(&self) -> bool {
        self.ledger.is_dry_run()
    }

    /// Run the full extract -> curriculum -> assessment chain for one
    /// upload. Returns immediately; the handle observes and controls
    /// the run.
    pub fn submit_pipeline(&self, request: PipelineRequest) -> PipelineHandle {
        let state = Arc::new(PipelineState::new());
        let orchestrator = Arc::clone(&self.orchestrator);
        let task_state = Arc::clone(&state);
        let task: JoinHandle<PipelineResult> =
            tokio::spawn(async move { orchestrator.run(request, task_state).await });
        PipelineHandle { state, queue: self.queue.clone(), task }
    }

    /// Submit a single stage job outside any pipeline.
    pub fn submit_job(&self, input: StageInput) -> Result<Uuid, PipelineError> {
        self.queue.submit(input)
    }

    pub fn job_status(&self, id: Uuid) -> Result<JobStatusView, PipelineError> {
        let job = self.queue.status(id)?;
        Ok(JobStatusView {
            id: job.id,
            kind: job.kind,
            state: job.state,
            progress: job.progress,
            result: job.result,
            error: job.error,
            violations: job.violations,
        })
    }

    pub fn cancel_job(&self, id: Uuid) -> Result<(), PipelineError> {
        self.queue.cancel(id)
    }

    pub fn list_active_jobs(&self) -> Vec<ActiveJobView> {
        self.queue
            .list_active()
            .into_iter()
            .map(|job| ActiveJobView {
                id: job.id,
                kind: job.kind,
                state: job.state,
                progress: job.progress,
            })
            .collect()
    }

    /// Wait until a job is terminal and return its final status view.
    pub async fn wait_job(&self, id: Uuid) -> Result<JobStatusView, PipelineError> {
        self.queue.wait_terminal(id).await?;
        self.job_status(id)
    }

    /// Stop accepting work and cancel everything in flight. Running
    /// pipelines observe the cancellation and finish with partial
    /// results.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}

/// Caller-side handle to one running pipeline.
pub struct PipelineHandle {
    state: Arc<PipelineState>,
    queue: JobQueue,
    task: JoinHandle<PipelineResult>,
}

impl PipelineHandle {
    pub fn pipeline_id(&self) -> Uuid {
        self.state.pipeline_id()
    }

    /// Stage job ids submitted so far, oldest first. Grows as the
    /// pipeline advances.
    pub fn job_ids(&self) -> Vec<Uuid> {
        self.state.job_ids()
    }

    /// Cancel the pipeline: stop the chain between stages and forward
    /// the request to the stage job currently in flight, if any.
    pub fn cancel(&self) {
        self.state.cancel_token().cancel();
        if let Some(current) = self.state.current_job() {
            // AlreadyTerminal just means the stage beat us to the line.
            if let Err(e) = self.queue.cancel(current) {
                tracing::debug!(job_id = %current, error = %e, "Stage cancel skipped");
            }
        }
    }

    /// Wait for the pipeline to finish and take its result.
    pub async fn wait(self) -> PipelineResult {
        let pipeline_id = self.state.pipeline_id();
        match self.task.await {
            Ok(result) => result,
            Err(join_err) => {
                tracing::error!(%pipeline_id, error = %join_err, "Pipeline task failed");
                let mut result = PipelineResult::new(pipeline_id);
                result.job_ids = self.state.job_ids();
                result.error =
                    Some(JobFailure::stage(format!("pipeline task failed: {join_err}")));
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::ExtractRequest;

    fn service(config: PipelineConfig) -> PipelineService {
        PipelineService::with_template_generator(config)
    }

    fn sample_pipeline_request() -> PipelineRequest {
        PipelineRequest {
            payload: b"The photosynthesis experiment confirmed the hypothesis.".to_vec(),
            media_type: "text/plain".to_string(),
            file_name: "lab.txt".to_string(),
            subject: "Biology".to_string(),
            grade_level: "8".to_string(),
        }
    }

    #[tokio::test]
    async fn pipeline_handle_waits_for_complete_result() {
        let service = service(PipelineConfig::default());
        let handle = service.submit_pipeline(sample_pipeline_request());
        let pipeline_id = handle.pipeline_id();

        let result = handle.wait().await;
        assert_eq!(result.pipeline_id, pipeline_id);
        assert!(result.is_complete());
        assert_eq!(result.job_ids.len(), 3);
    }

    #[tokio::test]
    async fn job_status_view_carries_result_after_success() {
        let service = service(PipelineConfig::default());
        let id = service
            .submit_job(StageInput::Extract(ExtractRequest {
                payload: b"plain text".to_vec(),
                media_type: "text/plain".to_string(),
                file_name: "note.txt".to_string(),
            }))
            .unwrap();

        let view = service.wait_job(id).await.unwrap();
        assert_eq!(view.state, JobState::Succeeded);
        assert_eq!(view.progress, 100);
        assert!(view.result.is_some());
        assert!(view.error.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["state"], "succeeded");
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn unknown_job_status_is_not_found() {
        let service = service(PipelineConfig::default());
        let id = Uuid::new_v4();
        assert_eq!(service.job_status(id).unwrap_err(), PipelineError::NotFound(id));
    }

    #[tokio::test]
    async fn dry_run_service_reports_flag_and_canned_results() {
        let config = PipelineConfig { dry_run: true, ..Default::default() };
        let service = service(config);
        assert!(service.is_dry_run());

        let result = service.submit_pipeline(sample_pipeline_request()).wait().await;
        assert!(result.is_complete());
        assert!(result.extraction.unwrap().dry_run);
    }

    #[tokio::test]
    async fn cancelled_pipeline_ends_without_assessment() {
        let service = service(PipelineConfig::default());
        let handle = service.submit_pipeline(sample_pipeline_request());
        handle.cancel();
        let result = handle.wait().await;

        // Cancellation races stage completion; either the run was cut
        // short or it had already finished entirely.
        assert!(result.cancelled || result.is_complete());
        if result.cancelled {
            assert!(result.assessment.is_none());
        }
    }

    #[tokio::test]
    async fn shutdown_rejects_new_jobs() {
        let service = service(PipelineConfig::default());
        service.shutdown();
        let err = service
            .submit_job(StageInput::Extract(ExtractRequest {
                payload: b"late".to_vec(),
                media_type: "text/plain".to_string(),
                file_name: "late.txt".to_string(),
            }))
            .unwrap_err();
        assert_eq!(err, PipelineError::QueueClosed);

        let result = service.submit_pipeline(sample_pipeline_request()).wait().await;
        assert!(!result.is_complete());
    }

    #[tokio::test]
    async fn active_job_listing_shrinks_to_empty() {
        let service = service(PipelineConfig::default());
        let handle = service.submit_pipeline(sample_pipeline_request());
        handle.wait().await;
        assert!(service.list_active_jobs().is_empty());
    }
}
