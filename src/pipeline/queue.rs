//! Asynchronous job queue and worker pool.
//!
//! Jobs move through a fixed state machine:
//!
//! ```text
//! pending ──> running ──> succeeded
//!    │           ├──────> failed
//!    └───────────┴──────> cancelled
//! ```
//!
//! A fair semaphore caps concurrent execution at the configured worker
//! count; waiters acquire permits in submission order, so scheduling is
//! FIFO. The queue exclusively owns every state transition. Handlers
//! influence a job only through its returned `Result` and through the
//! [`JobContext`] progress/cancellation channel.
//!
//! Two time limits guard each running stage. The soft limit logs a
//! warning and flips a flag the handler can observe through its
//! context. The hard limit aborts the handler task, sets the cancel
//! token so blocking extraction loops unwind, and fails the job with a
//! timeout failure.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::PipelineError;

use super::dry_run;
use super::handlers::StageHandler;
use super::quota::{QuotaLedger, UsageSample};
use super::types::{
    AgentKind, CancelToken, FailureKind, Job, JobFailure, JobState, StageInput, StageOutput,
};

/// One tracked job plus its control handles.
struct JobEntry {
    job: Job,
    cancel: CancelToken,
    /// Notified on every transition into a terminal state.
    done: Arc<Notify>,
}

struct QueueInner {
    jobs: RwLock<HashMap<Uuid, JobEntry>>,
    /// Fair permit pool sized to the worker count.
    permits: Arc<Semaphore>,
    handlers: HashMap<AgentKind, Arc<dyn StageHandler>>,
    ledger: Arc<QuotaLedger>,
    soft_timeout_ms: u64,
    hard_timeout_ms: u64,
    shutdown: AtomicBool,
}

/// Handle given to a running handler: progress reporting and the
/// cooperative cancellation signal for exactly one job.
#[derive(Clone)]
pub struct JobContext {
    job_id: Uuid,
    queue: Weak<QueueInner>,
    cancel: CancelToken,
    soft_exceeded: Arc<AtomicBool>,
}

impl JobContext {
    /// Record forward progress, 0..=100. Values at or below the current
    /// mark are ignored so observers always see a monotonic sequence.
    pub fn report_progress(&self, progress: u8) {
        if let Some(inner) = self.queue.upgrade() {
            inner.set_progress(self.job_id, progress);
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether this job has run past its soft time limit. Handlers may
    /// use it to cut optional work short; nothing forces them to.
    pub fn soft_limit_exceeded(&self) -> bool {
        self.soft_exceeded.load(Ordering::Relaxed)
    }

    /// Context wired to no queue; progress reports go nowhere.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            job_id: Uuid::new_v4(),
            queue: Weak::new(),
            cancel: CancelToken::new(),
            soft_exceeded: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Shared, cloneable handle to the worker pool.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl JobQueue {
    pub fn new(
        config: &PipelineConfig,
        ledger: Arc<QuotaLedger>,
        handlers: Vec<Arc<dyn StageHandler>>,
    ) -> Self {
        let handlers = handlers.into_iter().map(|h| (h.kind(), h)).collect();
        Self {
            inner: Arc::new(QueueInner {
                jobs: RwLock::new(HashMap::new()),
                permits: Arc::new(Semaphore::new(config.workers.max(1))),
                handlers,
                ledger,
                soft_timeout_ms: config.soft_timeout_ms,
                hard_timeout_ms: config.hard_timeout_ms,
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Enqueue a job and schedule it on the worker pool. Returns the
    /// job id immediately; execution is fully asynchronous.
    pub fn submit(&self, input: StageInput) -> Result<Uuid, PipelineError> {
        if self.inner.shutdown.load(Ordering::Relaxed) {
            return Err(PipelineError::QueueClosed);
        }

        let id = Uuid::new_v4();
        let job = Job::new(id, input);
        let kind = job.kind;
        {
            let mut jobs = self.inner.jobs.write().unwrap_or_else(|e| e.into_inner());
            jobs.insert(
                id,
                JobEntry { job, cancel: CancelToken::new(), done: Arc::new(Notify::new()) },
            );
        }
        tracing::info!(job_id = %id, kind = %kind, "Job submitted");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            // Permit held for the whole run; errors only occur if the
            // semaphore is closed, which the queue never does.
            let Ok(_permit) = Arc::clone(&inner.permits).acquire_owned().await else {
                return;
            };
            inner.run_job(id).await;
        });

        Ok(id)
    }

    /// Snapshot of a job's current record.
    pub fn status(&self, id: Uuid) -> Result<Job, PipelineError> {
        let jobs = self.inner.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(&id).map(|e| e.job.clone()).ok_or(PipelineError::NotFound(id))
    }

    /// All jobs not yet in a terminal state, pending included.
    pub fn list_active(&self) -> Vec<Job> {
        let jobs = self.inner.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.values()
            .filter(|e| !e.job.state.is_terminal())
            .map(|e| e.job.clone())
            .collect()
    }

    /// Request cancellation. A pending job is finalized immediately; a
    /// running job gets its token set and finishes at the handler's
    /// next checkpoint, or at the hard time limit.
    pub fn cancel(&self, id: Uuid) -> Result<(), PipelineError> {
        let mut jobs = self.inner.jobs.write().unwrap_or_else(|e| e.into_inner());
        let entry = jobs.get_mut(&id).ok_or(PipelineError::NotFound(id))?;

        if entry.job.state.is_terminal() {
            return Err(PipelineError::AlreadyTerminal(id));
        }

        entry.cancel.cancel();
        if entry.job.state == JobState::Pending {
            finalize_entry(entry, JobState::Cancelled, None, Some(JobFailure::cancelled()));
            tracing::info!(job_id = %id, "Pending job cancelled");
        } else {
            tracing::info!(job_id = %id, "Cancellation requested for running job");
        }
        Ok(())
    }

    /// Wait until the job reaches a terminal state, then return its
    /// final record. Returns immediately if it is already terminal.
    pub async fn wait_terminal(&self, id: Uuid) -> Result<Job, PipelineError> {
        loop {
            let done = {
                let jobs = self.inner.jobs.read().unwrap_or_else(|e| e.into_inner());
                let entry = jobs.get(&id).ok_or(PipelineError::NotFound(id))?;
                if entry.job.state.is_terminal() {
                    return Ok(entry.job.clone());
                }
                Arc::clone(&entry.done)
            };

            // Register with the notifier before the state re-check so a
            // transition between check and await cannot be missed.
            let mut notified = pin!(done.notified());
            notified.as_mut().enable();
            {
                let jobs = self.inner.jobs.read().unwrap_or_else(|e| e.into_inner());
                if let Some(entry) = jobs.get(&id) {
                    if entry.job.state.is_terminal() {
                        return Ok(entry.job.clone());
                    }
                }
            }
            notified.await;
        }
    }

    /// Stop accepting submissions and cancel everything in flight.
    /// Pending jobs are finalized immediately; running jobs observe
    /// their tokens and wind down.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Relaxed);
        let mut jobs = self.inner.jobs.write().unwrap_or_else(|e| e.into_inner());
        for entry in jobs.values_mut() {
            if entry.job.state.is_terminal() {
                continue;
            }
            entry.cancel.cancel();
            if entry.job.state == JobState::Pending {
                finalize_entry(entry, JobState::Cancelled, None, Some(JobFailure::cancelled()));
            }
        }
        tracing::info!("Job queue shut down");
    }
}

impl QueueInner {
    async fn run_job(self: &Arc<Self>, id: Uuid) {
        // Claim the job: pending -> running. Anything else means it was
        // cancelled while queued.
        let (input, kind, cancel) = {
            let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
            let Some(entry) = jobs.get_mut(&id) else { return };
            if entry.job.state != JobState::Pending {
                return;
            }
            if entry.cancel.is_cancelled() {
                finalize_entry(entry, JobState::Cancelled, None, Some(JobFailure::cancelled()));
                return;
            }
            entry.job.state = JobState::Running;
            entry.job.started_at = Some(chrono::Utc::now());
            (entry.job.input.clone(), entry.job.kind, entry.cancel.clone())
        };
        tracing::debug!(job_id = %id, kind = %kind, "Job running");

        if self.ledger.is_dry_run() {
            let output = dry_run::simulate(kind);
            self.complete(id, output, UsageSample::default());
            return;
        }

        let Some(handler) = self.handlers.get(&kind).map(Arc::clone) else {
            self.fail(id, JobFailure::stage(format!("no handler registered for {kind}")));
            return;
        };

        let soft_exceeded = Arc::new(AtomicBool::new(false));
        let ctx = JobContext {
            job_id: id,
            queue: Arc::downgrade(self),
            cancel: cancel.clone(),
            soft_exceeded: Arc::clone(&soft_exceeded),
        };
        let soft_ms = self.soft_timeout_ms;
        let hard_ms = self.hard_timeout_ms;

        let watchdog: JoinHandle<()> = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(soft_ms)).await;
            soft_exceeded.store(true, Ordering::Relaxed);
            tracing::warn!(job_id = %id, soft_ms, "Job exceeded soft time limit");
        });

        // The handler runs in its own task so a panic is isolated into
        // a JoinError instead of taking the worker down.
        let mut stage = tokio::spawn(async move { handler.run(input, ctx).await });
        let outcome = tokio::time::timeout(Duration::from_millis(hard_ms), &mut stage).await;
        watchdog.abort();

        match outcome {
            Err(_) => {
                stage.abort();
                cancel.cancel();
                self.fail(id, JobFailure::timeout(hard_ms));
            }
            Ok(Err(join_err)) => {
                self.fail(id, JobFailure::stage(format!("stage task panicked: {join_err}")));
            }
            Ok(Ok(Err(failure))) => self.fail(id, failure),
            Ok(Ok(Ok(outcome))) => self.complete(id, outcome.output, outcome.usage),
        }
    }

    /// Succeed a job, annotating any quota violations observed.
    fn complete(&self, id: Uuid, output: StageOutput, usage: UsageSample) {
        let report = self.ledger.validate(output.kind(), &usage);
        if !report.within_limits {
            tracing::warn!(
                job_id = %id,
                violations = ?report.violations,
                "Job completed over quota"
            );
        }

        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = jobs.get_mut(&id) {
            if entry.job.state.is_terminal() {
                tracing::debug!(job_id = %id, state = %entry.job.state, "Ignoring completion of terminal job");
                return;
            }
            entry.job.violations = report.violations;
            finalize_entry(entry, JobState::Succeeded, Some(output), None);
            tracing::info!(job_id = %id, "Job succeeded");
        }
    }

    fn fail(&self, id: Uuid, failure: JobFailure) {
        let state = if failure.kind == FailureKind::Cancelled {
            JobState::Cancelled
        } else {
            JobState::Failed
        };
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = jobs.get_mut(&id) {
            if entry.job.state.is_terminal() {
                tracing::debug!(job_id = %id, state = %entry.job.state, "Ignoring failure of terminal job");
                return;
            }
            tracing::warn!(job_id = %id, state = %state, error = %failure, "Job finished abnormally");
            finalize_entry(entry, state, None, Some(failure));
        }
    }

    fn set_progress(&self, id: Uuid, progress: u8) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = jobs.get_mut(&id) else { return };
        if entry.job.state != JobState::Running {
            return;
        }
        let progress = progress.min(100);
        if progress <= entry.job.progress {
            tracing::debug!(
                job_id = %id,
                current = entry.job.progress,
                reported = progress,
                "Ignoring non-increasing progress report"
            );
            return;
        }
        entry.job.progress = progress;
    }
}

/// The single point where jobs become terminal. Success pins progress
/// at 100; every path notifies terminal-state waiters.
fn finalize_entry(
    entry: &mut JobEntry,
    state: JobState,
    result: Option<StageOutput>,
    error: Option<JobFailure>,
) {
    entry.job.state = state;
    entry.job.result = result;
    entry.job.error = error;
    entry.job.finished_at = Some(chrono::Utc::now());
    if state == JobState::Succeeded {
        entry.job.progress = 100;
    }
    entry.done.notify_waiters();
}
