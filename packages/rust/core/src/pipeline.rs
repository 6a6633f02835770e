//! Job orchestration: `run` a new job or `resume` an existing one.
//!
//! A job moves through its states one persisted transition at a time, so a
//! crash leaves it in the last completed state and `resume` picks up from
//! there. Each step is idempotent with respect to what is already stored:
//! chunks are never re-created and complete chunks are never regenerated.
//!
//! The driving worker renews its claim before every step, chunk and retry,
//! and stops with [`RecastError::JobClaimed`] once another worker holds it.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use recast_oracle::Oracle;
use recast_shared::{
    Job, JobId, JobStatus, LengthMode, PipelineConfig, RecastError, Result, StitchReport,
    word_count,
};
use recast_storage::{NewJob, Storage};

use crate::planner::plan_length;
use crate::processor::process_chunks;
use crate::segmenter::build_chunks;
use crate::skeleton::extract_skeleton;
use crate::stitcher::stitch;

/// Inputs for a new job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub input_text: String,
    pub custom_instructions: String,
    /// Desired output length; `None` keeps the input length.
    pub target_words: Option<u32>,
    pub owner: String,
}

/// Result of a finished job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub final_output: String,
    pub final_word_count: u32,
    pub target_mid_words: u32,
    pub length_mode: LengthMode,
    pub chunk_count: u32,
    /// Chunks that ran out of retries below their minimum length.
    pub under_target_chunks: u32,
    pub stitch_report: Option<StitchReport>,
    /// Whether the job ran against the fallback skeleton.
    pub default_skeleton: bool,
    /// Time spent in this call.
    pub elapsed: Duration,
}

impl JobOutcome {
    fn from_job(job: Job, elapsed: Duration) -> Result<Self> {
        let final_output = job.final_output.ok_or_else(|| {
            RecastError::Storage(format!("job {} is complete but has no final output", job.id))
        })?;
        Ok(Self {
            job_id: job.id,
            final_word_count: job
                .final_word_count
                .unwrap_or_else(|| word_count(&final_output)),
            final_output,
            target_mid_words: job.plan.target_mid_words,
            length_mode: job.plan.length_mode,
            chunk_count: job.plan.chunk_count,
            under_target_chunks: job.under_target_chunks.unwrap_or(0),
            stitch_report: job.stitch_report,
            default_skeleton: job.skeleton.as_ref().is_some_and(|s| s.is_default()),
            elapsed,
        })
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for CLI/TUI integration.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a chunk's first oracle call.
    fn chunk_started(&self, index: u32, total: u32);
    /// Called before each expansion retry (`attempt` starts at 1).
    fn chunk_retry(&self, index: u32, attempt: u32);
    /// Called once a chunk is persisted as complete.
    fn chunk_finished(&self, index: u32, words: u32, under_target: bool);
    /// Called when the job completes.
    fn done(&self, outcome: &JobOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn chunk_started(&self, _index: u32, _total: u32) {}
    fn chunk_retry(&self, _index: u32, _attempt: u32) {}
    fn chunk_finished(&self, _index: u32, _words: u32, _under_target: bool) {}
    fn done(&self, _outcome: &JobOutcome) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Borrowed collaborators for one drive of one job.
pub(crate) struct JobRun<'a, O> {
    pub storage: &'a Storage,
    pub oracle: &'a O,
    pub config: &'a PipelineConfig,
    pub progress: &'a dyn ProgressReporter,
    pub cancel: &'a CancellationToken,
    pub worker_id: &'a str,
}

impl<O> JobRun<'_, O> {
    /// Fail with [`RecastError::Cancelled`] if cancellation was requested.
    pub fn check_cancelled(&self, job_id: &JobId, next_chunk: u32) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(RecastError::Cancelled {
                job_id: job_id.to_string(),
                next_chunk,
            });
        }
        Ok(())
    }

    /// Extend this worker's lease, failing with [`RecastError::JobClaimed`]
    /// once another worker has taken the job over.
    pub async fn renew_claim(&self, job_id: &JobId) -> Result<()> {
        self.storage
            .renew_claim(job_id, self.worker_id, self.config.claim_lease)
            .await
    }
}

/// Drives jobs through their lifecycle against one database and one oracle.
pub struct Orchestrator<O> {
    storage: Storage,
    oracle: O,
    config: PipelineConfig,
    worker_id: String,
}

impl<O: Oracle> Orchestrator<O> {
    pub fn new(storage: Storage, oracle: O, config: PipelineConfig) -> Self {
        Self {
            storage,
            oracle,
            config,
            worker_id: format!("worker-{}", Uuid::now_v7()),
        }
    }

    /// Use a fixed worker id for claims instead of a generated one.
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Plan and persist a new job in `pending` state without driving it.
    pub async fn create_job(&self, request: &JobRequest) -> Result<Job> {
        let input_words = word_count(&request.input_text);
        let plan = plan_length(input_words, request.target_words, self.config.segment_words)?;

        let new_job = NewJob {
            id: JobId::new(),
            owner: request.owner.clone(),
            input_text: request.input_text.clone(),
            custom_instructions: request.custom_instructions.clone(),
            requested_words: request.target_words,
            plan,
        };
        self.storage.insert_job(&new_job).await?;

        info!(
            job_id = %new_job.id,
            input_words,
            target = new_job.plan.target_mid_words,
            mode = %new_job.plan.length_mode,
            chunks = new_job.plan.chunk_count,
            "job created"
        );
        self.storage.require_job(&new_job.id).await
    }

    /// Create a job and drive it to completion.
    #[instrument(skip_all, fields(owner = %request.owner))]
    pub async fn run(
        &self,
        request: &JobRequest,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome> {
        let start = Instant::now();
        progress.phase("Planning");
        let job = self.create_job(request).await?;
        self.drive(&job.id, start, progress, cancel).await
    }

    /// Continue a job from its last persisted state.
    ///
    /// A `complete` job is returned as stored, without claiming or writing.
    #[instrument(skip_all, fields(%job_id))]
    pub async fn resume(
        &self,
        job_id: &JobId,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome> {
        let start = Instant::now();
        let job = self.storage.require_job(job_id).await?;
        if job.status == JobStatus::Complete {
            info!("job already complete");
            let outcome = JobOutcome::from_job(job, start.elapsed())?;
            progress.done(&outcome);
            return Ok(outcome);
        }
        self.drive(job_id, start, progress, cancel).await
    }

    /// Claim the job, advance it to completion, and always release the claim.
    async fn drive(
        &self,
        job_id: &JobId,
        start: Instant,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome> {
        self.storage
            .claim_job(job_id, &self.worker_id, self.config.claim_lease)
            .await?;

        let run = JobRun {
            storage: &self.storage,
            oracle: &self.oracle,
            config: &self.config,
            progress,
            cancel,
            worker_id: &self.worker_id,
        };
        let result = self.advance(&run, job_id).await;

        match &result {
            Ok(_) => {}
            Err(RecastError::Cancelled { next_chunk, .. }) => {
                info!(next_chunk, "job cancelled, progress kept for resume");
            }
            Err(RecastError::JobClaimed { owner, .. }) => {
                warn!(%owner, "lost claim to another worker, stopping");
            }
            Err(e) => {
                warn!(error = %e, "job stopped");
                if let Err(write_err) = self.storage.record_job_error(job_id, Some(&e.to_string())).await {
                    warn!(error = %write_err, "could not record job error");
                }
            }
        }
        if let Err(e) = self.storage.release_job(job_id, &self.worker_id).await {
            warn!(error = %e, "could not release job claim");
        }

        let job = result?;
        let outcome = JobOutcome::from_job(job, start.elapsed())?;
        progress.done(&outcome);
        Ok(outcome)
    }

    /// Step the job's state machine until it reaches `complete`.
    async fn advance(&self, run: &JobRun<'_, O>, job_id: &JobId) -> Result<Job> {
        let mut job = self.storage.require_job(job_id).await?;
        if job.status.is_in_progress() {
            info!(status = %job.status, "re-entering interrupted step");
            self.storage
                .transition_job(job_id, job.status, job.status)
                .await?;
        }

        loop {
            run.renew_claim(job_id).await?;
            match job.status {
                JobStatus::Pending | JobStatus::ChunksCreated | JobStatus::ChunksComplete => {}
                JobStatus::ExtractingSkeleton => {
                    if job.skeleton.is_none() {
                        run.progress.phase("Extracting skeleton");
                        extract_skeleton(
                            &self.oracle,
                            &self.storage,
                            &job,
                            self.config.skeleton_word_limit,
                        )
                        .await?;
                    }
                }
                JobStatus::SkeletonComplete => {
                    run.progress.phase("Creating chunks");
                    let chunks = build_chunks(&job.input_text, &job.plan, self.config.segment_words);
                    let inserted = self.storage.insert_chunks(job_id, &chunks).await?;
                    debug!(inserted, planned = chunks.len(), "chunks created");
                }
                JobStatus::ProcessingChunks => {
                    run.progress.phase("Processing chunks");
                    process_chunks(run, &job).await?;
                }
                JobStatus::Stitching => {
                    run.progress.phase("Stitching");
                    // Completing the stitch moves the job to `complete`.
                    stitch(run, &job).await?;
                    job = self.storage.require_job(job_id).await?;
                    continue;
                }
                JobStatus::Complete => return Ok(job),
            }

            self.step(job_id, job.status).await?;
            job = self.storage.require_job(job_id).await?;
        }
    }

    async fn step(&self, job_id: &JobId, from: JobStatus) -> Result<()> {
        let to = from.successor().ok_or_else(|| RecastError::InvalidTransition {
            from: from.to_string(),
            to: "<none>".into(),
        })?;
        self.storage.transition_job(job_id, from, to).await
    }
}
