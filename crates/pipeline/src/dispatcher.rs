//! Queue consumers for the three pipeline stages.
//!
//! Each stage gets its own pool of worker tasks, so a backlog of clip
//! jobs never holds up planning or final renders. Shutdown is two-phase:
//! the shutdown token stops new pops, then in-flight handlers get
//! `drain_timeout` to finish before their abort token fires.

use std::time::Duration;

use clipforge_db::models::job::JobKind;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::clip::handle_process_clip;
use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::finalize::handle_render_final;
use crate::plan::handle_plan;
use crate::queue::QueueJob;

pub const DEFAULT_WORKERS_PER_STAGE: usize = 5;
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// How long one blocking pop waits before re-checking shutdown.
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a queue error before popping again.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct Dispatcher {
    ctx: PipelineContext,
    workers_per_stage: usize,
    drain_timeout: Duration,
    poll_timeout: Duration,
}

impl Dispatcher {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            workers_per_stage: DEFAULT_WORKERS_PER_STAGE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn with_workers_per_stage(mut self, workers: usize) -> Self {
        self.workers_per_stage = workers.max(1);
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Consume all stage queues until `shutdown` fires, then drain.
    pub async fn run(&self, shutdown: CancellationToken) {
        let abort = CancellationToken::new();
        let mut workers = JoinSet::new();

        for kind in JobKind::ALL {
            for worker in 0..self.workers_per_stage {
                workers.spawn(worker_loop(
                    self.ctx.clone(),
                    kind,
                    worker,
                    self.poll_timeout,
                    shutdown.clone(),
                    abort.clone(),
                ));
            }
        }
        tracing::info!(
            workers_per_stage = self.workers_per_stage,
            poll_timeout_secs = self.poll_timeout.as_secs(),
            "Dispatcher started",
        );

        shutdown.cancelled().await;
        tracing::info!(
            drain_timeout_secs = self.drain_timeout.as_secs(),
            "Dispatcher draining in-flight jobs",
        );

        if tokio::time::timeout(self.drain_timeout, join_all(&mut workers))
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = workers.len(),
                "Drain timeout elapsed, aborting in-flight jobs",
            );
            abort.cancel();
            join_all(&mut workers).await;
        }

        tracing::info!("Dispatcher stopped");
    }
}

async fn join_all(workers: &mut JoinSet<()>) {
    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }
}

async fn worker_loop(
    ctx: PipelineContext,
    kind: JobKind,
    worker: usize,
    poll_timeout: Duration,
    shutdown: CancellationToken,
    abort: CancellationToken,
) {
    tracing::debug!(stage = %kind, worker, "Worker started");

    // A pop is never dropped mid-flight: a popped message is already off
    // the list. Shutdown is noticed between pops, bounded by `poll_timeout`.
    while !shutdown.is_cancelled() {
        match ctx.queue.dequeue(kind, poll_timeout).await {
            Ok(Some(job)) => execute(&ctx, &job, &abort).await,
            Ok(None) => {}
            Err(e) => {
                tracing::error!(stage = %kind, worker, error = %e, "Queue pop failed");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(QUEUE_ERROR_BACKOFF) => {}
                }
            }
        }
    }

    tracing::debug!(stage = %kind, worker, "Worker stopped");
}

/// Run one job and record the outcome on its audit row.
pub async fn execute(ctx: &PipelineContext, job: &QueueJob, cancel: &CancellationToken) {
    let record = match ctx.store.start_job(&job.record()).await {
        Ok(record) => record,
        Err(e) => {
            tracing::error!(job_id = %job.id, stage = %job.kind, error = %e, "Failed to start job");
            return;
        }
    };
    tracing::info!(
        job_id = %job.id,
        stage = %job.kind,
        project_id = %job.project_id,
        attempt = record.attempts,
        "Job started",
    );

    let outcome = match handle(ctx, job, cancel).await {
        Ok(()) => {
            tracing::info!(job_id = %job.id, stage = %job.kind, "Job succeeded");
            ctx.store.complete_job(job.id).await
        }
        Err(e) => {
            if e.is_cancelled() {
                tracing::warn!(job_id = %job.id, stage = %job.kind, "Job aborted by shutdown");
            } else {
                tracing::error!(job_id = %job.id, stage = %job.kind, error = %e, "Job failed");
            }
            ctx.store.fail_job(job.id, &e.to_string()).await
        }
    };
    if let Err(e) = outcome {
        tracing::error!(job_id = %job.id, error = %e, "Failed to record job outcome");
    }
}

/// Route a job to its stage handler.
pub async fn handle(
    ctx: &PipelineContext,
    job: &QueueJob,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    match job.kind {
        JobKind::Plan => handle_plan(ctx, job, cancel).await,
        JobKind::ProcessClip => handle_process_clip(ctx, job, cancel).await,
        JobKind::RenderFinal => handle_render_final(ctx, job, cancel).await,
    }
}
