//! Background import runner
//!
//! Jobs are handed off through a bounded channel and consumed by a single
//! task, one at a time (sequential to prevent DB overload). The triggering
//! request only ever holds the job id; it never awaits execution.
//!
//! Every failure path converges on the `failed` transition. Marking a job
//! failed is best-effort: a store error at that point is logged, never
//! re-raised, so the runner itself cannot crash on a failing job.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::queries;
use crate::services::cancellation::CancellationRegistry;
use crate::services::csv_import;
use crate::services::jobs::staged_path;
use crate::services::notifier::Notifier;
use crate::types::ImportEvent;

/// Capacity of the scheduling channel; enqueueing applies back-pressure to
/// the upload endpoint once this many jobs are waiting.
const QUEUE_CAPACITY: usize = 64;

/// One scheduled import execution
#[derive(Debug, Clone)]
pub struct ImportTask {
    pub job_id: Uuid,
    pub project_id: Uuid,
    pub file_name: String,
}

/// Handle used by the upload endpoint to schedule a job exactly once
#[derive(Clone)]
pub struct ImportScheduler {
    tx: mpsc::Sender<ImportTask>,
}

impl ImportScheduler {
    /// Hand a job off to the runner. Suspends only while the queue is full.
    pub async fn enqueue(&self, task: ImportTask) -> Result<()> {
        self.tx
            .send(task)
            .await
            .map_err(|_| anyhow!("import runner is not running"))
    }
}

struct RunnerContext {
    pool: PgPool,
    notifier: Notifier,
    cancellations: CancellationRegistry,
    imports_dir: PathBuf,
    timeout: Duration,
}

/// Spawn the runner task and return the scheduler feeding it
pub fn start(
    pool: PgPool,
    notifier: Notifier,
    cancellations: CancellationRegistry,
    config: &Config,
) -> ImportScheduler {
    let (tx, mut rx) = mpsc::channel::<ImportTask>(QUEUE_CAPACITY);

    let ctx = Arc::new(RunnerContext {
        pool,
        notifier,
        cancellations,
        imports_dir: config.imports_dir.clone(),
        timeout: Duration::from_secs(config.import_timeout_secs),
    });

    tokio::spawn(async move {
        info!("Import runner started");
        while let Some(task) = rx.recv().await {
            run_import(&ctx, task).await;
        }
        info!("Import runner stopped");
    });

    ImportScheduler { tx }
}

/// Execute one job through its state machine. Never returns an error: any
/// failure is recorded on the job itself.
async fn run_import(ctx: &RunnerContext, task: ImportTask) {
    let job_id = task.job_id;
    info!("Processing import job {} ({})", job_id, task.file_name);

    // Resolve the owning identity for event addressing; an unresolvable
    // owner disables notification but never the import itself.
    let owner = match queries::project::find_owner(&ctx.pool, task.project_id).await {
        Ok(owner) => owner,
        Err(e) => {
            warn!("Owner lookup failed for job {}: {}", job_id, e);
            None
        }
    };

    // Cancelled while still queued
    if ctx.cancellations.is_cancelled(&job_id) {
        ctx.cancellations.remove(&job_id);
        fail_job(ctx, job_id, owner, "import cancelled").await;
        return;
    }

    let path = staged_path(&ctx.imports_dir, job_id);
    if tokio::fs::metadata(&path).await.is_err() {
        // No staged file: fail directly, nothing is parsed or persisted
        fail_job(ctx, job_id, owner, "staged file not found").await;
        return;
    }

    if let Err(e) = queries::job::mark_processing(&ctx.pool, job_id).await {
        fail_job(ctx, job_id, owner, &format!("{:#}", e)).await;
        return;
    }

    let _guard = ctx
        .cancellations
        .register(job_id, owner.unwrap_or_else(Uuid::nil));

    ctx.notifier.notify(
        owner,
        ImportEvent::Started {
            job_id,
            file_name: task.file_name.clone(),
        },
    );

    let result = tokio::time::timeout(
        ctx.timeout,
        csv_import::process_file(
            &ctx.pool,
            &ctx.notifier,
            &ctx.cancellations,
            path,
            job_id,
            task.project_id,
            owner,
        ),
    )
    .await;

    match result {
        Ok(Ok(summary)) => {
            if let Err(e) =
                queries::job::mark_completed(&ctx.pool, job_id, summary.total_rows() as i32).await
            {
                fail_job(ctx, job_id, owner, &format!("{:#}", e)).await;
                return;
            }
            info!(
                "Import job {} completed: {} accepted, {} rejected",
                job_id, summary.accepted, summary.rejected
            );
            ctx.notifier.notify(
                owner,
                ImportEvent::Completed {
                    job_id,
                    accepted: summary.accepted,
                    rejected: summary.rejected,
                },
            );
        }
        Ok(Err(e)) => {
            fail_job(ctx, job_id, owner, &format!("{:#}", e)).await;
        }
        Err(_) => {
            fail_job(
                ctx,
                job_id,
                owner,
                &format!("import timed out after {:?}", ctx.timeout),
            )
            .await;
        }
    }
}

/// Record failure on the job and tell the owner. The transition itself must
/// not throw: a store error here is logged and swallowed.
async fn fail_job(ctx: &RunnerContext, job_id: Uuid, owner: Option<Uuid>, reason: &str) {
    warn!("Import job {} failed: {}", job_id, reason);

    if let Err(e) = queries::job::mark_failed(&ctx.pool, job_id).await {
        error!("Failed to mark job {} as failed: {}", job_id, e);
    }

    ctx.notifier.notify(
        owner,
        ImportEvent::Failed {
            job_id,
            error: reason.to_string(),
        },
    );
}
