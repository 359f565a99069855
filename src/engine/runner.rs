//! Job runner: drives one job from Pending to a terminal state.
//!
//! The runner is the only writer of its job's state. Whatever happens —
//! clean completion, a failing work unit, a panic inside the worker — the
//! run ends in exactly one terminal transition followed by one lock
//! release. Runner failures never propagate to the submission path.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use serde_json::json;
use tracing::{Instrument, error, info, warn};

use crate::guard::IdempotencyGuard;
use crate::lock::LockGuard;
use crate::model::Submission;
use crate::store::JobHandle;
use crate::telemetry::job::{record_state_transition, start_job_span};
use crate::telemetry::metrics;

/// The pluggable unit of work. One call per item; the runner owns
/// progress reporting and terminal-state bookkeeping.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn process_item(&self, user_id: i64, item: i64) -> anyhow::Result<()>;
}

/// Everything a runner needs for one job.
pub(crate) struct RunContext {
    pub handle: Arc<JobHandle>,
    pub worker: Arc<dyn Worker>,
    pub guard: IdempotencyGuard,
    pub fingerprint: String,
    pub lock_guard: LockGuard,
    pub submission: Submission,
}

/// How a run ended. Decides the terminal transition and the fate of the
/// idempotency record.
enum RunOutcome {
    Success { total_items: u32 },
    Failure { error: String },
    Ignored,
}

impl RunOutcome {
    fn label(&self) -> &'static str {
        match self {
            RunOutcome::Success { .. } => "success",
            RunOutcome::Failure { .. } => "failure",
            RunOutcome::Ignored => "ignored",
        }
    }
}

/// Execute one job to its terminal state.
pub(crate) async fn run_job(ctx: RunContext) {
    let RunContext {
        handle,
        worker,
        guard,
        fingerprint,
        lock_guard,
        submission,
    } = ctx;

    let span = start_job_span(&handle.id().0);
    let started = Instant::now();

    async {
        let job_id = handle.id();
        let outcome = execute(&handle, &worker, &guard, &fingerprint, &submission).await;

        match &outcome {
            RunOutcome::Success { total_items } => {
                record_state_transition(&tracing::Span::current(), "progress", "success");
                info!(%job_id, total_items, "job completed");
                let result = json!({
                    "message": "processing complete",
                    "total_items": total_items,
                });
                if let Err(e) = handle.succeed(result).await {
                    error!(%job_id, error = %e, "failed to mark job succeeded");
                }
                // Ledger record stays until its TTL so a repeat of the
                // completed submission still reads as a duplicate.
            }
            RunOutcome::Failure { error: detail } => {
                record_state_transition(&tracing::Span::current(), "progress", "failure");
                error!(%job_id, error = %detail, "job failed");
                if let Err(e) = handle.fail(detail.clone()).await {
                    error!(%job_id, error = %e, "failed to mark job failed");
                }
                // Clear the ledger record so the submission is retryable.
                if let Err(e) = guard.forget(&fingerprint, job_id).await {
                    warn!(%job_id, error = %e, "failed to clear idempotency record");
                }
            }
            RunOutcome::Ignored => {
                record_state_transition(&tracing::Span::current(), "pending", "ignored");
                info!(%job_id, "ledger no longer names this job, ignoring");
                if let Err(e) = handle.ignore("already processed").await {
                    error!(%job_id, error = %e, "failed to mark job ignored");
                }
            }
        }

        // The single release point, reached on every terminal outcome.
        // A process that dies before this line relies on the lock TTL.
        if let Err(e) = lock_guard.release().await {
            warn!(%job_id, error = %e, "lock release failed, TTL will clear it");
        }

        metrics::job_duration_ms().record(
            started.elapsed().as_millis() as f64,
            &[KeyValue::new("outcome", outcome.label())],
        );
    }
    .instrument(span)
    .await
}

/// Run the recheck and the work loop. Terminal transitions happen in the
/// caller; this only reports how things went.
async fn execute(
    handle: &Arc<JobHandle>,
    worker: &Arc<dyn Worker>,
    guard: &IdempotencyGuard,
    fingerprint: &str,
    submission: &Submission,
) -> RunOutcome {
    let job_id = handle.id();
    let total = submission.items.len() as u32;

    // Runner-side dedup recheck. The ledger record can expire between
    // admission and execution and be re-claimed by a newer job; if it no
    // longer names this job, skip the work entirely.
    match guard.confirm(fingerprint, job_id).await {
        Ok(true) => {}
        Ok(false) => return RunOutcome::Ignored,
        Err(e) => {
            // Recheck is defense in depth; the admission already
            // serialized duplicates. Proceed on a store hiccup.
            warn!(%job_id, error = %e, "dedup recheck unavailable, proceeding");
        }
    }

    record_state_transition(&tracing::Span::current(), "pending", "progress");
    if let Err(e) = handle.set_progress(0, total).await {
        error!(%job_id, error = %e, "failed to enter progress state");
        return RunOutcome::Failure {
            error: e.to_string(),
        };
    }

    // The work itself runs in its own task so a panicking worker surfaces
    // as a JoinError instead of unwinding past the lock release.
    let worker = Arc::clone(worker);
    let handle = Arc::clone(handle);
    let submission = submission.clone();
    let work = tokio::spawn(async move {
        for (i, item) in submission.items.iter().enumerate() {
            worker.process_item(submission.user_id, *item).await?;
            handle.set_progress(i as u32 + 1, total).await?;
        }
        Ok::<(), anyhow::Error>(())
    });

    match work.await {
        Ok(Ok(())) => RunOutcome::Success { total_items: total },
        Ok(Err(work_err)) => RunOutcome::Failure {
            error: work_err.to_string(),
        },
        Err(join_err) => RunOutcome::Failure {
            error: format!("worker panicked: {join_err}"),
        },
    }
}
