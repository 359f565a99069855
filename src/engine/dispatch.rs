//! Dispatcher: the submission and status entry points.
//!
//! The submit path runs synchronously and briefly per request: validate,
//! one admission write, one lock write, then hand off to a spawned
//! runner. Serialization of competing submissions comes entirely from the
//! shared store's atomic primitives, never from an in-process mutex, so
//! the same guarantees hold across independent processes.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tracing::{info, warn};

use crate::error::Result;
use crate::guard::{Admission, IdempotencyGuard};
use crate::kv::KvStore;
use crate::lock::{Acquire, ResourceLock};
use crate::model::{JobId, Submission};
use crate::status::{LockState, StatusPayload, describe};
use crate::store::JobStore;
use crate::telemetry::metrics;

use super::runner::{RunContext, Worker, run_job};

/// TTL knobs for the two shared-store tables.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How long an idempotency record suppresses duplicates (on success;
    /// failure clears it early).
    pub idempotency_ttl: Duration,
    /// Safety-net expiry for a crashed lock holder.
    pub lock_ttl: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl: Duration::from_secs(300),
            lock_ttl: Duration::from_secs(600),
        }
    }
}

/// What happened to a submission. `Duplicate` and `InProgress` are
/// successful idempotent no-ops, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Work accepted; poll or subscribe with this id.
    Accepted { job_id: JobId },
    /// Same logical submission already admitted within the TTL window.
    Duplicate,
    /// Another job currently holds the lock for this resource.
    InProgress,
}

/// Coordinates guard, lock, job store and runners.
#[derive(Clone)]
pub struct Dispatcher {
    store: JobStore,
    guard: IdempotencyGuard,
    lock: ResourceLock,
    worker: Arc<dyn Worker>,
}

impl Dispatcher {
    pub fn new(kv: Arc<dyn KvStore>, worker: Arc<dyn Worker>, config: DispatchConfig) -> Self {
        Self {
            store: JobStore::new(),
            guard: IdempotencyGuard::new(Arc::clone(&kv), config.idempotency_ttl),
            lock: ResourceLock::new(kv, config.lock_ttl),
            worker,
        }
    }

    /// The job store backing this dispatcher, for direct snapshot reads.
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Submit a logical unit of work.
    ///
    /// Control flow: validate → idempotency admission → lock acquisition
    /// → enqueue runner. Each gate reports without retrying.
    pub async fn submit(&self, submission: Submission) -> Result<SubmitOutcome> {
        submission.validate()?;

        let fingerprint = submission.fingerprint();
        let resource_key = submission.resource_key();
        let job_id = JobId::new();

        if self.guard.admit(&fingerprint, job_id).await? == Admission::Duplicate {
            metrics::submissions().add(1, &[KeyValue::new("result", "duplicate")]);
            return Ok(SubmitOutcome::Duplicate);
        }

        let lock_guard = match self.lock.try_acquire(&resource_key).await {
            Ok(Acquire::Acquired(g)) => g,
            Ok(Acquire::AlreadyHeld) => {
                // This admission never ran; leaving its record behind
                // would block a legitimate retry after the holder
                // finishes. Roll it back.
                if let Err(e) = self.guard.forget(&fingerprint, job_id).await {
                    warn!(error = %e, "failed to roll back admission after lock contention");
                }
                metrics::submissions().add(1, &[KeyValue::new("result", "in_progress")]);
                return Ok(SubmitOutcome::InProgress);
            }
            Err(acquire_err) => {
                // Same rollback on a backend failure: the caller is told
                // the submission did not commit, so a retry must not read
                // its own half-written admission as a duplicate.
                if let Err(e) = self.guard.forget(&fingerprint, job_id).await {
                    warn!(error = %e, "failed to roll back admission after lock error");
                }
                return Err(acquire_err);
            }
        };

        let handle = self.store.create(job_id).await;
        info!(%job_id, resource_key, "job accepted");
        metrics::submissions().add(1, &[KeyValue::new("result", "accepted")]);

        tokio::spawn(run_job(RunContext {
            handle,
            worker: Arc::clone(&self.worker),
            guard: self.guard.clone(),
            fingerprint,
            lock_guard,
            submission,
        }));

        Ok(SubmitOutcome::Accepted { job_id })
    }

    /// Client-facing status for a job, optionally consulting the lock for
    /// a resource key. Pure read path.
    pub async fn status(
        &self,
        job_id: JobId,
        resource_key: Option<&str>,
    ) -> Result<StatusPayload> {
        let snapshot = self.store.snapshot(job_id).await;
        let lock_state = match resource_key {
            Some(key) => {
                if self.lock.is_held(key).await? {
                    LockState::Held
                } else {
                    LockState::Absent
                }
            }
            None => LockState::Unknown,
        };
        Ok(describe(snapshot.as_ref(), lock_state))
    }
}
