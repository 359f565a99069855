//! In-process job store: the executor backend's queryable state.
//!
//! Single source of truth for job state. Mutation goes exclusively
//! through the [`JobHandle`] owned by the executing runner; everything
//! else (poll endpoint, push relay) reads snapshots. Terminal jobs are
//! immutable and are swept by [`JobStore::purge_terminal`] according to
//! whatever retention the embedding process wants.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::{JobId, JobState, Progress};
use crate::telemetry::metrics;

/// Point-in-time view of a job. What the status translator consumes.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: JobState,
    pub progress: Option<Progress>,
    /// Populated only in Success.
    pub result: Option<Value>,
    /// Populated only in Failure.
    pub error: Option<String>,
    /// Populated only in Ignored.
    pub ignore_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct JobData {
    state: JobState,
    progress: Option<Progress>,
    result: Option<Value>,
    error: Option<String>,
    ignore_message: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

/// Handle to a single job's mutable state.
///
/// A job does not update its own state concurrently with itself — the one
/// runner executing it is the only writer.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    data: RwLock<JobData>,
}

impl JobHandle {
    fn new(id: JobId) -> Self {
        Self {
            id,
            data: RwLock::new(JobData {
                state: JobState::Pending,
                progress: None,
                result: None,
                error: None,
                ignore_message: None,
                created_at: Utc::now(),
                completed_at: None,
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        let data = self.data.read().await;
        JobSnapshot {
            id: self.id,
            state: data.state,
            progress: data.progress,
            result: data.result.clone(),
            error: data.error.clone(),
            ignore_message: data.ignore_message.clone(),
            created_at: data.created_at,
            completed_at: data.completed_at,
        }
    }

    fn transition(data: &mut JobData, to: JobState) -> Result<()> {
        if !data.state.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: data.state,
                to,
            });
        }
        metrics::job_state_transitions().add(
            1,
            &[
                KeyValue::new("from", data.state.to_string()),
                KeyValue::new("to", to.to_string()),
            ],
        );
        data.state = to;
        if to.is_terminal() {
            data.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Report progress. The first call moves Pending → Progress; `total`
    /// is fixed by that first call and `current` never moves backwards.
    pub async fn set_progress(&self, current: u32, total: u32) -> Result<()> {
        let mut data = self.data.write().await;
        if data.state == JobState::Pending {
            Self::transition(&mut data, JobState::Progress)?;
        } else if data.state != JobState::Progress {
            return Err(Error::InvalidTransition {
                from: data.state,
                to: JobState::Progress,
            });
        }
        let (floor, fixed_total) = match data.progress {
            Some(p) => (p.current, p.total),
            None => (0, total),
        };
        data.progress = Some(Progress {
            current: current.max(floor),
            total: fixed_total,
        });
        Ok(())
    }

    /// Terminal: success, with the result payload. Emitted exactly once.
    pub async fn succeed(&self, result: Value) -> Result<()> {
        let mut data = self.data.write().await;
        Self::transition(&mut data, JobState::Success)?;
        data.result = Some(result);
        Ok(())
    }

    /// Terminal: unrecovered failure, with error detail.
    pub async fn fail(&self, error: impl Into<String>) -> Result<()> {
        let mut data = self.data.write().await;
        Self::transition(&mut data, JobState::Failure)?;
        data.error = Some(error.into());
        Ok(())
    }

    /// Terminal: duplicate detected at execution time. Not an error.
    pub async fn ignore(&self, message: impl Into<String>) -> Result<()> {
        let mut data = self.data.write().await;
        Self::transition(&mut data, JobState::Ignored)?;
        data.ignore_message = Some(message.into());
        Ok(())
    }
}

/// Registry of job handles, shared between the dispatcher and readers.
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, Arc<JobHandle>>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new Pending job and return its handle.
    pub async fn create(&self, id: JobId) -> Arc<JobHandle> {
        let handle = Arc::new(JobHandle::new(id));
        self.jobs.write().await.insert(id, Arc::clone(&handle));
        handle
    }

    pub async fn get(&self, id: JobId) -> Option<Arc<JobHandle>> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Read-only view of a job, or None if the id is unknown.
    pub async fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        let handle = self.get(id).await?;
        Some(handle.snapshot().await)
    }

    /// Drop terminal jobs that completed more than `max_age` ago.
    /// In-flight jobs are never touched.
    pub async fn purge_terminal(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut jobs = self.jobs.write().await;
        let mut stale = Vec::new();
        for (id, handle) in jobs.iter() {
            let snapshot = handle.snapshot().await;
            if snapshot.state.is_terminal()
                && snapshot.completed_at.is_some_and(|at| at < cutoff)
            {
                stale.push(*id);
            }
        }
        for id in &stale {
            jobs.remove(id);
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn progress_total_is_fixed_and_current_monotonic() {
        let store = JobStore::new();
        let handle = store.create(JobId::new()).await;

        handle.set_progress(0, 3).await.unwrap();
        handle.set_progress(2, 5).await.unwrap(); // total 5 ignored
        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.progress, Some(Progress { current: 2, total: 3 }));

        handle.set_progress(1, 3).await.unwrap(); // below high-water mark
        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.progress.unwrap().current, 2);
    }

    #[tokio::test]
    async fn terminal_jobs_reject_further_mutation() {
        let store = JobStore::new();
        let handle = store.create(JobId::new()).await;

        handle.set_progress(3, 3).await.unwrap();
        handle.succeed(json!({"total_items": 3})).await.unwrap();

        assert!(handle.set_progress(4, 3).await.is_err());
        assert!(handle.fail("late failure").await.is_err());
        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.state, JobState::Success);
        assert!(snapshot.completed_at.is_some());
    }

    #[tokio::test]
    async fn purge_drops_only_old_terminal_jobs() {
        let store = JobStore::new();
        let done = store.create(JobId::new()).await;
        done.set_progress(1, 1).await.unwrap();
        done.succeed(json!({})).await.unwrap();
        let running = store.create(JobId::new()).await;
        running.set_progress(0, 2).await.unwrap();

        // Zero max-age: anything terminal is already stale.
        let purged = store.purge_terminal(chrono::Duration::zero()).await;
        assert_eq!(purged, 1);
        assert!(store.snapshot(done.id()).await.is_none());
        assert!(store.snapshot(running.id()).await.is_some());
    }
}
