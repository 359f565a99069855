//! Idempotency guard: decides whether a submission is a repeat of one
//! already accepted.
//!
//! The ledger record stores the admitted job's id under the submission
//! fingerprint. Record lifetime rule: written at admission, deleted by the
//! runner only on terminal failure (a failed job is resubmittable), kept
//! until TTL expiry on success to suppress duplicate completed work.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tracing::debug;

use crate::error::Result;
use crate::kv::KvStore;
use crate::model::JobId;
use crate::telemetry::metrics;

const LEDGER_PREFIX: &str = "idem:";

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting — the record now names this job.
    Admitted,
    /// A record already exists for this fingerprint.
    Duplicate,
}

/// Deduplicates submissions through one atomic conditional write.
#[derive(Clone)]
pub struct IdempotencyGuard {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    fn record_key(fingerprint: &str) -> String {
        format!("{LEDGER_PREFIX}{fingerprint}")
    }

    /// Admit a submission, or report it as a duplicate.
    ///
    /// One set-if-not-exists call. Two concurrent submissions with the
    /// same fingerprint race on the store, and exactly one wins — never
    /// an existence check followed by a separate set.
    pub async fn admit(&self, fingerprint: &str, job_id: JobId) -> Result<Admission> {
        let created = self
            .kv
            .set_if_absent(&Self::record_key(fingerprint), &job_id.to_string(), self.ttl)
            .await?;

        let admission = if created {
            Admission::Admitted
        } else {
            Admission::Duplicate
        };
        debug!(fingerprint, %job_id, ?admission, "admission check");
        metrics::admissions().add(
            1,
            &[KeyValue::new(
                "result",
                if created { "admitted" } else { "duplicate" },
            )],
        );
        Ok(admission)
    }

    /// Runner-side recheck: does the ledger still name this job?
    ///
    /// Defense in depth against the record expiring (and being re-claimed)
    /// between admission and execution. A mismatch means another job owns
    /// this fingerprint now and the runner should go IGNORED.
    pub async fn confirm(&self, fingerprint: &str, job_id: JobId) -> Result<bool> {
        let owner = self.kv.get(&Self::record_key(fingerprint)).await?;
        Ok(owner.as_deref() == Some(job_id.to_string().as_str()))
    }

    /// Drop the record so the submission can be retried, but only while it
    /// still names this job. If the record expired and a newer submission
    /// re-claimed the fingerprint, deleting it would re-open the dedup
    /// window under that job — same stale-holder hazard as a token-less
    /// lock release.
    pub async fn forget(&self, fingerprint: &str, job_id: JobId) -> Result<()> {
        let deleted = self
            .kv
            .delete_if_value(&Self::record_key(fingerprint), &job_id.to_string())
            .await?;
        if !deleted {
            debug!(fingerprint, %job_id, "record no longer owned, left in place");
        }
        Ok(())
    }

    /// Re-key the record's TTL, e.g. to a long job's observed duration.
    pub async fn extend(&self, fingerprint: &str, ttl: Duration) -> Result<()> {
        self.kv.expire(&Self::record_key(fingerprint), ttl).await
    }
}
