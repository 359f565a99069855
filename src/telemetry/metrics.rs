//! Metric instrument factories for dispatchq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"dispatchq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("dispatchq")
}

/// Counter: submissions through the dispatcher.
/// Labels: `result` ("accepted" | "duplicate" | "in_progress").
pub fn submissions() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.submissions")
        .with_description("Number of submissions through the dispatcher")
        .build()
}

/// Counter: idempotency-ledger admission checks.
/// Labels: `result` ("admitted" | "duplicate").
pub fn admissions() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.admissions")
        .with_description("Number of idempotency admission checks")
        .build()
}

/// Counter: exclusion-lock operations.
/// Labels: `operation` ("acquired" | "contended" | "released" | "release_lost").
pub fn lock_operations() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.lock.operations")
        .with_description("Number of exclusion lock operations")
        .build()
}

/// Counter: job state transitions.
/// Labels: `from`, `to`.
pub fn job_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.job.state_transitions")
        .with_description("Number of job state transitions")
        .build()
}

/// Histogram: job run duration in milliseconds.
/// Labels: `outcome` ("success" | "failure" | "ignored").
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("dispatchq.job.duration_ms")
        .with_description("Job run duration in milliseconds")
        .with_unit("ms")
        .build()
}
