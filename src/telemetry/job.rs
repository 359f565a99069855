//! Job execution span helpers.

use tracing::Span;
use uuid::Uuid;

/// Start a span wrapping one job's execution.
///
/// The `job.state` field is declared empty and updated through
/// [`record_state_transition`].
pub fn start_job_span(job_id: &Uuid) -> Span {
    tracing::info_span!(
        "job.execute",
        "job.id" = %job_id,
        "job.state" = tracing::field::Empty,
    )
}

/// Record a state transition event scoped to the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
