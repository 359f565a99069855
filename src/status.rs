//! Status translator: raw job snapshot + lock state → client-facing
//! status payload.
//!
//! Pure read path. May be invoked concurrently by arbitrarily many
//! pollers and subscribers; it never mutates anything.

use serde::Serialize;
use serde_json::Value;

use crate::model::JobState;
use crate::store::JobSnapshot;

/// What the caller knows about the exclusion lock for the job's resource.
/// `Unknown` when no resource key was supplied with the status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Held,
    Absent,
    Unknown,
}

/// Client-facing status payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusPayload {
    InProgress { current: u32, total: u32 },
    Completed { result: Value },
    Failed { error: String },
    Ignored { message: String },
    NotFound,
}

impl StatusPayload {
    /// True once no further status change can occur for this job.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusPayload::Completed { .. }
                | StatusPayload::Failed { .. }
                | StatusPayload::Ignored { .. }
        )
    }
}

/// Map a job snapshot and lock state to a status payload.
///
/// A terminal job state always wins over lock presence or absence. Lock
/// absence alone, with no terminal state observed, reports `not_found` —
/// never inferred success.
pub fn describe(snapshot: Option<&JobSnapshot>, lock: LockState) -> StatusPayload {
    if let Some(s) = snapshot {
        match s.state {
            JobState::Success => {
                return StatusPayload::Completed {
                    result: s.result.clone().unwrap_or(Value::Null),
                };
            }
            JobState::Failure => {
                return StatusPayload::Failed {
                    error: s
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                };
            }
            JobState::Ignored => {
                return StatusPayload::Ignored {
                    message: s
                        .ignore_message
                        .clone()
                        .unwrap_or_else(|| "already processed".to_string()),
                };
            }
            JobState::Pending | JobState::Progress => {}
        }

        // Non-terminal. Only a confirmed-absent lock downgrades this to
        // not-found; a held or unconsulted lock reports live progress.
        if lock == LockState::Absent {
            return StatusPayload::NotFound;
        }
        let progress = s.progress.unwrap_or(crate::model::Progress {
            current: 0,
            total: 0,
        });
        return StatusPayload::InProgress {
            current: progress.current,
            total: progress.total,
        };
    }

    // Unknown job id. A held lock is still evidence of in-flight work for
    // the resource; otherwise there is nothing to report.
    match lock {
        LockState::Held => StatusPayload::InProgress {
            current: 0,
            total: 0,
        },
        LockState::Absent | LockState::Unknown => StatusPayload::NotFound,
    }
}
