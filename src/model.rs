//! Core data model.
//!
//! A submission is the logical unit of work a client hands in. It carries
//! identity (user + items) from which both the idempotency fingerprint and
//! the mutual-exclusion resource key are derived deterministically.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Job identity
// ---------------------------------------------------------------------------

/// Newtype for job ids, handed out by the job store at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// ---------------------------------------------------------------------------
// Job state
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, runner not yet started.
    Pending,
    /// Runner actively processing; carries `{current, total}`.
    Progress,
    /// Done, result populated. Terminal.
    Success,
    /// Unrecovered runner error, error detail populated. Terminal.
    Failure,
    /// Duplicate detected inside the runner itself. Terminal, not an error.
    Ignored,
}

impl JobState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Pending, Progress)
                | (Pending, Failure)    // work failed before the first unit
                | (Pending, Ignored)    // runner-side dedup hit
                | (Progress, Progress)  // monotonic increments
                | (Progress, Success)
                | (Progress, Failure)
        )
    }

    /// Is this a terminal state? Terminal jobs are immutable.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Success | JobState::Failure | JobState::Ignored)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Progress => "progress",
            JobState::Success => "success",
            JobState::Failure => "failure",
            JobState::Ignored => "ignored",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Completed sub-units out of a fixed total.
///
/// `current` is monotonically non-decreasing for a job's lifetime;
/// `total` never changes after the first emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u32,
    pub total: u32,
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// A client submission: which user, which items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub user_id: i64,
    pub items: Vec<i64>,
}

impl Submission {
    pub fn new(user_id: i64, items: Vec<i64>) -> Self {
        Self { user_id, items }
    }

    /// Reject malformed submissions before any store interaction.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(Error::Validation("no items provided".to_string()));
        }
        Ok(())
    }

    /// Idempotency fingerprint: SHA-256 over the normalized submission
    /// identity. Deterministic and collision-resistant; uniqueness matters
    /// here, not secrecy.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.user_id.to_string().as_bytes());
        hasher.update(b"-");
        for item in &self.items {
            hasher.update(item.to_string().as_bytes());
            hasher.update(b",");
        }
        hex_encode(&hasher.finalize())
    }

    /// Mutual-exclusion identity: one in-flight job per user.
    pub fn resource_key(&self) -> String {
        format!("user:{}", self.user_id)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = Submission::new(1, vec![1, 2, 3]);
        let b = Submission::new(1, vec![1, 2, 3]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_distinguishes_users_and_items() {
        let base = Submission::new(1, vec![1, 2, 3]);
        assert_ne!(
            base.fingerprint(),
            Submission::new(2, vec![1, 2, 3]).fingerprint()
        );
        assert_ne!(
            base.fingerprint(),
            Submission::new(1, vec![1, 2]).fingerprint()
        );
        // Item boundaries must matter: [12, 3] != [1, 23]
        assert_ne!(
            Submission::new(1, vec![12, 3]).fingerprint(),
            Submission::new(1, vec![1, 23]).fingerprint()
        );
    }

    #[test]
    fn empty_items_fail_validation() {
        assert!(Submission::new(1, vec![]).validate().is_err());
        assert!(Submission::new(1, vec![1]).validate().is_ok());
    }

    #[test]
    fn terminal_states_accept_no_transitions() {
        use JobState::*;
        for terminal in [Success, Failure, Ignored] {
            for to in [Pending, Progress, Success, Failure, Ignored] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    #[test]
    fn pending_reaches_ignored_directly() {
        assert!(JobState::Pending.can_transition_to(JobState::Ignored));
        assert!(!JobState::Progress.can_transition_to(JobState::Ignored));
    }
}
