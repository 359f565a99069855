//! # dispatchq
//!
//! Idempotent dispatch and single-flight execution for background jobs.
//!
//! Deduplicates repeated submissions via an idempotency ledger, grants
//! mutually-exclusive execution per logical resource via a TTL-bounded
//! lock, and tracks job progress through to a terminal state. Both the
//! ledger and the lock table live in a shared key-value store (Redis in
//! production, in-memory for tests), so correctness holds across
//! independent processes.

pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod kv;
pub mod lock;
pub mod model;
pub mod relay;
pub mod status;
pub mod store;
pub mod telemetry;
