//! Dispatch engine: submission entry points and job execution.

pub mod dispatch;
pub mod runner;

pub use dispatch::{DispatchConfig, Dispatcher, SubmitOutcome};
pub use runner::Worker;
