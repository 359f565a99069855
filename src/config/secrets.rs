//! Secret handling utilities.
//!
//! Re-exports secrecy types for callers wiring up the Redis client.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
