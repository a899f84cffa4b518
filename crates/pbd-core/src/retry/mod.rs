//! Retry and backoff policy.
//!
//! Turns a failed attempt into either a delayed requeue or a terminal give-up.
//! The policy never reuses an identity: a retry is simply a new dispatch, and
//! every dispatch draws a fresh session.

mod policy;

pub use policy::{RetryDecision, RetryPolicy};
