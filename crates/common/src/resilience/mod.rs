//! Resilience for network calls
//!
//! A single retry implementation, [`RetryEngine`], shared by every call
//! site. Waits go through the pluggable [`Sleeper`](crate::time::Sleeper)
//! so tests never block on real timers.

pub mod retry;

pub use retry::{
    RetryContext, RetryDecision, RetryEngine, RetryPolicy, ServerErrorRetry,
    DEFAULT_RETRY_AFTER, DEFAULT_SERVER_ERROR_ATTEMPTS, MAX_RETRY_AFTER, SERVER_ERROR_RETRY_DELAY,
};
