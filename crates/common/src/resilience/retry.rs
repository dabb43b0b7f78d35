//! Retry policy engine for authenticated calls
//!
//! Every network call of the client (resource operations and the who-am-I
//! lookup) runs through [`RetryEngine::execute`]. On failure the policy is
//! evaluated in this order:
//!
//! 1. 401 while the local session is expired: force expiry, no retry.
//! 2. 429 with rate-limit handling on: wait `Retry-After` (default 1s) and
//!    replay with the same attempt count. The number of replays is unbounded;
//!    a single wait is clamped to [`MAX_RETRY_AFTER`].
//! 3. 5xx with server-error retry on and `attempt <= max`: wait 500ms,
//!    increment the attempt and replay.
//! 4. Anything else: notify error listeners, then surface the failure.
//!
//! Retries are sequential replays of the same operation; there is no
//! cancellation primitive, so callers needing one must wrap the future
//! themselves.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::auth::SessionStore;
use crate::error::{ApiError, ApiResult, FailureKind, HttpFailure};
use crate::events::SessionEvents;
use crate::time::Sleeper;

/// Fixed wait between server-error retries.
pub const SERVER_ERROR_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Wait used when a 429 carries no `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Longest single rate-limit wait; larger `Retry-After` values are clamped.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Server-error retry budget when enabled without an explicit count.
pub const DEFAULT_SERVER_ERROR_ATTEMPTS: u32 = 3;

/// Whether and how often 5xx responses are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorRetry {
    Disabled,
    /// Retry while the attempt count is at most this value.
    UpTo(u32),
}

impl ServerErrorRetry {
    #[must_use]
    pub fn allows(self, attempt: u32) -> bool {
        match self {
            Self::Disabled => false,
            Self::UpTo(max) => attempt <= max,
        }
    }
}

impl Default for ServerErrorRetry {
    fn default() -> Self {
        Self::UpTo(DEFAULT_SERVER_ERROR_ATTEMPTS)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Replay 429 responses after their `Retry-After`.
    pub handle_rate_limit: bool,
    /// 5xx retry budget.
    pub server_errors: ServerErrorRetry,
    /// Wait before each 5xx replay.
    pub server_error_delay: Duration,
    /// Wait for a 429 without `Retry-After`.
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            handle_rate_limit: true,
            server_errors: ServerErrorRetry::default(),
            server_error_delay: SERVER_ERROR_RETRY_DELAY,
            default_retry_after: DEFAULT_RETRY_AFTER,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_rate_limit_handling(mut self, enabled: bool) -> Self {
        self.handle_rate_limit = enabled;
        self
    }

    #[must_use]
    pub fn with_server_errors(mut self, server_errors: ServerErrorRetry) -> Self {
        self.server_errors = server_errors;
        self
    }

    /// Decide what to do with a failed attempt.
    #[must_use]
    pub fn decide(&self, kind: FailureKind, failure: &HttpFailure, context: &RetryContext) -> RetryDecision {
        match kind {
            FailureKind::SessionExpired => RetryDecision::Expire,
            FailureKind::RateLimited if self.handle_rate_limit => {
                let wait = failure.retry_after().map_or(self.default_retry_after, |secs| {
                    Duration::try_from_secs_f64(secs).map_or(MAX_RETRY_AFTER, |d| d.min(MAX_RETRY_AFTER))
                });
                RetryDecision::RetrySameAttempt(wait)
            }
            FailureKind::TransientServerError if self.server_errors.allows(context.attempt) => {
                RetryDecision::RetryNextAttempt(self.server_error_delay)
            }
            _ => RetryDecision::Surface,
        }
    }
}

/// Outcome of evaluating the policy for one failure.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Rate limited: wait, then replay without consuming an attempt.
    RetrySameAttempt(Duration),
    /// Transient server error: wait, then replay as the next attempt.
    RetryNextAttempt(Duration),
    /// Session expired locally: force sign-out, do not retry.
    Expire,
    /// Give the failure to the caller.
    Surface,
}

/// State of one logical call. Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    /// Starts at 1; only server-error retries increment it.
    pub attempt: u32,
    /// Number of invocations of the operation so far.
    pub invocations: u32,
    pub last_failure: Option<FailureKind>,
    pub total_delay: Duration,
}

impl Default for RetryContext {
    fn default() -> Self {
        Self { attempt: 1, invocations: 0, last_failure: None, total_delay: Duration::ZERO }
    }
}

/// Applies a [`RetryPolicy`] around replayable operations.
#[derive(Clone)]
pub struct RetryEngine {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    store: SessionStore,
    events: Arc<SessionEvents>,
}

impl RetryEngine {
    #[must_use]
    pub fn new(
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        store: SessionStore,
        events: Arc<SessionEvents>,
    ) -> Self {
        Self { policy, sleeper, store, events }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds or the policy gives up.
    ///
    /// # Errors
    /// - `ApiError::SessionExpired` after a 401 on a locally expired session
    ///   (the session has been cleared and `onSessionExpired` raised).
    /// - `ApiError::Request` carrying the last failure unchanged otherwise.
    #[instrument(skip(self, operation), fields(label = %label))]
    pub async fn execute<F, Fut, T>(&self, label: &str, mut operation: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HttpFailure>>,
    {
        let mut context = RetryContext::default();

        loop {
            context.invocations += 1;
            debug!(attempt = context.attempt, invocation = context.invocations, "executing operation");

            let failure = match operation().await {
                Ok(value) => {
                    if context.invocations > 1 {
                        debug!(invocations = context.invocations, "operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let kind = FailureKind::classify(&failure, self.store.is_expired());
            context.last_failure = Some(kind);

            match self.policy.decide(kind, &failure, &context) {
                RetryDecision::Expire => {
                    warn!("401 on an expired session; forcing sign-out");
                    self.store.expire();
                    return Err(ApiError::SessionExpired);
                }
                RetryDecision::RetrySameAttempt(wait) => {
                    warn!(delay_ms = wait.as_millis() as u64, "rate limited; waiting before retry");
                    self.wait(&mut context, wait).await;
                }
                RetryDecision::RetryNextAttempt(wait) => {
                    warn!(
                        attempt = context.attempt,
                        status = ?failure.status,
                        delay_ms = wait.as_millis() as u64,
                        "server error; retrying"
                    );
                    self.wait(&mut context, wait).await;
                    context.attempt += 1;
                }
                RetryDecision::Surface => {
                    debug!(status = ?failure.status, kind = ?kind, "surfacing failure");
                    let error = ApiError::Request(failure);
                    self.events.emit_error(&error);
                    return Err(error);
                }
            }
        }
    }

    async fn wait(&self, context: &mut RetryContext, delay: Duration) {
        self.sleeper.sleep(delay).await;
        context.total_delay += delay;
    }
}

impl std::fmt::Debug for RetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryEngine").field("policy", &self.policy).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the policy decision table; engine behaviour is covered
    //! in `tests/retry_integration.rs`.

    use serde_json::{json, Value};

    use super::*;

    fn ctx(attempt: u32) -> RetryContext {
        RetryContext { attempt, ..RetryContext::default() }
    }

    #[test]
    fn rate_limit_uses_retry_after_or_default() {
        let policy = RetryPolicy::default();
        let with_header = HttpFailure::new(429, json!({"@error": {"@rateLimit": {"Retry-After": 4}}}));
        assert_eq!(
            policy.decide(FailureKind::RateLimited, &with_header, &ctx(1)),
            RetryDecision::RetrySameAttempt(Duration::from_secs(4))
        );

        let bare = HttpFailure::new(429, Value::Null);
        assert_eq!(
            policy.decide(FailureKind::RateLimited, &bare, &ctx(99)),
            RetryDecision::RetrySameAttempt(DEFAULT_RETRY_AFTER)
        );
    }

    #[test]
    fn huge_retry_after_is_clamped() {
        let policy = RetryPolicy::default();
        for raw in [json!(1e30), json!(1e300), json!("9999999999999999999999")] {
            let failure = HttpFailure::new(429, json!({"@error": {"@rateLimit": {"Retry-After": raw}}}));
            assert_eq!(
                policy.decide(FailureKind::RateLimited, &failure, &ctx(1)),
                RetryDecision::RetrySameAttempt(MAX_RETRY_AFTER)
            );
        }
    }

    #[test]
    fn rate_limit_disabled_surfaces() {
        let policy = RetryPolicy::default().with_rate_limit_handling(false);
        let failure = HttpFailure::new(429, Value::Null);
        assert_eq!(policy.decide(FailureKind::RateLimited, &failure, &ctx(1)), RetryDecision::Surface);
    }

    #[test]
    fn server_errors_retry_up_to_max() {
        let policy = RetryPolicy::default();
        let failure = HttpFailure::new(503, Value::Null);
        for attempt in 1..=3 {
            assert_eq!(
                policy.decide(FailureKind::TransientServerError, &failure, &ctx(attempt)),
                RetryDecision::RetryNextAttempt(SERVER_ERROR_RETRY_DELAY)
            );
        }
        assert_eq!(
            policy.decide(FailureKind::TransientServerError, &failure, &ctx(4)),
            RetryDecision::Surface
        );

        let disabled = RetryPolicy::default().with_server_errors(ServerErrorRetry::Disabled);
        assert_eq!(
            disabled.decide(FailureKind::TransientServerError, &failure, &ctx(1)),
            RetryDecision::Surface
        );
    }

    #[test]
    fn expired_session_and_terminal_failures() {
        let policy = RetryPolicy::default();
        let unauthorized = HttpFailure::new(401, Value::Null);
        assert_eq!(policy.decide(FailureKind::SessionExpired, &unauthorized, &ctx(1)), RetryDecision::Expire);
        assert_eq!(policy.decide(FailureKind::Unauthorized, &unauthorized, &ctx(1)), RetryDecision::Surface);
        assert_eq!(
            policy.decide(FailureKind::TerminalRequestError, &HttpFailure::network("reset"), &ctx(1)),
            RetryDecision::Surface
        );
    }
}
