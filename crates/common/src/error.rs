//! Error taxonomy for the session and request pipeline
//!
//! Every fallible public operation returns [`ApiError`]. Terminal request
//! failures carry the original [`HttpFailure`] (status + payload) unchanged so
//! callers can inspect exactly what the server said.

use serde_json::Value;
use thiserror::Error;

/// Payload key holding service error metadata.
pub const ERROR_KEY: &str = "@error";

/// Key under [`ERROR_KEY`] holding rate-limit metadata.
pub const RATE_LIMIT_KEY: &str = "@rateLimit";

/// Key inside the rate-limit object carrying the wait in seconds.
pub const RETRY_AFTER_KEY: &str = "Retry-After";

/// A failed HTTP exchange as surfaced by the transport.
///
/// `status` is `None` when no response was received at all (DNS, connect,
/// timeout).
#[derive(Debug, Clone, PartialEq)]
pub struct HttpFailure {
    /// HTTP status, `None` without a response.
    pub status: Option<u16>,
    /// Decoded response body, or the transport's message for network failures.
    pub payload: Value,
}

impl HttpFailure {
    /// Failure with an HTTP status and a decoded payload.
    #[must_use]
    pub fn new(status: u16, payload: Value) -> Self {
        Self { status: Some(status), payload }
    }

    /// Failure where the request never produced a response.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self { status: None, payload: Value::String(message.into()) }
    }

    /// Seconds the server asked us to wait before retrying, if it said so.
    ///
    /// Reads `@error.@rateLimit`, which is either an object with a
    /// `Retry-After` entry or a bare number. String values are parsed.
    #[must_use]
    pub fn retry_after(&self) -> Option<f64> {
        let rate_limit = self.payload.get(ERROR_KEY)?.get(RATE_LIMIT_KEY)?;
        let raw = match rate_limit {
            Value::Object(map) => map.get(RETRY_AFTER_KEY)?,
            other => other,
        };
        let seconds = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
    }

    /// Whether the status is within `[500, 599]`.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self.status, Some(500..=599))
    }
}

impl std::fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "status {status}: {}", self.payload),
            None => write!(f, "no response: {}", self.payload),
        }
    }
}

/// Classification of a failed attempt, used to pick a retry branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 429 from the server.
    RateLimited,
    /// Any 5xx.
    TransientServerError,
    /// 401 while the local clock already considers the session expired.
    SessionExpired,
    /// 401 with a session the local clock still considers live.
    Unauthorized,
    /// Everything else, including network failures.
    TerminalRequestError,
}

impl FailureKind {
    /// Classify a failure given whether the local session is expired.
    #[must_use]
    pub fn classify(failure: &HttpFailure, session_expired: bool) -> Self {
        match failure.status {
            Some(401) if session_expired => Self::SessionExpired,
            Some(401) => Self::Unauthorized,
            Some(429) => Self::RateLimited,
            Some(500..=599) => Self::TransientServerError,
            _ => Self::TerminalRequestError,
        }
    }
}

/// Errors surfaced by the client.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("request failed with {0}")]
    Request(HttpFailure),

    #[error("session expired")]
    SessionExpired,

    #[error("anti-forgery state mismatch in redirect")]
    AntiForgeryMismatch,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// The HTTP status behind this error, when it came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request(failure) => failure.status,
            _ => None,
        }
    }

    /// The underlying request failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&HttpFailure> {
        match self {
            Self::Request(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<HttpFailure> for ApiError {
    fn from(failure: HttpFailure) -> Self {
        Self::Request(failure)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result alias for client operations.
pub type ApiResult<T> = Result<T, ApiError>;
