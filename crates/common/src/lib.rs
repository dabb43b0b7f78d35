//! Building blocks for the restline bearer-token API client.
//!
//! This crate holds everything that does not touch a concrete HTTP stack:
//! session state and its expiry timer, the redirect-fragment parser, the
//! retry policy engine, persistence adapters, and the transport seam that
//! `restline-infra` implements with reqwest.
//!
//! # Modules
//!
//! - **[`auth`]**: session store, anti-forgery state, redirect fragments
//! - **[`error`]**: [`ApiError`], [`HttpFailure`] and failure classification
//! - **[`events`]**: `onSignedOut` / `onSessionExpired` / `onError` listeners
//! - **[`resilience`]**: the retry policy engine
//! - **[`storage`]**: tab and browser scoped key/value persistence
//! - **[`time`]**: clock and sleep abstractions
//! - **[`transport`]**: request/response types and the [`HttpTransport`] seam
//! - **`testing`** (feature `test-utils`): mocks and deterministic time

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod error;
pub mod events;
pub mod resilience;
pub mod storage;
pub mod time;
pub mod transport;

#[cfg(any(feature = "test-utils", test))]
pub mod testing;

pub use auth::{RedirectFragment, RedirectHost, Session, SessionStore, TokenRevoker};
pub use error::{ApiError, ApiResult, FailureKind, HttpFailure};
pub use events::SessionEvents;
pub use resilience::{RetryEngine, RetryPolicy, ServerErrorRetry};
pub use storage::{PersistenceScope, StorageAdapter, Storages};
pub use time::{Clock, Sleeper, SystemClock, TokioSleeper};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ResponseBody};
