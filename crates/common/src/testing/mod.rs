//! Testing utilities and helpers
//!
//! - **[`mocks`]**: scripted transport, in-memory redirect host, static
//!   identity-token verifier and a recording revoker
//! - **[`time`]**: [`MockClock`] and [`RecordingSleeper`]
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use restline_common::testing::{MockClock, RecordingSleeper};
//!
//! let clock = MockClock::at_millis(0);
//! let sleeper = RecordingSleeper::with_clock(clock.clone());
//! // hand `sleeper` to a RetryEngine, then inspect `sleeper.waits()`
//! # let _ = (clock, sleeper, Duration::ZERO);
//! ```

pub mod mocks;
pub mod time;

pub use mocks::{MemoryRedirectHost, RecordingRevoker, ScriptedTransport, StaticIdTokenVerifier};
pub use time::{MockClock, RecordingSleeper};
