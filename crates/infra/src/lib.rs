//! # Restline Infrastructure
//!
//! I/O-bearing parts of the client:
//! - `ApiClient`, the bootstrap flow and resource operations
//! - The reqwest HTTP transport
//! - Configuration loading (file, environment)
//! - Log subscriber setup
//!
//! ## Architecture
//! - Implements the collaborator traits defined in `restline-common`
//! - Session state and retry policy live in `restline-common`

pub mod api;
pub mod config;
pub mod http;
pub mod observability;

pub use api::{ApiClient, ApiClientBuilder, ListParams, Page, RequestOptions};
pub use config::{ClientConfig, ServerErrorSetting};
pub use http::ReqwestTransport;
pub use observability::{init_tracing, LogFormat};
