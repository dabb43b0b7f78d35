//! Client for the account-scoped REST service
//!
//! # Module Organization
//!
//! - **[`client`]**: [`ApiClient`], its builder, sign-out and the generic call path
//! - **[`bootstrap`]**: implicit-flow sign-in and who-am-I
//! - **[`resources`]**: create/get/replace/patch/delete/download
//! - **[`pagination`]**: single pages and `list_all`
//! - **[`revoke`]**: remote token revocation

pub mod bootstrap;
pub mod client;
pub mod pagination;
pub mod resources;
pub mod revoke;

pub use bootstrap::{SessionHints, OPENID_SCOPE};
pub use client::{default_storage_dir, ApiClient, ApiClientBuilder};
pub use pagination::{aggregate, ListParams, Page, PageSource, PAGE_LIMIT};
pub use resources::{RequestOptions, DOWNLOAD_TIMEOUT};
pub use revoke::TransportRevoker;
