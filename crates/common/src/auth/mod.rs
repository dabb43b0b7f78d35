//! Session state for the implicit/bearer-token flow
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   SessionStore   │  active Session + expiry timer
//! └────────┬─────────┘
//!          │
//!          ├──► StorageAdapter    (tab or browser scope persistence)
//!          ├──► SessionEvents     (onSessionExpired)
//!          └──► TokenRevoker      (optional, on expiry)
//!
//! RedirectFragment / state   parse and check implicit-flow callbacks
//! RedirectHost               address bar collaborator
//! IdTokenVerifier            optional identity token verification
//! ```
//!
//! # Module Organization
//!
//! - **[`session`]**: the [`Session`] value
//! - **[`store`]**: [`SessionStore`], expiry scheduling and persistence
//! - **[`state`]**: anti-forgery state generation and validation
//! - **[`fragment`]**: redirect fragment parsing
//! - **[`redirect`]**: the [`RedirectHost`] collaborator
//! - **[`id_token`]**: the [`IdTokenVerifier`] collaborator

pub mod fragment;
pub mod id_token;
pub mod redirect;
pub mod session;
pub mod state;
pub mod store;

pub use fragment::RedirectFragment;
pub use id_token::IdTokenVerifier;
pub use redirect::{redirect_uri, without_fragment, RedirectHost};
pub use session::Session;
pub use state::{generate_state, load_or_create_state, state_key, validate_state};
pub use store::{SessionStore, TokenRevoker, EXPIRY_SKEW_MS, MAX_TIMER_DELAY_MS};
