//! Key/value persistence over two scopes
//!
//! - **Tab scope** ([`MemoryStorage`]): lives exactly as long as the client
//!   instance that owns it.
//! - **Browser scope** ([`FileStorage`]): a JSON file shared by every client
//!   pointed at the same directory, surviving process restarts.
//!
//! The session is persisted in whichever scope the configuration selects; the
//! anti-forgery state always lives in browser scope.

mod file;
mod memory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::ApiResult;

/// Minimal string key/value store.
pub trait StorageAdapter: Send + Sync {
    /// Stored value, or `None` when the key is absent.
    ///
    /// # Errors
    /// Returns `ApiError::Storage` if the backend cannot be read.
    fn get(&self, key: &str) -> ApiResult<Option<String>>;

    /// # Errors
    /// Returns `ApiError::Storage` if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> ApiResult<()>;

    /// Removes the key; removing a missing key is not an error.
    ///
    /// # Errors
    /// Returns `ApiError::Storage` if the backend cannot be written.
    fn remove(&self, key: &str) -> ApiResult<()>;
}

/// Which storage scope persists the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceScope {
    #[default]
    Tab,
    Browser,
}

impl std::str::FromStr for PersistenceScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tab" | "session" => Ok(Self::Tab),
            "browser" | "local" => Ok(Self::Browser),
            other => Err(format!("unknown persistence scope: {other}")),
        }
    }
}

/// Both storage scopes available to a client.
#[derive(Clone)]
pub struct Storages {
    pub tab: Arc<dyn StorageAdapter>,
    pub browser: Arc<dyn StorageAdapter>,
}

impl Storages {
    #[must_use]
    pub fn new(tab: Arc<dyn StorageAdapter>, browser: Arc<dyn StorageAdapter>) -> Self {
        Self { tab, browser }
    }

    /// Both scopes in memory. Nothing survives the client.
    #[must_use]
    pub fn in_memory() -> Self {
        Self { tab: Arc::new(MemoryStorage::new()), browser: Arc::new(MemoryStorage::new()) }
    }

    /// The adapter backing the given scope.
    #[must_use]
    pub fn for_scope(&self, scope: PersistenceScope) -> Arc<dyn StorageAdapter> {
        match scope {
            PersistenceScope::Tab => self.tab.clone(),
            PersistenceScope::Browser => self.browser.clone(),
        }
    }
}

impl std::fmt::Debug for Storages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storages").finish_non_exhaustive()
    }
}
