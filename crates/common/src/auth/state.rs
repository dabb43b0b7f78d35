//! Anti-forgery `state` for the implicit-flow round trip
//!
//! One random value per browser-wide scope, created on first use and reused
//! for every sign-in until it is cleared.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use tracing::debug;

use crate::error::ApiResult;
use crate::storage::StorageAdapter;

/// Suffix appended to the session key to form the state's storage key.
pub const STATE_KEY_SUFFIX: &str = ".state";

/// Generate a random state token for CSRF protection
///
/// Returns a URL-safe base64-encoded random string of 32 bytes (43 characters).
#[must_use]
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: [u8; 32] = rng.gen();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Compare the stored and returned states without short-circuiting on the
/// first differing byte.
#[must_use]
pub fn validate_state(expected: &str, actual: &str) -> bool {
    let (a, b) = (expected.as_bytes(), actual.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Storage key for the anti-forgery state belonging to `session_key`.
#[must_use]
pub fn state_key(session_key: &str) -> String {
    format!("{session_key}{STATE_KEY_SUFFIX}")
}

/// Returns the stored state, generating and persisting one if absent.
///
/// # Errors
/// Returns `ApiError::Storage` if the browser-scope backend fails.
pub fn load_or_create_state(storage: &dyn StorageAdapter, key: &str) -> ApiResult<String> {
    if let Some(existing) = storage.get(key)?.filter(|s| !s.is_empty()) {
        return Ok(existing);
    }
    let state = generate_state();
    storage.set(key, &state)?;
    debug!(key, "generated anti-forgery state");
    Ok(state)
}
