//! The authenticated session value

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Authenticated identity plus the bearer token that proves it.
///
/// Only the session store mutates the active session; everything else works
/// on clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Account identity, used to scope resource URLs.
    pub id: String,

    /// Full `Authorization` header value, e.g. `"Bearer abc"`.
    pub token: String,

    /// Expiration instant in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<i64>,

    /// Raw OpenID identity token, when the provider returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Verified identity token claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_claims: Option<Value>,

    /// Created from a caller-supplied token rather than the redirect flow.
    #[serde(default)]
    pub uses_token: bool,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: token.into(),
            expiration: None,
            id_token: None,
            id_token_claims: None,
            uses_token: false,
        }
    }

    #[must_use]
    pub fn with_expiration(mut self, expiration_millis: i64) -> Self {
        self.expiration = Some(expiration_millis);
        self
    }

    #[must_use]
    pub fn with_id_token(mut self, id_token: impl Into<String>, claims: Option<Value>) -> Self {
        self.id_token = Some(id_token.into());
        self.id_token_claims = claims;
        self
    }

    #[must_use]
    pub fn using_token(mut self, uses_token: bool) -> Self {
        self.uses_token = uses_token;
        self
    }

    /// Whether `now_millis` is within `skew_millis` of the expiration (or past it).
    /// Sessions without an expiration never expire.
    #[must_use]
    pub fn expires_within(&self, now_millis: i64, skew_millis: i64) -> bool {
        self.expiration.is_some_and(|exp| exp.saturating_sub(skew_millis) <= now_millis)
    }
}
