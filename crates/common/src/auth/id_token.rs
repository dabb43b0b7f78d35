use async_trait::async_trait;
use serde_json::Value;

/// Verifies an OpenID identity token against the issuer's published keys.
///
/// Implementations return the decoded claims, or `None` for anything that
/// does not verify (malformed token, unknown key, bad signature). They never
/// fail loudly.
#[async_trait]
pub trait IdTokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<Value>;
}
