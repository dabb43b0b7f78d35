//! Mock implementations of the client's collaborators
//!
//! Mutex poisoning cannot happen here (parking_lot), so none of these
//! helpers panic on their own.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use url::Url;

use crate::auth::{IdTokenVerifier, RedirectHost, TokenRevoker};
use crate::error::{ApiError, ApiResult, HttpFailure};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

type Scripted = Result<HttpResponse, HttpFailure>;
type Responder = Arc<dyn Fn(&HttpRequest) -> Scripted + Send + Sync>;

/// Transport that replays queued outcomes in order and records every request.
///
/// Once the queue is drained, the fallback responder (if any) answers;
/// otherwise the call fails as a network error.
///
/// ```
/// use serde_json::json;
/// use restline_common::testing::ScriptedTransport;
///
/// let transport = ScriptedTransport::new();
/// transport.push_json(429, json!({}));
/// transport.push_json(200, json!({"id": "1"}));
/// assert_eq!(transport.remaining(), 2);
/// ```
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    queue: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    fallback: Option<Responder>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted request with `responder`.
    #[must_use]
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> Scripted + Send + Sync + 'static,
    {
        Self { fallback: Some(Arc::new(responder)), ..Self::default() }
    }

    /// Queue a JSON response; non-2xx statuses become failures.
    pub fn push_json(&self, status: u16, body: Value) {
        let outcome = if (200..300).contains(&status) {
            Ok(HttpResponse::json(status, body))
        } else {
            Err(HttpFailure::new(status, body))
        };
        self.queue.lock().push_back(outcome);
    }

    pub fn push_response(&self, response: HttpResponse) {
        self.queue.lock().push_back(Ok(response));
    }

    pub fn push_failure(&self, failure: HttpFailure) {
        self.queue.lock().push_back(Err(failure));
    }

    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    #[must_use]
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().last().cloned()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.queue.lock().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpFailure> {
        self.requests.lock().push(request.clone());
        if let Some(outcome) = self.queue.lock().pop_front() {
            return outcome;
        }
        match &self.fallback {
            Some(responder) => responder(&request),
            None => Err(HttpFailure::network(format!("no scripted response for {}", request.url))),
        }
    }
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("remaining", &self.remaining())
            .field("calls", &self.call_count())
            .finish()
    }
}

/// In-memory address bar.
#[derive(Debug, Clone)]
pub struct MemoryRedirectHost {
    current: Arc<Mutex<Url>>,
    replaced: Arc<Mutex<Vec<Url>>>,
    navigated: Arc<Mutex<Vec<Url>>>,
}

impl MemoryRedirectHost {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            current: Arc::new(Mutex::new(url)),
            replaced: Arc::default(),
            navigated: Arc::default(),
        }
    }

    pub fn set_current(&self, url: Url) {
        *self.current.lock() = url;
    }

    /// URLs passed to `replace_url`, oldest first.
    #[must_use]
    pub fn replaced(&self) -> Vec<Url> {
        self.replaced.lock().clone()
    }

    /// URLs passed to `navigate`, oldest first.
    #[must_use]
    pub fn navigations(&self) -> Vec<Url> {
        self.navigated.lock().clone()
    }
}

impl RedirectHost for MemoryRedirectHost {
    fn current_url(&self) -> Url {
        self.current.lock().clone()
    }

    fn replace_url(&self, url: &Url) {
        *self.current.lock() = url.clone();
        self.replaced.lock().push(url.clone());
    }

    fn navigate(&self, url: &Url) {
        self.navigated.lock().push(url.clone());
    }
}

/// Verifier accepting a fixed set of tokens.
#[derive(Debug, Clone, Default)]
pub struct StaticIdTokenVerifier {
    accepted: HashMap<String, Value>,
}

impl StaticIdTokenVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn accepting(mut self, token: impl Into<String>, claims: Value) -> Self {
        self.accepted.insert(token.into(), claims);
        self
    }
}

#[async_trait]
impl IdTokenVerifier for StaticIdTokenVerifier {
    async fn verify(&self, token: &str) -> Option<Value> {
        self.accepted.get(token).cloned()
    }
}

/// Revoker that records tokens and optionally fails.
#[derive(Debug, Clone, Default)]
pub struct RecordingRevoker {
    revoked: Arc<Mutex<Vec<String>>>,
    failure: Option<HttpFailure>,
}

impl RecordingRevoker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing(failure: HttpFailure) -> Self {
        Self { failure: Some(failure), ..Self::default() }
    }

    #[must_use]
    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().clone()
    }
}

#[async_trait]
impl TokenRevoker for RecordingRevoker {
    async fn revoke(&self, token: &str) -> ApiResult<()> {
        self.revoked.lock().push(token.to_owned());
        match &self.failure {
            Some(failure) => Err(ApiError::Request(failure.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::HttpMethod;

    #[tokio::test]
    async fn scripted_transport_replays_in_order_then_falls_back() {
        let transport = ScriptedTransport::with_responder(|_| Ok(HttpResponse::json(200, json!("fallback"))));
        transport.push_json(503, json!({}));
        transport.push_json(200, json!({"ok": true}));

        let request = HttpRequest::new(HttpMethod::Get, "https://api.test/a");
        assert_eq!(transport.send(request.clone()).await.unwrap_err().status, Some(503));
        assert_eq!(transport.send(request.clone()).await.unwrap().into_json(), json!({"ok": true}));
        assert_eq!(transport.send(request).await.unwrap().into_json(), json!("fallback"));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn unscripted_request_is_network_failure() {
        let transport = ScriptedTransport::new();
        let failure = transport
            .send(HttpRequest::new(HttpMethod::Get, "https://api.test/a"))
            .await
            .unwrap_err();
        assert_eq!(failure.status, None);
    }

    #[test]
    fn redirect_host_tracks_calls() {
        let host = MemoryRedirectHost::new(Url::parse("https://app.test/#a=b").unwrap());
        let clean = Url::parse("https://app.test/").unwrap();
        host.replace_url(&clean);
        host.navigate(&Url::parse("https://auth.test/").unwrap());

        assert_eq!(host.current_url(), clean);
        assert_eq!(host.replaced().len(), 1);
        assert_eq!(host.navigations().len(), 1);
    }
}
