//! API client with session handling and retry policy
//!
//! [`ApiClient`] ties the pieces together: one [`SessionStore`] per client,
//! the [`RetryEngine`] wrapped around every call, and the collaborators
//! (transport, storage, redirect host, identity-token verifier).

use std::path::PathBuf;
use std::sync::Arc;

use restline_common::auth::{IdTokenVerifier, RedirectHost, TokenRevoker};
use restline_common::storage::{FileStorage, MemoryStorage};
use restline_common::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use restline_common::{
    ApiError, ApiResult, Clock, RetryEngine, Session, SessionEvents, SessionStore, Sleeper,
    Storages, SystemClock, TokioSleeper,
};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::resources::RequestOptions;
use super::revoke::TransportRevoker;
use crate::config::ClientConfig;
use crate::http::ReqwestTransport;

/// Directory of the browser-wide storage file when `storageDir` is unset.
#[must_use]
pub fn default_storage_dir() -> PathBuf {
    std::env::temp_dir().join("restline")
}

/// Client for an account-scoped REST service using bearer tokens.
pub struct ApiClient {
    pub(crate) config: ClientConfig,
    pub(crate) base_url: Url,
    pub(crate) authorize_url: Url,
    pub(crate) end_session_url: Option<Url>,
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) storages: Storages,
    pub(crate) store: SessionStore,
    pub(crate) retry: RetryEngine,
    pub(crate) events: Arc<SessionEvents>,
    pub(crate) revoker: Arc<dyn TokenRevoker>,
    pub(crate) redirect: Option<Arc<dyn RedirectHost>>,
    pub(crate) verifier: Option<Arc<dyn IdTokenVerifier>>,
}

impl ApiClient {
    /// Client with the default reqwest transport and storages.
    ///
    /// # Errors
    /// See [`ApiClientBuilder::build`].
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        Self::builder(config).build()
    }

    /// Create a builder for fluent configuration
    #[must_use]
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Listener registry shared with the session store and retry engine.
    #[must_use]
    pub fn events(&self) -> &Arc<SessionEvents> {
        &self.events
    }

    pub fn on_signed_out<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events.on_signed_out(listener);
    }

    pub fn on_session_expired<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events.on_session_expired(listener);
    }

    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(&ApiError) + Send + Sync + 'static,
    {
        self.events.on_error(listener);
    }

    #[must_use]
    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.store.session()
    }

    /// Identity of the signed-in account.
    #[must_use]
    pub fn account_id(&self) -> Option<String> {
        self.store.session().map(|s| s.id)
    }

    /// Voluntary sign-out.
    ///
    /// Revokes the remote token first when `signOutRevokesToken` is set;
    /// revocation failures go to `onError` and never block sign-out. Then the
    /// session is cleared, `onSignedOut` fires and, if configured, the
    /// redirect host is sent to `endSessionUrl`. `onSessionExpired` is not
    /// raised.
    ///
    /// # Errors
    /// Returns `ApiError::Storage` if the persisted session cannot be erased.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> ApiResult<()> {
        let Some(session) = self.store.session() else {
            debug!("sign-out without an active session");
            return Ok(());
        };

        if self.config.sign_out_revokes_token {
            if let Err(e) = self.revoker.revoke(&session.token).await {
                warn!(error = %e, "token revocation on sign-out failed");
                self.events.emit_error(&e);
            }
        }

        self.store.clear()?;
        info!(account = %session.id, "signed out");
        self.events.emit_signed_out();

        if let (Some(url), Some(host)) = (&self.end_session_url, &self.redirect) {
            host.navigate(url);
        }
        Ok(())
    }

    /// Generic call path.
    ///
    /// Same pipeline as the named operations, except that a 401 on a locally
    /// expired session resolves to `Value::Null` after forced expiry instead
    /// of failing.
    ///
    /// # Errors
    /// The retry engine's terminal failure, or `ApiError::NotAuthenticated`
    /// for a scoped URI without a session.
    #[instrument(skip(self, method, body, options), fields(method = %method))]
    pub async fn call(
        &self,
        method: HttpMethod,
        uri: &str,
        body: Option<Value>,
        options: &RequestOptions,
    ) -> ApiResult<Value> {
        let mut request = self.request(method, uri, options)?;
        if let Some(body) = body {
            request = request.json(body);
        }
        match self.send(request).await {
            Ok(response) => Ok(response.into_json()),
            Err(ApiError::SessionExpired) => {
                debug!("session expired during call; resolving empty");
                Ok(Value::Null)
            }
            Err(e) => Err(e),
        }
    }

    /// Absolute URL for `uri`.
    ///
    /// Absolute URIs are used as-is. Relative ones resolve against the base
    /// URL, under `accounts/{id}/` unless `global` is set.
    pub(crate) fn resolve(&self, uri: &str, global: bool) -> ApiResult<Url> {
        if let Ok(absolute) = Url::parse(uri) {
            if absolute.has_host() {
                return Ok(absolute);
            }
        }

        let relative = uri.trim_start_matches('/');
        let path = if global {
            relative.to_string()
        } else {
            let id = self.account_id().ok_or(ApiError::NotAuthenticated)?;
            let id = urlencoding::encode(&id);
            if relative.is_empty() {
                format!("accounts/{id}")
            } else {
                format!("accounts/{id}/{relative}")
            }
        };

        self.base_url
            .join(&path)
            .map_err(|e| ApiError::Config(format!("cannot resolve '{uri}': {e}")))
    }

    /// Request for `uri` carrying the current token and query options.
    pub(crate) fn request(
        &self,
        method: HttpMethod,
        uri: &str,
        options: &RequestOptions,
    ) -> ApiResult<HttpRequest> {
        let url = self.resolve(uri, options.global)?;
        let mut request = HttpRequest::new(method, url.as_str()).query(&options.query);
        if let Some(token) = self.store.current_token() {
            request = request.header("Authorization", token);
        }
        Ok(request)
    }

    /// Send `request` through the retry engine.
    pub(crate) async fn send(&self, request: HttpRequest) -> ApiResult<HttpResponse> {
        let label = format!("{} {}", request.method, request.url);
        let transport = self.transport.clone();
        self.retry
            .execute(&label, || {
                let transport = transport.clone();
                let request = request.clone();
                async move { transport.send(request).await }
            })
            .await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ApiClient`]
pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    storages: Option<Storages>,
    clock: Option<Arc<dyn Clock>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    redirect: Option<Arc<dyn RedirectHost>>,
    verifier: Option<Arc<dyn IdTokenVerifier>>,
}

impl ApiClientBuilder {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            storages: None,
            clock: None,
            sleeper: None,
            redirect: None,
            verifier: None,
        }
    }

    /// Set the HTTP transport (defaults to [`ReqwestTransport`])
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set both storage scopes (defaults to memory for tab scope and a
    /// [`FileStorage`] under `storageDir` for browser scope)
    #[must_use]
    pub fn storages(mut self, storages: Storages) -> Self {
        self.storages = Some(storages);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Wait primitive used between retries
    #[must_use]
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    #[must_use]
    pub fn redirect_host(mut self, host: Arc<dyn RedirectHost>) -> Self {
        self.redirect = Some(host);
        self
    }

    #[must_use]
    pub fn id_token_verifier(mut self, verifier: Arc<dyn IdTokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Build the client and restore any persisted session.
    ///
    /// Must run inside a Tokio runtime when a persisted session with an
    /// expiration may be restored, since restoring arms its timer.
    ///
    /// # Errors
    /// `ApiError::Config` for invalid configuration, `ApiError::Transport` if
    /// the default transport cannot be built, `ApiError::Storage` if the
    /// storage backends fail.
    pub fn build(self) -> ApiResult<ApiClient> {
        let config = self.config;
        config.validate()?;

        let base_url = config.base_url()?;
        let authorize_url = config.authorize_url()?;
        let end_session_url = config.end_session_url()?;

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        let storages = match self.storages {
            Some(storages) => storages,
            None => {
                let dir = config.storage_dir.clone().unwrap_or_else(default_storage_dir);
                Storages::new(Arc::new(MemoryStorage::new()), Arc::new(FileStorage::open(dir)?))
            }
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let sleeper = self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper));
        let events = Arc::new(SessionEvents::new());

        let store = SessionStore::new(
            storages.for_scope(config.persistence_scope),
            config.session_key.clone(),
            clock,
            events.clone(),
        );

        let revoke_url = base_url
            .join(&config.revoke_path)
            .map_err(|e| ApiError::Config(format!("invalid revokePath: {e}")))?;
        let revoker: Arc<dyn TokenRevoker> =
            Arc::new(TransportRevoker::new(transport.clone(), revoke_url));
        if config.expiry_revokes_token {
            store.set_expiry_revoker(Some(revoker.clone()));
        }

        let retry = RetryEngine::new(config.retry_policy(), sleeper, store.clone(), events.clone());

        let restored = store.restore()?;
        info!(
            base_url = %base_url,
            scope = ?config.persistence_scope,
            restored,
            "api client ready"
        );

        Ok(ApiClient {
            config,
            base_url,
            authorize_url,
            end_session_url,
            transport,
            storages,
            store,
            retry,
            events,
            revoker,
            redirect: self.redirect,
            verifier: self.verifier,
        })
    }
}

impl std::fmt::Debug for ApiClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClientBuilder").field("config", &self.config).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use restline_common::testing::{MemoryRedirectHost, MockClock, RecordingSleeper, ScriptedTransport};
    use serde_json::json;

    use super::*;

    fn client(config: ClientConfig, transport: &ScriptedTransport) -> ApiClient {
        ApiClient::builder(config.with_base_url("https://api.test/v1/"))
            .transport(Arc::new(transport.clone()))
            .storages(Storages::in_memory())
            .sleeper(Arc::new(RecordingSleeper::new()))
            .build()
            .expect("client")
    }

    #[tokio::test]
    async fn build_rejects_invalid_config() {
        let result = ApiClient::builder(ClientConfig::default())
            .storages(Storages::in_memory())
            .transport(Arc::new(ScriptedTransport::new()))
            .build();
        assert!(matches!(result, Err(ApiError::Config(_))));
    }

    #[tokio::test]
    async fn resolve_scopes_relative_uris_to_account() {
        let transport = ScriptedTransport::new();
        let client = client(ClientConfig::new("app"), &transport);

        assert!(matches!(client.resolve("items", false), Err(ApiError::NotAuthenticated)));
        assert_eq!(client.resolve("/status", true).unwrap().as_str(), "https://api.test/v1/status");

        client.store.set_session(Session::new("a b", "Bearer T")).unwrap();
        assert_eq!(
            client.resolve("/items/3", false).unwrap().as_str(),
            "https://api.test/v1/accounts/a%20b/items/3"
        );
        assert_eq!(client.resolve("", false).unwrap().as_str(), "https://api.test/v1/accounts/a%20b");
        assert_eq!(
            client.resolve("https://cdn.test/f.bin", false).unwrap().as_str(),
            "https://cdn.test/f.bin"
        );
    }

    #[tokio::test]
    async fn live_session_401_is_an_ordinary_failure() {
        let transport = ScriptedTransport::new();
        let client = client(ClientConfig::new("app"), &transport);
        let exp = client.store.now_millis() + 60_000;
        client.store.set_session(Session::new("1", "Bearer T").with_expiration(exp)).unwrap();

        transport.push_json(401, json!({}));
        let err = client
            .call(HttpMethod::Get, "items", None, &RequestOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(client.is_authenticated());
    }

    #[tokio::test]
    async fn generic_call_degrades_expired_session_to_null() {
        let transport = ScriptedTransport::new();
        let clock = MockClock::at_millis(1_700_000_000_000);
        let client = ApiClient::builder(ClientConfig::new("app").with_base_url("https://api.test/v1/"))
            .transport(Arc::new(transport.clone()))
            .storages(Storages::in_memory())
            .clock(Arc::new(clock.clone()))
            .sleeper(Arc::new(RecordingSleeper::new()))
            .build()
            .unwrap();
        let exp = clock.now_millis() + 60_000;
        client.store.set_session(Session::new("1", "Bearer T").with_expiration(exp)).unwrap();
        clock.set_millis(exp - 5_000);

        transport.push_json(401, json!({}));
        let value = client
            .call(HttpMethod::Get, "items", None, &RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn sign_out_fires_signed_out_and_navigates() {
        let transport = ScriptedTransport::new();
        let host = MemoryRedirectHost::new(Url::parse("https://app.test/").unwrap());
        let client = ApiClient::builder(
            ClientConfig::new("app")
                .with_base_url("https://api.test/v1/")
                .with_end_session_url("https://auth.test/logout")
                .revoking_on_sign_out(true),
        )
        .transport(Arc::new(transport.clone()))
        .storages(Storages::in_memory())
        .redirect_host(Arc::new(host.clone()))
        .build()
        .unwrap();

        let signed_out = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let expired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        {
            let signed_out = signed_out.clone();
            client.on_signed_out(move || {
                signed_out.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
            let expired = expired.clone();
            client.on_session_expired(move || {
                expired.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
        }

        client.store.set_session(Session::new("1", "Bearer T")).unwrap();
        transport.push_json(204, Value::Null);
        client.sign_out().await.unwrap();

        assert!(!client.is_authenticated());
        let revoke = transport.last_request().unwrap();
        assert_eq!(revoke.method, HttpMethod::Delete);
        assert_eq!(revoke.url, "https://api.test/v1/oauth/token");
        assert_eq!(revoke.header_value("Authorization"), Some("Bearer T"));
        assert_eq!(signed_out.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(expired.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(host.navigations(), vec![Url::parse("https://auth.test/logout").unwrap()]);
    }

    #[tokio::test]
    async fn failed_revocation_does_not_block_sign_out() {
        let transport = ScriptedTransport::new();
        let client = client(ClientConfig::new("app").revoking_on_sign_out(true), &transport);
        let errors = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        {
            let errors = errors.clone();
            client.on_error(move |_| {
                errors.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
        }

        client.store.set_session(Session::new("1", "Bearer T")).unwrap();
        transport.push_json(500, json!({}));
        client.sign_out().await.unwrap();

        assert!(!client.is_authenticated());
        assert_eq!(errors.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
