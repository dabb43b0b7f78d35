//! Implicit-flow bootstrap
//!
//! `Unauthenticated -> Authenticated`: either through the provider's sign-in
//! page and the redirect back ([`ApiClient::begin_interactive`] then
//! [`ApiClient::try_resume_from_redirect`]) or from a token the caller already
//! holds ([`ApiClient::sign_in_with_token`]).

use restline_common::auth::{
    generate_state, load_or_create_state, redirect_uri, state_key, validate_state,
    without_fragment, RedirectFragment,
};
use restline_common::transport::{HttpMethod, HttpRequest};
use restline_common::{ApiError, ApiResult, Session};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::ApiClient;

/// Scope that makes the provider return an identity token.
pub const OPENID_SCOPE: &str = "openid";

/// Extra details from the redirect that shape the resulting session.
#[derive(Debug, Clone, Default)]
pub struct SessionHints {
    pub id_token: Option<String>,
    /// Lifetime in seconds, used when the who-am-I response has no expiration.
    pub expires_in: Option<i64>,
    pub uses_token: bool,
}

impl ApiClient {
    /// Sign-in URL for the provider's interactive page.
    ///
    /// # Errors
    /// `ApiError::Config` without a redirect host, `ApiError::Storage` if the
    /// anti-forgery state cannot be persisted.
    pub fn begin_interactive(&self) -> ApiResult<Url> {
        let host = self
            .redirect
            .as_ref()
            .ok_or_else(|| ApiError::Config("interactive sign-in needs a redirect host".into()))?;

        let response_type = if self.config.requests_id_token() { "token id_token" } else { "token" };
        let scope = self.config.scopes.iter().map(String::as_str).collect::<Vec<_>>().join(" ");

        let mut params = vec![
            ("client_id", self.config.client_id.clone()),
            ("response_type", response_type.to_string()),
            ("redirect_uri", redirect_uri(&host.current_url())),
        ];
        if !scope.is_empty() {
            params.push(("scope", scope));
        }
        if !self.config.ignore_anti_forgery_state {
            params.push(("state", self.anti_forgery_state()?));
        }
        if self.config.requests_id_token() {
            params.push(("nonce", generate_state()));
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let mut url = self.authorize_url.clone();
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
            _ => query,
        };
        url.set_query(Some(&query));
        Ok(url)
    }

    /// Send the redirect host to the interactive sign-in page.
    ///
    /// # Errors
    /// See [`ApiClient::begin_interactive`].
    pub fn navigate_to_sign_in(&self) -> ApiResult<()> {
        let url = self.begin_interactive()?;
        if let Some(host) = &self.redirect {
            host.navigate(&url);
        }
        Ok(())
    }

    /// Complete the implicit flow from the current location's fragment.
    ///
    /// Returns `Ok(false)` without side effects when the location is not a
    /// bearer-flow callback. A state mismatch is reported through `onError`
    /// as `ApiError::AntiForgeryMismatch` and also yields `Ok(false)`.
    ///
    /// # Errors
    /// Terminal failure of the who-am-I call, or a storage failure.
    #[instrument(skip(self))]
    pub async fn try_resume_from_redirect(&self) -> ApiResult<bool> {
        let Some(host) = &self.redirect else {
            return Ok(false);
        };
        let current = host.current_url();
        let Some(fragment) = current.fragment() else {
            return Ok(false);
        };
        let fragment = RedirectFragment::parse(fragment);
        if !fragment.is_bearer_flow() {
            return Ok(false);
        }

        host.replace_url(&without_fragment(&current));

        if !self.config.ignore_anti_forgery_state {
            let expected = self.anti_forgery_state()?;
            let returned = fragment.state().unwrap_or_default();
            if !validate_state(&expected, returned) {
                warn!("redirect state does not match; ignoring callback");
                self.events.emit_error(&ApiError::AntiForgeryMismatch);
                return Ok(false);
            }
        }

        let Some(token) = fragment.bearer_token() else {
            return Ok(false);
        };
        let hints = SessionHints {
            id_token: fragment.id_token().map(str::to_string),
            expires_in: fragment.expires_in(),
            uses_token: false,
        };
        self.load_user(&token, hints).await?;
        Ok(true)
    }

    /// Establish a session from a token obtained elsewhere.
    ///
    /// A bare token is sent as `Bearer <token>`.
    ///
    /// # Errors
    /// Terminal failure of the who-am-I call, or a storage failure.
    pub async fn sign_in_with_token(&self, token: &str) -> ApiResult<Session> {
        let token = token.trim();
        let token = if token.contains(char::is_whitespace) {
            token.to_string()
        } else {
            format!("Bearer {token}")
        };
        self.load_user(&token, SessionHints { uses_token: true, ..SessionHints::default() }).await
    }

    /// Ask the provider who `token` belongs to and install the session.
    ///
    /// # Errors
    /// The retry engine's terminal failure, `ApiError::Decode` for a response
    /// without an identity, or a storage failure.
    #[instrument(skip(self, token, hints))]
    pub async fn load_user(&self, token: &str, hints: SessionHints) -> ApiResult<Session> {
        let url = self
            .base_url
            .join(&self.config.who_am_i_path)
            .map_err(|e| ApiError::Config(format!("invalid whoAmIPath: {e}")))?;
        let request = HttpRequest::new(HttpMethod::Get, url.as_str()).header("Authorization", token);
        let who = self.send(request).await?.into_json();

        let id = account_id(&who)
            .ok_or_else(|| ApiError::Decode("who-am-I response has no id".into()))?;
        let mut session = Session::new(id, token).using_token(hints.uses_token);

        let expiration = who
            .get("expiration")
            .and_then(Value::as_f64)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| (secs * 1000.0) as i64)
            .or_else(|| {
                hints
                    .expires_in
                    .map(|secs| self.store.now_millis().saturating_add(secs.saturating_mul(1000)))
            });
        if let Some(expiration) = expiration {
            session = session.with_expiration(expiration);
        }

        if let Some(id_token) = hints.id_token {
            let claims = match (&self.verifier, self.config.decode_identity_token) {
                (Some(verifier), true) => verifier.verify(&id_token).await,
                _ => None,
            };
            if self.config.decode_identity_token && claims.is_none() {
                debug!("identity token did not verify; keeping it without claims");
            }
            session = session.with_id_token(id_token, claims);
        }

        self.store.set_session(session.clone())?;
        info!(account = %session.id, uses_token = session.uses_token, "signed in");
        Ok(session)
    }

    fn anti_forgery_state(&self) -> ApiResult<String> {
        load_or_create_state(self.storages.browser.as_ref(), &state_key(&self.config.session_key))
    }
}

fn account_id(who: &Value) -> Option<String> {
    match who.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn account_id_accepts_strings_and_numbers() {
        assert_eq!(account_id(&json!({"id": "abc"})), Some("abc".into()));
        assert_eq!(account_id(&json!({"id": 42})), Some("42".into()));
        assert_eq!(account_id(&json!({"id": ""})), None);
        assert_eq!(account_id(&json!({"name": "x"})), None);
    }
}
