//! Client configuration
//!
//! [`ClientConfig`] is the recognised option surface of the client. It
//! deserializes from camelCase JSON or TOML with every optional key
//! defaulted, and can also be assembled in code with the `with_*` methods.

pub mod loader;

use std::collections::BTreeSet;
use std::path::PathBuf;

use restline_common::resilience::{RetryPolicy, ServerErrorRetry, DEFAULT_SERVER_ERROR_ATTEMPTS};
use restline_common::{ApiError, ApiResult, PersistenceScope};
use serde::{Deserialize, Serialize};
use url::Url;

pub use loader::{load, load_from_env, load_from_file, probe_config_paths};

pub const DEFAULT_BASE_URL: &str = "https://api.example.com/v1/";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://auth.example.com/oauth/authorize";
pub const DEFAULT_WHO_AM_I_PATH: &str = "accounts/me";
pub const DEFAULT_REVOKE_PATH: &str = "oauth/token";
pub const DEFAULT_SESSION_KEY: &str = "restline.session";

/// `handleServerError`: a boolean switch or a maximum attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerErrorSetting {
    Enabled(bool),
    MaxAttempts(u32),
}

impl Default for ServerErrorSetting {
    fn default() -> Self {
        Self::MaxAttempts(DEFAULT_SERVER_ERROR_ATTEMPTS)
    }
}

impl From<ServerErrorSetting> for ServerErrorRetry {
    fn from(setting: ServerErrorSetting) -> Self {
        match setting {
            ServerErrorSetting::Enabled(true) => Self::UpTo(DEFAULT_SERVER_ERROR_ATTEMPTS),
            ServerErrorSetting::Enabled(false) => Self::Disabled,
            ServerErrorSetting::MaxAttempts(max) => Self::UpTo(max),
        }
    }
}

impl std::str::FromStr for ServerErrorSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(max) = s.parse::<u32>() {
            return Ok(Self::MaxAttempts(max));
        }
        match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Ok(Self::Enabled(true)),
            "false" | "no" | "off" => Ok(Self::Enabled(false)),
            other => Err(format!("invalid handleServerError value: {other}")),
        }
    }
}

/// Options recognised by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// OAuth client id. Required.
    #[serde(default)]
    pub client_id: String,

    /// Root of the REST service; resource URIs resolve against it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Provider sign-in endpoint for the implicit flow.
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    /// "Who am I" endpoint, relative to `base_url`.
    #[serde(default = "default_who_am_i_path")]
    pub who_am_i_path: String,

    /// Token revocation endpoint, relative to `base_url`.
    #[serde(default = "default_revoke_path")]
    pub revoke_path: String,

    /// Where to send the browser after sign-out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_url: Option<String>,

    #[serde(default = "default_true")]
    pub handle_rate_limit: bool,

    #[serde(default)]
    pub handle_server_error: ServerErrorSetting,

    #[serde(default)]
    pub scopes: BTreeSet<String>,

    /// Storage key of the persisted session; the anti-forgery state lives
    /// under this key plus `.state`.
    #[serde(default = "default_session_key")]
    pub session_key: String,

    #[serde(default)]
    pub persistence_scope: PersistenceScope,

    /// Directory of the browser-wide storage file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,

    #[serde(default)]
    pub ignore_anti_forgery_state: bool,

    #[serde(default)]
    pub sign_out_revokes_token: bool,

    /// Revoke the remote token when a session expires.
    #[serde(default)]
    pub expiry_revokes_token: bool,

    #[serde(default)]
    pub decode_identity_token: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_authorize_url() -> String {
    DEFAULT_AUTHORIZE_URL.to_string()
}

fn default_who_am_i_path() -> String {
    DEFAULT_WHO_AM_I_PATH.to_string()
}

fn default_revoke_path() -> String {
    DEFAULT_REVOKE_PATH.to_string()
}

fn default_session_key() -> String {
    DEFAULT_SESSION_KEY.to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            base_url: default_base_url(),
            authorize_url: default_authorize_url(),
            who_am_i_path: default_who_am_i_path(),
            revoke_path: default_revoke_path(),
            end_session_url: None,
            handle_rate_limit: true,
            handle_server_error: ServerErrorSetting::default(),
            scopes: BTreeSet::new(),
            session_key: default_session_key(),
            persistence_scope: PersistenceScope::default(),
            storage_dir: None,
            ignore_anti_forgery_state: false,
            sign_out_revokes_token: false,
            expiry_revokes_token: false,
            decode_identity_token: false,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), ..Self::default() }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_authorize_url(mut self, authorize_url: impl Into<String>) -> Self {
        self.authorize_url = authorize_url.into();
        self
    }

    #[must_use]
    pub fn with_end_session_url(mut self, url: impl Into<String>) -> Self {
        self.end_session_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = key.into();
        self
    }

    #[must_use]
    pub fn with_persistence_scope(mut self, scope: PersistenceScope) -> Self {
        self.persistence_scope = scope;
        self
    }

    #[must_use]
    pub fn with_server_errors(mut self, setting: ServerErrorSetting) -> Self {
        self.handle_server_error = setting;
        self
    }

    #[must_use]
    pub fn with_rate_limit_handling(mut self, enabled: bool) -> Self {
        self.handle_rate_limit = enabled;
        self
    }

    #[must_use]
    pub fn ignoring_anti_forgery_state(mut self, ignore: bool) -> Self {
        self.ignore_anti_forgery_state = ignore;
        self
    }

    #[must_use]
    pub fn revoking_on_sign_out(mut self, revoke: bool) -> Self {
        self.sign_out_revokes_token = revoke;
        self
    }

    #[must_use]
    pub fn revoking_on_expiry(mut self, revoke: bool) -> Self {
        self.expiry_revokes_token = revoke;
        self
    }

    #[must_use]
    pub fn decoding_identity_token(mut self, decode: bool) -> Self {
        self.decode_identity_token = decode;
        self
    }

    /// Check required fields and URL shapes.
    ///
    /// # Errors
    /// Returns `ApiError::Config` describing the first invalid option.
    pub fn validate(&self) -> ApiResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(ApiError::Config("clientId is required".to_string()));
        }
        self.base_url()?;
        self.authorize_url()?;
        self.end_session_url()?;
        if self.session_key.trim().is_empty() {
            return Err(ApiError::Config("sessionKey must not be empty".to_string()));
        }
        if self.handle_server_error == ServerErrorSetting::MaxAttempts(0) {
            return Err(ApiError::Config(
                "handleServerError must be a boolean or a positive attempt count".to_string(),
            ));
        }
        Ok(())
    }

    /// `base_url` parsed, with a trailing slash so relative joins keep its path.
    ///
    /// # Errors
    /// Returns `ApiError::Config` if the URL does not parse.
    pub fn base_url(&self) -> ApiResult<Url> {
        let raw = if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        };
        parse_url("baseUrl", &raw)
    }

    /// # Errors
    /// Returns `ApiError::Config` if the URL does not parse.
    pub fn authorize_url(&self) -> ApiResult<Url> {
        parse_url("authorizeUrl", &self.authorize_url)
    }

    /// # Errors
    /// Returns `ApiError::Config` if the URL is set but does not parse.
    pub fn end_session_url(&self) -> ApiResult<Option<Url>> {
        self.end_session_url.as_deref().map(|raw| parse_url("endSessionUrl", raw)).transpose()
    }

    /// Retry policy described by `handleRateLimit` and `handleServerError`.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_rate_limit_handling(self.handle_rate_limit)
            .with_server_errors(self.handle_server_error.into())
    }

    /// Whether an OpenID identity token should be requested.
    #[must_use]
    pub fn requests_id_token(&self) -> bool {
        self.scopes.contains(crate::api::OPENID_SCOPE)
    }
}

fn parse_url(name: &str, raw: &str) -> ApiResult<Url> {
    Url::parse(raw).map_err(|e| ApiError::Config(format!("invalid {name} '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_apply_to_sparse_json() {
        let config: ClientConfig = serde_json::from_value(json!({"clientId": "abc"})).unwrap();
        assert_eq!(config.client_id, "abc");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.handle_rate_limit);
        assert_eq!(config.handle_server_error, ServerErrorSetting::MaxAttempts(3));
        assert_eq!(config.persistence_scope, PersistenceScope::Tab);
        assert_eq!(config.session_key, DEFAULT_SESSION_KEY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn server_error_setting_accepts_bool_or_count() {
        let off: ClientConfig =
            serde_json::from_value(json!({"clientId": "a", "handleServerError": false})).unwrap();
        assert_eq!(ServerErrorRetry::from(off.handle_server_error), ServerErrorRetry::Disabled);

        let on: ClientConfig =
            serde_json::from_value(json!({"clientId": "a", "handleServerError": true})).unwrap();
        assert_eq!(ServerErrorRetry::from(on.handle_server_error), ServerErrorRetry::UpTo(3));

        let five: ClientConfig =
            serde_json::from_value(json!({"clientId": "a", "handleServerError": 5})).unwrap();
        assert_eq!(five.retry_policy().server_errors, ServerErrorRetry::UpTo(5));

        assert_eq!("off".parse::<ServerErrorSetting>(), Ok(ServerErrorSetting::Enabled(false)));
        assert_eq!("7".parse::<ServerErrorSetting>(), Ok(ServerErrorSetting::MaxAttempts(7)));
    }

    #[test]
    fn validation_rejects_bad_options() {
        assert!(matches!(ClientConfig::default().validate(), Err(ApiError::Config(_))));
        assert!(ClientConfig::new("a").with_base_url("not a url").validate().is_err());
        assert!(ClientConfig::new("a")
            .with_server_errors(ServerErrorSetting::MaxAttempts(0))
            .validate()
            .is_err());
        assert!(ClientConfig::new("a").with_end_session_url("::").validate().is_err());
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let config = ClientConfig::new("a").with_base_url("https://api.test/v2");
        let url = config.base_url().unwrap();
        assert_eq!(url.join("accounts/1/items").unwrap().as_str(), "https://api.test/v2/accounts/1/items");
    }

    #[test]
    fn openid_scope_requests_id_token() {
        assert!(ClientConfig::new("a").with_scopes(["openid", "profile"]).requests_id_token());
        assert!(!ClientConfig::new("a").with_scopes(["profile"]).requests_id_token());
    }
}
