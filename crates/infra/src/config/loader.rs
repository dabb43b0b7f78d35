//! Configuration loader
//!
//! Loads [`ClientConfig`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Load a `.env` file if one is present
//! 2. Attempt to load from environment variables
//! 3. If `RESTLINE_CLIENT_ID` is unset, fall back to a config file
//! 4. Probe multiple paths for config files (JSON and TOML)
//!
//! ## Environment Variables
//! - `RESTLINE_CLIENT_ID`: OAuth client id (required for env loading)
//! - `RESTLINE_BASE_URL`: REST service root
//! - `RESTLINE_AUTHORIZE_URL`: provider sign-in endpoint
//! - `RESTLINE_END_SESSION_URL`: post sign-out destination
//! - `RESTLINE_SCOPES`: space separated scopes
//! - `RESTLINE_SESSION_KEY`: storage key of the session
//! - `RESTLINE_PERSISTENCE_SCOPE`: `tab` or `browser`
//! - `RESTLINE_STORAGE_DIR`: browser-wide storage directory
//! - `RESTLINE_HANDLE_RATE_LIMIT`: true/false
//! - `RESTLINE_HANDLE_SERVER_ERROR`: true/false or a max attempt count
//! - `RESTLINE_IGNORE_ANTI_FORGERY_STATE`: true/false
//! - `RESTLINE_SIGN_OUT_REVOKES_TOKEN`: true/false
//! - `RESTLINE_EXPIRY_REVOKES_TOKEN`: true/false
//! - `RESTLINE_DECODE_IDENTITY_TOKEN`: true/false
//!
//! ## File Locations
//! The loader probes, in order: `./restline.toml`, `./restline.json`,
//! `../restline.toml`, `../restline.json`, then the same names next to the
//! executable.

use std::path::{Path, PathBuf};

use restline_common::{ApiError, ApiResult};

use super::ClientConfig;

const CONFIG_FILE_NAMES: [&str; 2] = ["restline.toml", "restline.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `ApiError::Config` if neither source yields a valid config.
pub fn load() -> ApiResult<ClientConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env file");
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from `RESTLINE_*` environment variables
///
/// Only `RESTLINE_CLIENT_ID` is required; every other option keeps its
/// default when its variable is unset.
///
/// # Errors
/// Returns `ApiError::Config` if the client id is missing or a variable has
/// an invalid value.
pub fn load_from_env() -> ApiResult<ClientConfig> {
    let mut config = ClientConfig::new(env_var("RESTLINE_CLIENT_ID")?);

    if let Some(url) = env_opt("RESTLINE_BASE_URL") {
        config.base_url = url;
    }
    if let Some(url) = env_opt("RESTLINE_AUTHORIZE_URL") {
        config.authorize_url = url;
    }
    config.end_session_url = env_opt("RESTLINE_END_SESSION_URL");
    if let Some(scopes) = env_opt("RESTLINE_SCOPES") {
        config.scopes = scopes.split_whitespace().map(str::to_string).collect();
    }
    if let Some(key) = env_opt("RESTLINE_SESSION_KEY") {
        config.session_key = key;
    }
    if let Some(scope) = env_opt("RESTLINE_PERSISTENCE_SCOPE") {
        config.persistence_scope = scope.parse().map_err(ApiError::Config)?;
    }
    config.storage_dir = env_opt("RESTLINE_STORAGE_DIR").map(PathBuf::from);
    if let Some(setting) = env_opt("RESTLINE_HANDLE_SERVER_ERROR") {
        config.handle_server_error = setting.parse().map_err(ApiError::Config)?;
    }

    config.handle_rate_limit = env_bool("RESTLINE_HANDLE_RATE_LIMIT", true)?;
    config.ignore_anti_forgery_state = env_bool("RESTLINE_IGNORE_ANTI_FORGERY_STATE", false)?;
    config.sign_out_revokes_token = env_bool("RESTLINE_SIGN_OUT_REVOKES_TOKEN", false)?;
    config.expiry_revokes_token = env_bool("RESTLINE_EXPIRY_REVOKES_TOKEN", false)?;
    config.decode_identity_token = env_bool("RESTLINE_DECODE_IDENTITY_TOKEN", false)?;

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is chosen by
/// extension (`.toml` or `.json`).
///
/// # Errors
/// Returns `ApiError::Config` if the file is missing, malformed or invalid.
pub fn load_from_file(path: Option<PathBuf>) -> ApiResult<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ApiError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ApiError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ApiError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(contents: &str, path: &Path) -> ApiResult<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ApiError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ApiError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(ApiError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations.
#[must_use]
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.clone());
        dirs.push(cwd.join(".."));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> ApiResult<String> {
    env_opt(key)
        .ok_or_else(|| ApiError::Config(format!("Missing required environment variable: {key}")))
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
/// Unset or blank keeps `default`; anything else is rejected.
fn env_bool(key: &str, default: bool) -> ApiResult<bool> {
    let Some(raw) = env_opt(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ApiError::Config(format!("{key} must be a boolean, got '{raw}'"))),
    }
}
