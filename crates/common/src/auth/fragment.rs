//! Parsing of implicit-flow redirect fragments
//!
//! A provider completing the implicit flow redirects back with
//! `#access_token=...&token_type=Bearer&state=...`. Keys and values are
//! percent-decoded; a pair without `=` is kept with an empty value.

use std::collections::HashMap;

use tracing::warn;

/// Key whose presence marks a bearer-flow callback.
pub const ACCESS_TOKEN: &str = "access_token";
pub const TOKEN_TYPE: &str = "token_type";
pub const STATE: &str = "state";
pub const ID_TOKEN: &str = "id_token";
pub const EXPIRES_IN: &str = "expires_in";

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Decoded `key=value` pairs from a URL fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectFragment {
    params: HashMap<String, String>,
}

impl RedirectFragment {
    /// Parse a fragment, with or without its leading `#`.
    #[must_use]
    pub fn parse(fragment: &str) -> Self {
        let params = fragment
            .trim_start_matches('#')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(key), decode(value))
            })
            .collect();
        Self { params }
    }

    /// Whether this fragment is an implicit-flow callback.
    #[must_use]
    pub fn is_bearer_flow(&self) -> bool {
        self.params.get(ACCESS_TOKEN).is_some_and(|t| !t.is_empty())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.get(STATE)
    }

    #[must_use]
    pub fn id_token(&self) -> Option<&str> {
        self.get(ID_TOKEN).filter(|t| !t.is_empty())
    }

    /// Lifetime in seconds, if the provider sent a parsable, non-negative one.
    #[must_use]
    pub fn expires_in(&self) -> Option<i64> {
        self.get(EXPIRES_IN).and_then(|v| v.trim().parse().ok()).filter(|secs: &i64| *secs >= 0)
    }

    /// `Authorization` header value: `"<token_type> <access_token>"`.
    #[must_use]
    pub fn bearer_token(&self) -> Option<String> {
        let access_token = self.get(ACCESS_TOKEN).filter(|t| !t.is_empty())?;
        let token_type = self.get(TOKEN_TYPE).filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TOKEN_TYPE);
        Some(format!("{token_type} {access_token}"))
    }
}

fn decode(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            warn!(error = %e, "fragment component is not valid UTF-8 after decoding");
            raw.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_callback() {
        let fragment = RedirectFragment::parse("#token_type=Bearer&access_token=T&state=S");
        assert!(fragment.is_bearer_flow());
        assert_eq!(fragment.bearer_token().as_deref(), Some("Bearer T"));
        assert_eq!(fragment.state(), Some("S"));
        assert_eq!(fragment.id_token(), None);
    }

    #[test]
    fn decodes_both_sides() {
        let fragment = RedirectFragment::parse("access_token=a%2Bb%3D&st%61te=x%20y&expires_in=3600");
        assert_eq!(fragment.get("access_token"), Some("a+b="));
        assert_eq!(fragment.state(), Some("x y"));
        assert_eq!(fragment.expires_in(), Some(3600));
        assert_eq!(fragment.bearer_token().as_deref(), Some("Bearer a+b="));
    }

    #[test]
    fn unusable_lifetimes_are_dropped() {
        assert_eq!(RedirectFragment::parse("expires_in=-5").expires_in(), None);
        assert_eq!(RedirectFragment::parse("expires_in=soon").expires_in(), None);
        assert_eq!(RedirectFragment::parse("expires_in=99999999999999999999").expires_in(), None);
        assert_eq!(
            RedirectFragment::parse("expires_in=9223372036854775807").expires_in(),
            Some(i64::MAX)
        );
    }

    #[test]
    fn non_callback_fragments() {
        assert!(!RedirectFragment::parse("").is_bearer_flow());
        assert!(!RedirectFragment::parse("#section-2").is_bearer_flow());
        assert!(!RedirectFragment::parse("#access_token=").is_bearer_flow());
        assert_eq!(RedirectFragment::parse("#flag").get("flag"), Some(""));
    }
}
