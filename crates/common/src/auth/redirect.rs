//! Redirect host collaborator
//!
//! Abstracts the address bar: read the current URL, rewrite it in place
//! (history replace, no reload) and navigate away.

use url::Url;

pub trait RedirectHost: Send + Sync {
    /// The URL currently shown, including any fragment.
    fn current_url(&self) -> Url;

    /// Rewrite the visible URL without reloading.
    fn replace_url(&self, url: &Url);

    /// Leave the page, e.g. for sign-in or end-session redirects.
    fn navigate(&self, url: &Url);
}

/// Origin plus path of `url`; the redirect URI sent to the provider.
#[must_use]
pub fn redirect_uri(url: &Url) -> String {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.to_string()
}

/// `url` without its fragment.
#[must_use]
pub fn without_fragment(url: &Url) -> Url {
    let mut stripped = url.clone();
    stripped.set_fragment(None);
    stripped
}
