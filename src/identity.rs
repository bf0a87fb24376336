//! Identifier handling: normalization for comparison, fragment-insensitive same-page checks and
//! the policy deciding which identifiers never take part in synchronization.

use serde::{Deserialize, Serialize};
use url::Url;

/// The blank page a host opens by default. Never synchronized, and used as placeholder when the
/// last tab of a window has to go.
pub const NEW_TAB_URL: &str = "chrome://newtab/";

/// Normalize an identifier before comparing it with another one.
///
/// Stripping the fragment here proved too aggressive: two distinct documents served from the same
/// path would collapse into one and get deleted on the other side. Comparison stays exact.
pub fn normalize_url(url: Option<&str>) -> &str {
    url.unwrap_or("")
}

/// Everything before the first `#`.
pub fn strip_fragment(url: &str) -> &str {
    match url.find('#') {
        Some(pos) => &url[..pos],
        None => url,
    }
}

/// True when both identifiers point at the same document and differ at most in their fragment.
pub fn is_same_page(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(mut a), Ok(mut b)) => {
            a.set_fragment(None);
            b.set_fragment(None);
            a == b
        }
        _ => strip_fragment(a) == strip_fragment(b),
    }
}

/// Which identifiers are excluded from synchronization entirely.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPolicy {
    pub ignored_urls: Vec<String>,
    pub ignored_prefixes: Vec<String>,
}

impl Default for UrlPolicy {
    fn default() -> Self {
        UrlPolicy {
            ignored_urls: vec![NEW_TAB_URL.to_string()],
            ignored_prefixes: vec!["chrome-devtools://".to_string()],
        }
    }
}

impl UrlPolicy {
    pub fn should_ignore(&self, url: &str) -> bool {
        url.is_empty()
            || self.ignored_urls.iter().any(|ignored| ignored == url)
            || self
                .ignored_prefixes
                .iter()
                .any(|prefix| url.starts_with(prefix.as_str()))
    }

    pub fn should_ignore_opt(&self, url: Option<&str>) -> bool {
        url.map(|u| self.should_ignore(u)).unwrap_or(true)
    }

    /// The first candidate that is worth synchronizing, if any.
    pub fn first_syncable<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        candidates
            .into_iter()
            .flatten()
            .find(|url| !self.should_ignore(url))
    }
}
